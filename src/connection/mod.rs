//! Connection pooling and worker channels.

pub mod channel;
pub mod manager;

pub use channel::{ChannelFactory, TcpChannelFactory, TcpWorkerChannel, WorkerChannel};
pub use manager::{ConnectionManager, ConnectionManagerConfig, ConnectionState, PooledConnection};
