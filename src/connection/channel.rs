//! Worker channels: the transport-level link to one worker endpoint.
//!
//! The pooled connection body is an [`WorkerChannel`] trait object produced
//! by an injected [`ChannelFactory`], so the pool's lifecycle and concurrency
//! guarantees are independent of the underlying protocol. The provided TCP
//! implementation speaks newline-delimited JSON: one request line out, one
//! response line back.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::messaging::message::{WorkerRequest, WorkerResponse};

/// A live request/response channel to one worker endpoint.
#[async_trait]
pub trait WorkerChannel: Send + Sync {
    /// Execute one worker call: send the request, wait for the response.
    async fn process(&self, request: &WorkerRequest) -> Result<WorkerResponse>;

    /// Release the underlying transport resources.
    async fn close(&self) -> Result<()>;

    /// `host:port` this channel is bound to.
    fn endpoint(&self) -> &str;
}

/// Establishes new worker channels.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn WorkerChannel>>;
}

struct ChannelIo {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Newline-delimited JSON over a persistent TCP stream.
///
/// A single mutex over both stream halves serializes complete
/// request/response exchanges, so concurrent callers of one pooled channel
/// never interleave frames.
pub struct TcpWorkerChannel {
    endpoint: String,
    io: tokio::sync::Mutex<ChannelIo>,
}

impl TcpWorkerChannel {
    pub fn new(endpoint: String, stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            endpoint,
            io: tokio::sync::Mutex::new(ChannelIo {
                reader: BufReader::new(reader),
                writer,
            }),
        }
    }

    fn transport_error(&self, detail: impl std::fmt::Display) -> EngineError {
        EngineError::Transport {
            endpoint: self.endpoint.clone(),
            detail: detail.to_string(),
        }
    }
}

#[async_trait]
impl WorkerChannel for TcpWorkerChannel {
    async fn process(&self, request: &WorkerRequest) -> Result<WorkerResponse> {
        let mut frame =
            serde_json::to_vec(request).map_err(|e| self.transport_error(format!("encode: {e}")))?;
        frame.push(b'\n');

        let mut io = self.io.lock().await;

        io.writer
            .write_all(&frame)
            .await
            .map_err(|e| self.transport_error(e))?;
        io.writer
            .flush()
            .await
            .map_err(|e| self.transport_error(e))?;

        let mut line = String::new();
        let read = io
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| self.transport_error(e))?;
        if read == 0 {
            return Err(self.transport_error("connection closed by worker"));
        }

        serde_json::from_str(line.trim_end())
            .map_err(|e| self.transport_error(format!("decode: {e}")))
    }

    async fn close(&self) -> Result<()> {
        let mut io = self.io.lock().await;
        io.writer
            .shutdown()
            .await
            .map_err(|e| self.transport_error(e))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Factory producing [`TcpWorkerChannel`]s with a bounded connect budget.
pub struct TcpChannelFactory {
    connect_timeout: Duration,
}

impl TcpChannelFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl ChannelFactory for TcpChannelFactory {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn WorkerChannel>> {
        let endpoint = format!("{host}:{port}");

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| EngineError::Transport {
                endpoint: endpoint.clone(),
                detail: format!("connect timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| EngineError::Transport {
                endpoint: endpoint.clone(),
                detail: e.to_string(),
            })?;

        stream.set_nodelay(true).map_err(|e| EngineError::Transport {
            endpoint: endpoint.clone(),
            detail: e.to_string(),
        })?;

        debug!(endpoint = %endpoint, "worker channel established");
        Ok(Arc::new(TcpWorkerChannel::new(endpoint, stream)))
    }
}
