//! Wire messages and the producer-side queue collaborator.

pub mod message;
pub mod queue;

pub use message::{RequestMetadata, WorkerErrorDetail, WorkerRequest, WorkerResponse};
pub use queue::{InMemoryQueueProducer, PublishedMessage, QueueProducer};
