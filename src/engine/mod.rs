//! The execution engine: pipeline walking, retry, fan-out, and the external
//! definition collaborator.

pub mod definition_source;
pub mod executor;
pub mod observer;

pub use definition_source::{DefinitionSource, InMemoryDefinitionSource};
pub use executor::PipelineExecutor;
pub use observer::{ExecutionObserver, NoopObserver};
