//! Event store collaborators: the in-process log and cursor checkpoints.

pub mod checkpoint;
pub mod memory;

pub use checkpoint::{FileCheckpoints, MemoryCheckpoints};
pub use memory::MemoryStore;

use thiserror::Error;

/// Store failures. All of them are transient from a cursor loop's view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("event store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid offset {offset} for topic {topic}")]
    InvalidOffset { topic: String, offset: i64 },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("checkpoint state poisoned")]
    Poisoned,
}
