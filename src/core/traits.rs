use async_trait::async_trait;
use std::time::Duration;

use crate::store::{CheckpointError, StoreError};

/// A keyed entry read back from a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Append-only, offset-addressed per-topic log.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a record and returns its assigned offset.
    async fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<i64, StoreError>;

    /// Reads the record at `offset`, or `None` past the end of the topic.
    async fn read_at(&self, topic: &str, offset: i64) -> Result<Option<Record>, StoreError>;

    /// Waits up to `timeout` for the record after `offset`.
    ///
    /// `offset` is the last record the caller has seen; `-1` means nothing yet.
    async fn poll_next(
        &self,
        topic: &str,
        offset: i64,
        timeout: Duration,
    ) -> Result<Option<Record>, StoreError>;
}

/// Persists the last handled offset per topic so cursors survive restarts.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, topic: &str) -> Result<Option<i64>, CheckpointError>;
    fn save(&self, topic: &str, offset: i64) -> Result<(), CheckpointError>;
}
