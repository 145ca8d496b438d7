use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::StoreError;
use crate::core::traits::{EventStore, Record};

/// In-process event store. Topics are created on first use.
#[derive(Default)]
pub struct MemoryStore {
    topics: Mutex<HashMap<String, Arc<TopicLog>>>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct TopicLog {
    records: Mutex<Vec<Record>>,
    appended: Notify,
}

impl TopicLog {
    fn get(&self, topic: &str, offset: i64) -> Result<Option<Record>, StoreError> {
        if offset < 0 {
            return Err(StoreError::InvalidOffset {
                topic: topic.to_string(),
                offset,
            });
        }
        let records = self.records.lock().map_err(|_| poisoned())?;
        Ok(records.get(offset as usize).cloned())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records currently held by `topic`.
    pub fn len(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).cloned())
            .and_then(|log| log.records.lock().ok().map(|records| records.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Snapshot of every record in `topic`, in offset order.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.topics
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).cloned())
            .and_then(|log| log.records.lock().ok().map(|records| records.clone()))
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn log(&self, topic: &str) -> Result<Arc<TopicLog>, StoreError> {
        let mut topics = self.topics.lock().map_err(|_| poisoned())?;
        Ok(Arc::clone(topics.entry(topic.to_string()).or_default()))
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<i64, StoreError> {
        self.check_available()?;
        let log = self.log(topic)?;
        let offset = {
            let mut records = log.records.lock().map_err(|_| poisoned())?;
            let offset = records.len() as i64;
            records.push(Record {
                offset,
                key: key.to_vec(),
                value: value.to_vec(),
            });
            offset
        };
        log.appended.notify_waiters();
        Ok(offset)
    }

    async fn read_at(&self, topic: &str, offset: i64) -> Result<Option<Record>, StoreError> {
        self.check_available()?;
        self.log(topic)?.get(topic, offset)
    }

    async fn poll_next(
        &self,
        topic: &str,
        offset: i64,
        timeout: Duration,
    ) -> Result<Option<Record>, StoreError> {
        self.check_available()?;
        let log = self.log(topic)?;
        let next = offset.saturating_add(1).max(0);
        let deadline = Instant::now() + timeout;
        loop {
            // Register before checking so an append in between still wakes us.
            let appended = log.appended.notified();
            if let Some(record) = log.get(topic, next)? {
                return Ok(Some(record));
            }
            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offsets_are_dense_per_topic() {
        let store = MemoryStore::new();
        assert_eq!(store.append("a", b"k", b"1").await.unwrap(), 0);
        assert_eq!(store.append("a", b"k", b"2").await.unwrap(), 1);
        assert_eq!(store.append("b", b"k", b"3").await.unwrap(), 0);

        let record = store.read_at("a", 1).await.unwrap().expect("record");
        assert_eq!(record.value, b"2");
        assert!(store.read_at("a", 2).await.unwrap().is_none());
        assert!(store.read_at("a", -1).await.is_err());
    }

    #[tokio::test]
    async fn poll_returns_record_after_offset() {
        let store = MemoryStore::new();
        store.append("a", b"k", b"first").await.unwrap();
        store.append("a", b"k", b"second").await.unwrap();

        let first = store
            .poll_next("a", -1, Duration::from_millis(10))
            .await
            .unwrap()
            .expect("first");
        assert_eq!(first.offset, 0);
        let second = store
            .poll_next("a", 0, Duration::from_millis(10))
            .await
            .unwrap()
            .expect("second");
        assert_eq!(second.value, b"second");
        assert!(store
            .poll_next("a", 1, Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn poll_wakes_on_append() {
        let store = Arc::new(MemoryStore::new());
        let waiter = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.poll_next("a", -1, Duration::from_secs(5)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.append("a", b"k", b"late").await.unwrap();

        let record = waiter.await.unwrap().unwrap().expect("record");
        assert_eq!(record.value, b"late");
    }

    #[tokio::test]
    async fn unavailable_store_rejects_calls() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.append("a", b"k", b"v").await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert_eq!(store.append("a", b"k", b"v").await.unwrap(), 0);
    }
}
