use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::codec::{self, CodecError};
use super::handlers::Emission;
use super::stats::PipelineStats;
use crate::core::event::{Event, Topic};
use crate::core::traits::EventStore;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    EncodeFailed(#[from] CodecError),
    #[error("append to {topic} failed: {source}")]
    AppendFailed {
        topic: Topic,
        #[source]
        source: StoreError,
    },
}

/// Result of publishing a batch of independent events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: usize,
    pub failed: usize,
}

/// Encodes events and appends them to their destination topics.
#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn EventStore>,
    stats: Arc<PipelineStats>,
}

impl Publisher {
    pub fn new(store: Arc<dyn EventStore>, stats: Arc<PipelineStats>) -> Self {
        Self { store, stats }
    }

    /// Publishes one event keyed by its correlation key and returns its offset.
    pub async fn publish(&self, event: &Event) -> Result<i64, PublishError> {
        let topic = event.topic();
        let payload = codec::encode(event)?;
        let offset = self
            .store
            .append(topic.as_str(), event.correlation_key().as_bytes(), &payload)
            .await
            .map_err(|source| PublishError::AppendFailed { topic, source })?;
        debug!(
            topic = %topic,
            offset,
            user_name = event.correlation_key(),
            "event published"
        );
        Ok(offset)
    }

    /// Publishes every event independently. A failure is logged and does not
    /// stop the remaining events from being attempted.
    pub async fn publish_all(&self, events: impl IntoIterator<Item = Event>) -> PublishReport {
        let mut report = PublishReport::default();
        for event in events {
            match self.publish(&event).await {
                Ok(_) => {
                    report.published += 1;
                    self.stats.record_published();
                }
                Err(err) => {
                    report.failed += 1;
                    self.stats.record_publish_failure();
                    warn!(
                        topic = %event.topic(),
                        user_name = event.correlation_key(),
                        error = %err,
                        "publish failed, event dropped"
                    );
                }
            }
        }
        report
    }

    pub async fn publish_emission(&self, emission: Emission) -> PublishReport {
        self.publish_all(emission.into_events()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{LoginAttemptOutcome, SystemAuditEvent};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn publish_appends_with_correlation_key() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(store.clone(), PipelineStats::new());
        let event: Event = LoginAttemptOutcome {
            user_name: "abrown".to_string(),
            outcome: false,
        }
        .into();

        assert_eq!(publisher.publish(&event).await.unwrap(), 0);
        assert_eq!(publisher.publish(&event).await.unwrap(), 1);

        let records = store.records(Topic::UserLoginAttemptOutcome.as_str());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, b"abrown");
        assert_eq!(
            codec::decode(Topic::UserLoginAttemptOutcome, &records[0].value).unwrap(),
            event
        );
    }

    #[tokio::test]
    async fn emission_publishes_outgoing_then_audit() {
        let store = Arc::new(MemoryStore::new());
        let stats = PipelineStats::new();
        let publisher = Publisher::new(store.clone(), Arc::clone(&stats));
        let emission = Emission {
            outgoing: vec![LoginAttemptOutcome {
                user_name: "abrown".to_string(),
                outcome: true,
            }
            .into()],
            audit: vec![SystemAuditEvent::new("abrown", "login successful")],
        };

        let report = publisher.publish_emission(emission).await;
        assert_eq!(report, PublishReport { published: 2, failed: 0 });
        assert_eq!(store.len(Topic::UserLoginAttemptOutcome.as_str()), 1);
        assert_eq!(store.len(Topic::SystemAuditEvent.as_str()), 1);
        assert_eq!(stats.snapshot().published, 2);
    }

    #[tokio::test]
    async fn append_failure_is_reported_not_raised() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let stats = PipelineStats::new();
        let publisher = Publisher::new(store.clone(), Arc::clone(&stats));
        let audit: Event = SystemAuditEvent::new("abrown", "login attempt").into();

        assert!(matches!(
            publisher.publish(&audit).await,
            Err(PublishError::AppendFailed {
                topic: Topic::SystemAuditEvent,
                ..
            })
        ));
        let report = publisher.publish_all(vec![audit.clone(), audit]).await;
        assert_eq!(report, PublishReport { published: 0, failed: 2 });
        assert_eq!(stats.snapshot().publish_failures, 2);
    }
}
