//! Per-topic consumer loop.
//!
//! Each loop owns its read position exclusively. Records are handed to the
//! route's handler in offset order; undecodable records are logged and
//! skipped.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::codec;
use super::graph::{ChoreographyGraph, Route};
use super::handlers::HandlerContext;
use super::publisher::Publisher;
use super::stats::PipelineStats;
use crate::core::config::PollingConfig;
use crate::core::event::Topic;
use crate::core::traits::{CheckpointStore, EventStore, Record};
use crate::store::{CheckpointError, StoreError};

/// Position before the first record of a topic.
pub const START_OFFSET: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Bounded wait for each long-poll.
    pub poll_timeout: Duration,
    /// Pause after an empty poll or a store error.
    pub backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Everything a cursor loop shares with its siblings.
#[derive(Clone)]
pub struct CursorDeps {
    pub store: Arc<dyn EventStore>,
    pub publisher: Publisher,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub graph: Arc<ChoreographyGraph>,
    pub ctx: Arc<HandlerContext>,
    pub stats: Arc<PipelineStats>,
    pub settings: PollSettings,
}

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A record was decoded and handed to the handler.
    Handled { offset: i64, published: usize },
    /// A record could not be decoded and was skipped.
    Dropped { offset: i64 },
    /// Nothing new arrived within the poll timeout.
    Idle,
    /// The store failed; treated like an idle poll.
    StoreError,
}

pub struct TopicCursor<R> {
    route: Route,
    deps: CursorDeps,
    rng: R,
    offset: i64,
    /// Whether a loaded checkpoint has been checked against the store.
    resume_checked: bool,
}

impl<R: Rng + Send> TopicCursor<R> {
    /// Creates the loop for `route`, resuming from its checkpoint if one exists.
    ///
    /// A checkpoint pointing past the end of the topic restarts the loop at
    /// [`START_OFFSET`]. If the store cannot be asked now, the check is
    /// repeated on the first poll.
    pub async fn new(route: Route, deps: CursorDeps, rng: R) -> Result<Self, CheckpointError> {
        let checkpoint = deps.checkpoints.load(route.topic.as_str())?;
        let mut cursor = Self {
            route,
            deps,
            rng,
            offset: checkpoint.unwrap_or(START_OFFSET),
            resume_checked: checkpoint.is_none(),
        };
        if !cursor.resume_checked {
            cursor.check_resume_offset().await;
        }
        Ok(cursor)
    }

    pub fn topic(&self) -> Topic {
        self.route.topic
    }

    /// Offset of the last record handled or dropped.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Runs until `shutdown` flips to `true` (or its sender goes away) and
    /// returns the final offset.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> i64 {
        let topic = self.route.topic;
        info!(
            topic = %topic,
            offset = self.offset,
            handler = self.route.handler.name(),
            "cursor loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.poll_once().await {
                PollOutcome::Handled { .. } | PollOutcome::Dropped { .. } => {}
                PollOutcome::Idle | PollOutcome::StoreError => {
                    if backoff(self.deps.settings.backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(topic = %topic, offset = self.offset, "cursor loop stopped");
        self.offset
    }

    /// Polls once for the record after the current offset and processes it.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let topic = self.route.topic;
        if !self.resume_checked && !self.check_resume_offset().await {
            return PollOutcome::StoreError;
        }
        let polled = self
            .deps
            .store
            .poll_next(topic.as_str(), self.offset, self.deps.settings.poll_timeout)
            .await;
        match polled {
            Ok(Some(record)) => self.process(record).await,
            Ok(None) => PollOutcome::Idle,
            Err(err) => {
                warn!(topic = %topic, offset = self.offset, error = %err, "poll failed, backing off");
                PollOutcome::StoreError
            }
        }
    }

    /// Returns `false` when the store could not be asked; the check is
    /// retried on the next poll.
    async fn check_resume_offset(&mut self) -> bool {
        let topic = self.route.topic;
        match self.deps.store.read_at(topic.as_str(), self.offset).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(StoreError::InvalidOffset { .. }) => {
                warn!(
                    topic = %topic,
                    checkpoint = self.offset,
                    "checkpoint is past the end of the topic, restarting from the beginning"
                );
                self.offset = START_OFFSET;
            }
            Err(err) => {
                warn!(topic = %topic, offset = self.offset, error = %err, "checkpoint check failed, backing off");
                return false;
            }
        }
        self.resume_checked = true;
        true
    }

    async fn process(&mut self, record: Record) -> PollOutcome {
        let topic = self.route.topic;
        if record.offset <= self.offset {
            warn!(
                topic = %topic,
                offset = self.offset,
                record_offset = record.offset,
                "store returned an already consumed record, ignoring"
            );
            return PollOutcome::Idle;
        }
        if record.offset != self.offset + 1 {
            warn!(
                topic = %topic,
                offset = self.offset,
                record_offset = record.offset,
                "offset gap in topic"
            );
        }
        self.offset = record.offset;

        let outcome = match codec::decode(topic, &record.value) {
            Err(err) => {
                self.deps.stats.record_decode_failure();
                warn!(
                    topic = %topic,
                    offset = record.offset,
                    error = %err,
                    "dropping undecodable record"
                );
                PollOutcome::Dropped {
                    offset: record.offset,
                }
            }
            Ok(event) => {
                self.deps.stats.record_consumed();
                debug!(
                    topic = %topic,
                    offset = record.offset,
                    user_name = event.correlation_key(),
                    "record received"
                );
                let emission = self
                    .route
                    .handler
                    .apply(&event, &self.deps.ctx, &mut self.rng);
                if let Err(err) = self.deps.graph.check_emission(&self.route, &emission) {
                    warn!(topic = %topic, offset = record.offset, error = %err, "emission outside graph");
                }
                let report = self.deps.publisher.publish_emission(emission).await;
                PollOutcome::Handled {
                    offset: record.offset,
                    published: report.published,
                }
            }
        };

        save_checkpoint(Arc::clone(&self.deps.checkpoints), topic, self.offset).await;
        outcome
    }
}

/// Saves on the blocking pool; file-backed stores do synchronous IO.
async fn save_checkpoint(checkpoints: Arc<dyn CheckpointStore>, topic: Topic, offset: i64) {
    let saved =
        tokio::task::spawn_blocking(move || checkpoints.save(topic.as_str(), offset)).await;
    match saved {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!(topic = %topic, offset, error = %err, "checkpoint save failed");
        }
        Err(err) => {
            warn!(topic = %topic, offset, error = %err, "checkpoint save task failed");
        }
    }
}

/// Sleeps for `duration` unless shutdown arrives first. Returns `true` on shutdown.
async fn backoff(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::OutcomeConfig;
    use crate::core::event::{Event, LoginAttempt, SystemAuditEvent};
    use crate::store::{MemoryCheckpoints, MemoryStore};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn deps(store: Arc<MemoryStore>, checkpoints: Arc<MemoryCheckpoints>) -> CursorDeps {
        let stats = PipelineStats::new();
        CursorDeps {
            store: store.clone(),
            publisher: Publisher::new(store, Arc::clone(&stats)),
            checkpoints,
            graph: Arc::new(ChoreographyGraph::default()),
            ctx: Arc::new(HandlerContext::new(OutcomeConfig::default(), Utc::now())),
            stats,
            settings: PollSettings {
                poll_timeout: Duration::from_millis(10),
                backoff: Duration::from_millis(10),
            },
        }
    }

    async fn cursor(topic: Topic, deps: CursorDeps) -> TopicCursor<StdRng> {
        let route = deps.graph.route_for(topic).expect("route").clone();
        TopicCursor::new(route, deps, StdRng::seed_from_u64(8))
            .await
            .expect("cursor")
    }

    async fn append(store: &MemoryStore, event: &Event) {
        let payload = codec::encode(event).unwrap();
        store
            .append(event.topic().as_str(), event.correlation_key().as_bytes(), &payload)
            .await
            .unwrap();
    }

    fn login(user_name: &str) -> Event {
        LoginAttempt {
            user_name: user_name.to_string(),
            user_password: "12345678".to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn handles_records_in_offset_order() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpoints::new());
        let mut cursor =
            cursor(Topic::UserLoginAttempt, deps(store.clone(), checkpoints.clone())).await;
        assert_eq!(cursor.offset(), START_OFFSET);

        append(&store, &login("abrown")).await;
        append(&store, &login("kwhite")).await;

        assert_eq!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 0, published: 2 }
        );
        assert_eq!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 1, published: 2 }
        );
        assert_eq!(cursor.poll_once().await, PollOutcome::Idle);
        assert_eq!(checkpoints.load(Topic::UserLoginAttempt.as_str()).unwrap(), Some(1));

        let outcomes = store.records(Topic::UserLoginAttemptOutcome.as_str());
        assert_eq!(outcomes[0].key, b"abrown");
        assert_eq!(outcomes[1].key, b"kwhite");
    }

    #[tokio::test]
    async fn malformed_record_is_dropped_and_skipped() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpoints::new());
        let deps = deps(store.clone(), checkpoints);
        let stats = Arc::clone(&deps.stats);
        let mut cursor = cursor(Topic::UserLoginAttempt, deps).await;

        store
            .append(Topic::UserLoginAttempt.as_str(), b"abrown", b"{not json")
            .await
            .unwrap();
        append(&store, &login("abrown")).await;

        assert_eq!(cursor.poll_once().await, PollOutcome::Dropped { offset: 0 });
        assert!(matches!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 1, .. }
        ));
        assert_eq!(stats.snapshot().decode_failures, 1);
        assert_eq!(stats.snapshot().consumed, 1);
    }

    #[tokio::test]
    async fn resumes_from_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpoints::new());
        let audit: Event = SystemAuditEvent::new("abrown", "login attempt").into();
        append(&store, &audit).await;
        append(&store, &audit).await;
        checkpoints.save(Topic::SystemAuditEvent.as_str(), 0).unwrap();

        let mut cursor = cursor(Topic::SystemAuditEvent, deps(store, checkpoints)).await;
        assert_eq!(cursor.offset(), 0);
        assert_eq!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 1, published: 0 }
        );
    }

    #[tokio::test]
    async fn checkpoint_past_end_of_topic_restarts_from_beginning() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpoints::new());
        checkpoints.save(Topic::UserLoginAttempt.as_str(), 2).unwrap();

        let mut cursor = cursor(
            Topic::UserLoginAttempt,
            deps(store.clone(), checkpoints.clone()),
        )
        .await;
        assert_eq!(cursor.offset(), START_OFFSET);
        append(&store, &login("abrown")).await;

        assert!(matches!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 0, .. }
        ));
        assert_eq!(checkpoints.load(Topic::UserLoginAttempt.as_str()).unwrap(), Some(0));
    }

    #[tokio::test]
    async fn resume_check_waits_for_store() {
        let store = Arc::new(MemoryStore::new());
        let checkpoints = Arc::new(MemoryCheckpoints::new());
        append(&store, &login("abrown")).await;
        append(&store, &login("kwhite")).await;
        checkpoints.save(Topic::UserLoginAttempt.as_str(), 0).unwrap();

        store.set_unavailable(true);
        let mut cursor =
            cursor(Topic::UserLoginAttempt, deps(store.clone(), checkpoints)).await;
        assert_eq!(cursor.poll_once().await, PollOutcome::StoreError);
        assert_eq!(cursor.offset(), 0);

        store.set_unavailable(false);
        assert!(matches!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 1, .. }
        ));
    }

    #[tokio::test]
    async fn store_errors_are_recoverable() {
        let store = Arc::new(MemoryStore::new());
        let mut cursor = cursor(
            Topic::UserLoginAttempt,
            deps(store.clone(), Arc::new(MemoryCheckpoints::new())),
        )
        .await;
        append(&store, &login("abrown")).await;

        store.set_unavailable(true);
        assert_eq!(cursor.poll_once().await, PollOutcome::StoreError);
        assert_eq!(cursor.offset(), START_OFFSET);

        store.set_unavailable(false);
        assert!(matches!(
            cursor.poll_once().await,
            PollOutcome::Handled { offset: 0, .. }
        ));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let cursor = cursor(
            Topic::SystemAuditEvent,
            deps(store, Arc::new(MemoryCheckpoints::new())),
        )
        .await;
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(cursor.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        let offset = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop stopped")
            .unwrap();
        assert_eq!(offset, START_OFFSET);
    }
}
