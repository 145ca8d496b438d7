use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Counters shared by every cursor loop, the generator and the publisher.
#[derive(Debug, Default)]
pub struct PipelineStats {
    consumed: AtomicU64,
    decode_failures: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub consumed: u64,
    pub decode_failures: u64,
    pub published: u64,
    pub publish_failures: u64,
}

impl PipelineStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            consumed: self.consumed.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            consumed: self.consumed.saturating_sub(earlier.consumed),
            decode_failures: self.decode_failures.saturating_sub(earlier.decode_failures),
            published: self.published.saturating_sub(earlier.published),
            publish_failures: self.publish_failures.saturating_sub(earlier.publish_failures),
        }
    }
}

/// Logs throughput once per `interval` until shutdown.
pub async fn run_reporter(
    stats: Arc<PipelineStats>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    let mut last = stats.snapshot();
    let mut last_report = Instant::now();

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let current = stats.snapshot();
                let delta = current.since(&last);
                let secs = last_report.elapsed().as_secs_f64().max(0.000_1);
                info!(
                    consumed_per_sec = %format!("{:.1}", delta.consumed as f64 / secs),
                    published_per_sec = %format!("{:.1}", delta.published as f64 / secs),
                    decode_failures = delta.decode_failures,
                    publish_failures = delta.publish_failures,
                    "pipeline metrics"
                );
                last = current;
                last_report = Instant::now();
            }
        }
    }

    let total = stats.snapshot();
    info!(
        consumed = total.consumed,
        published = total.published,
        decode_failures = total.decode_failures,
        publish_failures = total.publish_failures,
        "pipeline totals"
    );
}
