//! Process-level wiring: one task per route, the generator and the stats
//! reporter, all stopped through a single watch channel.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::cursor::{CursorDeps, PollSettings, TopicCursor};
use super::graph::ChoreographyGraph;
use super::handlers::HandlerContext;
use super::publisher::Publisher;
use super::stats::{run_reporter, PipelineStats};
use crate::core::config::{Config, ConfigError};
use crate::core::random::rng_for;
use crate::core::traits::{CheckpointStore, EventStore};
use crate::sources::login::LoginAttemptGenerator;
use crate::store::CheckpointError;

const GENERATOR_STREAM: u64 = 0;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),
}

pub struct Choreography {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
    publisher: Publisher,
    stats: Arc<PipelineStats>,
}

impl Choreography {
    /// Starts every loop on the current tokio runtime. Checkpoints are checked
    /// against the store before any loop is spawned.
    ///
    /// Fails when `config` does not validate or a cursor checkpoint cannot be
    /// read; nothing is left running in either case.
    pub async fn spawn(
        config: &Config,
        store: Arc<dyn EventStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        graph: ChoreographyGraph,
        started_at: DateTime<Utc>,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        let stats = PipelineStats::new();
        let publisher = Publisher::new(Arc::clone(&store), Arc::clone(&stats));
        let deps = CursorDeps {
            store,
            publisher: publisher.clone(),
            checkpoints,
            graph: Arc::new(graph),
            ctx: Arc::new(HandlerContext::new(config.outcomes.clone(), started_at)),
            stats: Arc::clone(&stats),
            settings: PollSettings::from(&config.polling),
        };

        let mut cursors = Vec::with_capacity(deps.graph.routes().len());
        for (index, route) in deps.graph.routes().iter().enumerate() {
            let rng = rng_for(config.seed, index as u64 + 1);
            cursors.push(TopicCursor::new(route.clone(), deps.clone(), rng).await?);
        }

        let (shutdown, receiver) = watch::channel(false);
        let mut tasks = Vec::with_capacity(cursors.len() + 2);
        for cursor in cursors {
            let name = cursor.topic().to_string();
            let rx = receiver.clone();
            tasks.push((
                name,
                tokio::spawn(async move {
                    cursor.run(rx).await;
                }),
            ));
        }

        if config.generator.enabled {
            let generator = LoginAttemptGenerator::new(
                &config.generator,
                publisher.clone(),
                rng_for(config.seed, GENERATOR_STREAM),
            );
            tasks.push((
                "generator".to_string(),
                tokio::spawn(generator.run(receiver.clone())),
            ));
        }

        tasks.push((
            "stats".to_string(),
            tokio::spawn(run_reporter(
                Arc::clone(&stats),
                Duration::from_millis(config.metrics.interval_ms),
                receiver,
            )),
        ));

        info!(
            tasks = tasks.len(),
            seeded = config.seed.is_some(),
            "choreography started"
        );
        Ok(Self {
            shutdown,
            tasks,
            publisher,
            stats,
        })
    }

    /// Publisher bound to the same store, for injecting events from outside
    /// the chain.
    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Signals every task and waits for them to finish their current record.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.tasks {
            if let Err(err) = handle.await {
                error!(task = %name, error = %err, "task ended abnormally");
            }
        }
        info!("choreography stopped");
    }
}
