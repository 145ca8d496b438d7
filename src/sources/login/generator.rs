use super::templates::{build_login_attempt, build_subject_access_attempt};
use crate::choreography::publisher::{PublishReport, Publisher};
use crate::core::config::GeneratorConfig;
use crate::core::event::Event;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Timer-driven root of the event chain.
pub struct LoginAttemptGenerator<R> {
    rng: R,
    publisher: Publisher,
    login_interval: Duration,
    subject_access_interval: Option<Duration>,
}

impl<R: Rng + Send> LoginAttemptGenerator<R> {
    pub fn new(config: &GeneratorConfig, publisher: Publisher, rng: R) -> Self {
        Self {
            rng,
            publisher,
            login_interval: config.login_interval(),
            subject_access_interval: config.subject_access_interval(),
        }
    }

    /// Publishes one login attempt followed by its "login attempt" audit event.
    pub async fn emit_login_attempt(&mut self) -> PublishReport {
        let (attempt, audit) = build_login_attempt(&mut self.rng);
        debug!(user_name = %attempt.user_name, "generated login attempt");
        self.publisher
            .publish_all([Event::from(attempt), Event::from(audit)])
            .await
    }

    /// Publishes one subject access attempt followed by its audit event.
    pub async fn emit_subject_access_attempt(&mut self) -> PublishReport {
        let (attempt, audit) = build_subject_access_attempt(&mut self.rng);
        debug!(
            user_name = %attempt.user_name,
            subject_identifier = %attempt.subject_identifier,
            "generated subject access attempt"
        );
        self.publisher
            .publish_all([Event::from(attempt), Event::from(audit)])
            .await
    }

    /// Emits on every tick until shutdown. The first login attempt goes out
    /// immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut logins = ticker(self.login_interval);
        let mut accesses = self.subject_access_interval.map(ticker);
        info!(
            login_interval_ms = self.login_interval.as_millis() as u64,
            subject_access = accesses.is_some(),
            "generator started"
        );

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = logins.tick() => {
                    self.emit_login_attempt().await;
                }
                _ = next_tick(&mut accesses) => {
                    self.emit_subject_access_attempt().await;
                }
            }
        }

        info!("generator stopped");
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
