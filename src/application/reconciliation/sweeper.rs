//! Sweeper - scheduled backstop for lost reconciliation triggers.
//!
//! Triggers after phase one are allowed to be lossy (a crash between
//! recording an event and invoking phase two loses nothing but the
//! trigger). This background service periodically finds customers with a
//! non-empty pending backlog and reconciles them, completing the
//! at-least-once guarantee.
//!
//! Safe to run alongside inline triggers and other sweeper instances:
//! every pass is serialized by the per-customer lock and degrades to a
//! cheap no-op when the backlog is already drained.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::time;

use crate::ports::EventStore;

use super::engine::{ReconcileOutcome, ReconciliationEngine};

/// How many customers one sweep cycle reconciles concurrently. Passes for
/// different customers never contend on the same lock.
const SWEEP_CONCURRENCY: usize = 8;

/// Configuration for the sweeper service.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to scan for pending backlogs.
    pub interval: Duration,

    /// Maximum customers to reconcile per sweep cycle.
    pub batch_size: usize,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 50,
        }
    }
}

/// Background service that drains pending reconciliation backlogs.
pub struct Sweeper {
    engine: Arc<ReconciliationEngine>,
    events: Arc<dyn EventStore>,
    config: SweeperConfig,
}

impl Sweeper {
    /// Create a new Sweeper with default configuration.
    pub fn new(engine: Arc<ReconciliationEngine>, events: Arc<dyn EventStore>) -> Self {
        Self {
            engine,
            events,
            config: SweeperConfig::default(),
        }
    }

    /// Create a new Sweeper with custom configuration.
    pub fn with_config(
        engine: Arc<ReconciliationEngine>,
        events: Arc<dyn EventStore>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            engine,
            events,
            config,
        }
    }

    /// Run the sweep loop until the shutdown signal flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("reconciliation sweeper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// One sweep cycle. Returns the number of passes that committed.
    pub async fn sweep_once(&self) -> usize {
        let customers = match self.events.customers_with_pending(self.config.batch_size).await {
            Ok(customers) => customers,
            Err(err) => {
                tracing::warn!(error = %err, "sweep could not list pending customers");
                return 0;
            }
        };

        if customers.is_empty() {
            return 0;
        }

        tracing::debug!(customers = customers.len(), "sweeping pending backlogs");

        let results = stream::iter(customers)
            .map(|customer_id| {
                let engine = Arc::clone(&self.engine);
                async move {
                    match engine.reconcile_customer(&customer_id).await {
                        Ok(outcome) => {
                            tracing::debug!(
                                customer_id = %customer_id,
                                ?outcome,
                                "sweep pass finished"
                            );
                            matches!(outcome, ReconcileOutcome::Completed { .. })
                        }
                        Err(err) if err.is_retryable() => {
                            tracing::warn!(
                                customer_id = %customer_id,
                                error = %err,
                                "sweep pass failed transiently; will retry next cycle"
                            );
                            false
                        }
                        Err(err) => {
                            tracing::error!(
                                customer_id = %customer_id,
                                error = %err,
                                "sweep pass failed fatally"
                            );
                            false
                        }
                    }
                }
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect::<Vec<bool>>()
            .await;

        results.into_iter().filter(|committed| *committed).count()
    }
}
