//! Concurrent probing loop
//!
//! One reachability probe, then N independent workers that keep calling the
//! target until cancelled (or until the optional request budget runs out).

use super::aggregator::Aggregator;
use super::client::{ProbeError, Target};
use crate::config::ProberConfig;
use crate::server::ShutdownSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProberError {
    #[error("ping server: {0}")]
    Unreachable(#[source] ProbeError),

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Shared count of requests workers may still send
struct RequestBudget {
    remaining: AtomicU64,
}

impl RequestBudget {
    fn new(total: u64) -> Self {
        Self {
            remaining: AtomicU64::new(total),
        }
    }

    /// Take one request from the budget; false once exhausted
    fn claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Worker pool driving one target
pub struct Prober {
    target: Arc<dyn Target>,
    aggregator: Arc<Aggregator>,
    workers: u32,
    sleep: Duration,
    max_requests: Option<u64>,
}

impl Prober {
    pub fn new(target: Arc<dyn Target>, aggregator: Arc<Aggregator>, cfg: &ProberConfig) -> Self {
        Self {
            target,
            aggregator,
            workers: cfg.workers.max(1),
            sleep: cfg.sleep,
            max_requests: cfg.max_requests,
        }
    }

    /// Probe until `signal` fires
    ///
    /// Fails only if the initial reachability probe fails; in that case no
    /// worker is started. Cancellation is a clean exit.
    pub async fn run(&self, mut signal: ShutdownSignal) -> Result<(), ProberError> {
        let ping = tokio::select! {
            _ = signal.wait() => {
                info!("Cancelled before the target was reached");
                return Ok(());
            }
            ping = self.target.fetch() => ping,
        };
        let identity = ping.map_err(ProberError::Unreachable)?;
        info!(
            cluster = %identity.cluster,
            pod = %identity.pod,
            workers = self.workers,
            "Target reachable, starting workers"
        );

        let budget = self.max_requests.map(|n| Arc::new(RequestBudget::new(n)));
        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let worker = Worker {
                id,
                target: self.target.clone(),
                aggregator: self.aggregator.clone(),
                sleep: self.sleep,
                budget: budget.clone(),
            };
            workers.spawn(worker.run(signal.clone()));
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                return Err(ProberError::WorkerPanicked(e.to_string()));
            }
        }

        info!(
            successes = self.aggregator.success_total(),
            errors = self.aggregator.error_count(),
            "All workers stopped"
        );
        Ok(())
    }
}

struct Worker {
    id: u32,
    target: Arc<dyn Target>,
    aggregator: Arc<Aggregator>,
    sleep: Duration,
    budget: Option<Arc<RequestBudget>>,
}

impl Worker {
    async fn run(self, mut signal: ShutdownSignal) {
        debug!(worker = self.id, "Worker started");

        loop {
            if signal.is_shutdown() {
                break;
            }

            if !self.sleep.is_zero() {
                tokio::select! {
                    _ = signal.wait() => break,
                    _ = tokio::time::sleep(self.sleep) => {}
                }
            }

            if let Some(budget) = &self.budget {
                if !budget.claim() {
                    debug!(worker = self.id, "Request budget exhausted");
                    break;
                }
            }

            let outcome = tokio::select! {
                _ = signal.wait() => break,
                outcome = self.target.fetch() => outcome,
            };

            match outcome {
                Ok(identity) => self
                    .aggregator
                    .increment_success(&identity.cluster, &identity.pod),
                Err(e) => {
                    self.aggregator.increment_error();
                    warn!(worker = self.id, class = e.class(), error = %e, "Request failed");
                }
            }
        }

        debug!(worker = self.id, "Worker stopped");
    }
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
