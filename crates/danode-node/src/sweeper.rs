use std::sync::Arc;
use std::time::Duration;

use danode_store::{unix_now, ChunkStore, StoreError, SweepReport};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::shutdown::ShutdownSignal;

/// Share of the poll interval one sweep may spend deleting.
const GC_BUDGET_FRACTION: f64 = 0.1;
const MIN_GC_BUDGET: Duration = Duration::from_secs(1);

/// Time budget of one sweep: a tenth of the poll interval, at least one second.
pub fn gc_budget(poll_interval: Duration) -> Duration {
    poll_interval.mul_f64(GC_BUDGET_FRACTION).max(MIN_GC_BUDGET)
}

/// Periodically deletes batches past their retention window.
///
/// Sweeps run one at a time on a blocking thread; the next tick is not taken
/// until the previous sweep has returned.
pub struct ExpirationSweeper {
    store: Arc<ChunkStore>,
    poll_interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<ChunkStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    pub fn budget(&self) -> Duration {
        gc_budget(self.poll_interval)
    }

    /// Run a single sweep against the current wall-clock time.
    pub async fn sweep_once(&self) -> SweepReport {
        let store = self.store.clone();
        let budget = self.budget();
        let report = tokio::task::spawn_blocking(move || {
            store.delete_expired_entries(unix_now(), budget)
        })
        .await;
        let report = match report {
            Ok(report) => report,
            Err(e) => SweepReport {
                deleted: 0,
                result: Err(StoreError::Io(std::io::Error::other(format!(
                    "sweep task failed: {e}"
                )))),
            },
        };
        log_report(&report, budget);
        report
    }

    /// Sweep every poll interval until `shutdown` fires.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            budget_ms = self.budget().as_millis() as u64,
            "expiration sweeper started"
        );
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
        info!("expiration sweeper stopped");
    }
}

fn log_report(report: &SweepReport, budget: Duration) {
    match &report.result {
        Ok(()) if report.deleted > 0 => info!(deleted = report.deleted, "deleted expired batches"),
        Ok(()) => debug!("no expired batches"),
        Err(e) if e.is_deadline_exceeded() => warn!(
            deleted = report.deleted,
            budget_ms = budget.as_millis() as u64,
            "expiration sweep ran out of time"
        ),
        Err(e) => error!(deleted = report.deleted, error = %e, "expiration sweep failed"),
    }
}
