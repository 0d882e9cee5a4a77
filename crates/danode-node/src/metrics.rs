use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Points in the batch pipeline that are metered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Stored,
    Validated,
    Signed,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Received, Stage::Stored, Stage::Validated, Stage::Signed];

    fn index(self) -> usize {
        match self {
            Stage::Received => 0,
            Stage::Stored => 1,
            Stage::Validated => 2,
            Stage::Signed => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Stored => "stored",
            Stage::Validated => "validated",
            Stage::Signed => "signed",
        };
        f.write_str(name)
    }
}

/// Sink for pipeline and socket observations.
pub trait Metrics: Send + Sync {
    /// A batch of `bytes` encoded size reached `stage`.
    fn accept_batch(&self, stage: Stage, bytes: u64);

    /// Time spent in `stage`. Storage and validation are timed on their own;
    /// signing is timed from receipt.
    fn observe_latency(&self, stage: Stage, elapsed: Duration);

    fn record_socket_address_change(&self);

    /// Current counters, for sinks that keep them.
    fn snapshot(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn accept_batch(&self, _stage: Stage, _bytes: u64) {}
    fn observe_latency(&self, _stage: Stage, _elapsed: Duration) {}
    fn record_socket_address_change(&self) {}
}

#[derive(Debug, Default)]
struct StageCounters {
    batches: AtomicU64,
    bytes: AtomicU64,
    latency_micros: AtomicU64,
    latency_samples: AtomicU64,
}

/// In-memory counters, readable through [`NodeMetrics::snapshot`].
#[derive(Debug, Default)]
pub struct NodeMetrics {
    stages: [StageCounters; 4],
    socket_address_changes: AtomicU64,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> MetricsSnapshot {
        let stages = Stage::ALL
            .iter()
            .map(|stage| {
                let c = &self.stages[stage.index()];
                let samples = c.latency_samples.load(Ordering::Relaxed);
                let total = c.latency_micros.load(Ordering::Relaxed);
                StageSnapshot {
                    stage: *stage,
                    batches: c.batches.load(Ordering::Relaxed),
                    bytes: c.bytes.load(Ordering::Relaxed),
                    mean_latency_micros: if samples == 0 { 0 } else { total / samples },
                }
            })
            .collect();
        MetricsSnapshot {
            stages,
            socket_address_changes: self.socket_address_changes.load(Ordering::Relaxed),
        }
    }
}

impl Metrics for NodeMetrics {
    fn accept_batch(&self, stage: Stage, bytes: u64) {
        let c = &self.stages[stage.index()];
        c.batches.fetch_add(1, Ordering::Relaxed);
        c.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn observe_latency(&self, stage: Stage, elapsed: Duration) {
        let c = &self.stages[stage.index()];
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        c.latency_micros.fetch_add(micros, Ordering::Relaxed);
        c.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn record_socket_address_change(&self) {
        self.socket_address_changes.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Option<MetricsSnapshot> {
        Some(self.counters())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageSnapshot {
    pub stage: Stage,
    pub batches: u64,
    pub bytes: u64,
    pub mean_latency_micros: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub stages: Vec<StageSnapshot>,
    pub socket_address_changes: u64,
}

impl MetricsSnapshot {
    pub fn stage(&self, stage: Stage) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}
