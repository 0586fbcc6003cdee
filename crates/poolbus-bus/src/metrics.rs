//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Bus counters and their Prometheus exposure."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use poolbus_proto::FrameKind;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, Opts, Registry};

/// Point-in-time copy of the bus counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BusMetricsSnapshot {
    /// Primary messages decoded.
    pub primary_frames: u64,
    /// Secondary messages decoded.
    pub secondary_frames: u64,
    /// Messages discarded by the parser.
    pub rejected_frames: u64,
    /// Messages delivered to a registered handler.
    pub dispatched: u64,
    /// Messages from addresses without a handler.
    pub unregistered: u64,
    /// Transmissions, retries included.
    pub writes: u64,
    /// Retransmissions after an unanswered attempt.
    pub retries: u64,
    /// Acknowledged writes that ran out of attempts.
    pub ack_timeouts: u64,
}

/// Lock-free counters updated by the reader thread and callers.
#[derive(Debug, Default)]
pub struct BusMetrics {
    primary_frames: AtomicU64,
    secondary_frames: AtomicU64,
    rejected_frames: AtomicU64,
    dispatched: AtomicU64,
    unregistered: AtomicU64,
    writes: AtomicU64,
    retries: AtomicU64,
    ack_timeouts: AtomicU64,
}

impl BusMetrics {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn frame(&self, kind: FrameKind) {
        match kind {
            FrameKind::Primary => self.primary_frames.fetch_add(1, Ordering::Relaxed),
            FrameKind::Secondary => self.secondary_frames.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub(crate) fn rejected(&self) {
        self.rejected_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unregistered(&self) {
        self.unregistered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ack_timeout(&self) {
        self.ack_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values.
    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            primary_frames: self.primary_frames.load(Ordering::Relaxed),
            secondary_frames: self.secondary_frames.load(Ordering::Relaxed),
            rejected_frames: self.rejected_frames.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            ack_timeouts: self.ack_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Expose the counters through `registry`.
    pub fn register(self: &Arc<Self>, registry: &Registry) -> Result<(), prometheus::Error> {
        let collector = BusCollector::new(Arc::clone(self))?;
        registry.register(Box::new(collector))
    }
}

struct BusCollector {
    metrics: Arc<BusMetrics>,
    counters: [IntCounter; 8],
}

impl BusCollector {
    fn new(metrics: Arc<BusMetrics>) -> Result<Self, prometheus::Error> {
        let counter = |name: &str, help: &str| IntCounter::with_opts(Opts::new(name, help));
        Ok(Self {
            metrics,
            counters: [
                counter("poolbus_primary_frames_total", "Primary messages decoded")?,
                counter("poolbus_secondary_frames_total", "Secondary messages decoded")?,
                counter("poolbus_rejected_frames_total", "Messages discarded by the parser")?,
                counter("poolbus_dispatched_total", "Messages delivered to device handlers")?,
                counter("poolbus_unregistered_total", "Messages from unregistered addresses")?,
                counter("poolbus_writes_total", "Transmissions including retries")?,
                counter("poolbus_retries_total", "Retransmissions after an unanswered attempt")?,
                counter("poolbus_ack_timeouts_total", "Acknowledged writes that ran out of attempts")?,
            ],
        })
    }
}

impl Collector for BusCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.counters.iter().flat_map(|counter| counter.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let snapshot = self.metrics.snapshot();
        let values = [
            snapshot.primary_frames,
            snapshot.secondary_frames,
            snapshot.rejected_frames,
            snapshot.dispatched,
            snapshot.unregistered,
            snapshot.writes,
            snapshot.retries,
            snapshot.ack_timeouts,
        ];
        self.counters
            .iter()
            .zip(values)
            .flat_map(|(counter, value)| {
                counter.reset();
                counter.inc_by(value);
                counter.collect()
            })
            .collect()
    }
}
