//! Lightweight probe metrics (SPEC_FULL.md §2.1 item 11, §6.1).
//!
//! Modeled directly on the teacher's `edge/core/service.rs::AtomicMetrics`:
//! plain atomics, `Ordering::Relaxed`, no exporter bundled — the embedder
//! scrapes these into whatever Prometheus/OTEL pipeline it already runs.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct AtomicMetrics {
    pub total_probes: AtomicU64,
    pub ok_probes: AtomicU64,
    pub bad_probes: AtomicU64,
    pub timeouts: AtomicU64,
    /// Counts only `ClaimOutcome::TookOver` (a stale owner was displaced),
    /// never the first-ever claim of a previously unclaimed peer.
    pub ownership_takeovers: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_probe(&self, bad: bool, timed_out: bool) {
        self.total_probes.fetch_add(1, Ordering::Relaxed);
        if bad {
            self.bad_probes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ok_probes.fetch_add(1, Ordering::Relaxed);
        }
        if timed_out {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_takeover(&self) {
        self.ownership_takeovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_probes: self.total_probes.load(Ordering::Relaxed),
            ok_probes: self.ok_probes.load(Ordering::Relaxed),
            bad_probes: self.bad_probes.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            ownership_takeovers: self.ownership_takeovers.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub total_probes: u64,
    pub ok_probes: u64,
    pub bad_probes: u64,
    pub timeouts: u64,
    pub ownership_takeovers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::TerminalOutcome;

    #[test]
    fn counts_accumulate() {
        let metrics = AtomicMetrics::new();
        metrics.record_probe(TerminalOutcome::Ok.is_bad(), false);
        metrics.record_probe(TerminalOutcome::Timeout.is_bad(), true);
        let snap = metrics.snapshot();
        assert_eq!(snap.total_probes, 2);
        assert_eq!(snap.ok_probes, 1);
        assert_eq!(snap.bad_probes, 1);
        assert_eq!(snap.timeouts, 1);
    }
}
