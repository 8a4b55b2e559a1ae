// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process counters and timings for the orchestration core.
//!
//! The gate, supervisor, dispatcher and RPC channel record into
//! [`GLOBAL_METRICS`] when the `telemetry` feature is enabled. Names live in
//! [`names`] so call sites and reports agree on spelling.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

/// Process-wide collector.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Well-known metric names.
pub mod names {
    pub const GATE_IMMEDIATE: &str = "gate.acquire.immediate";
    pub const GATE_QUEUED: &str = "gate.acquire.queued";
    pub const GATE_WAIT: &str = "gate.acquire.wait";

    pub const TASK_SPAWNED: &str = "task.spawned";
    pub const TASK_COMPLETED: &str = "task.completed";
    pub const TASK_ERROR: &str = "task.error";
    pub const TASK_CANCELLED: &str = "task.cancelled";
    pub const TASK_RUN: &str = "task.run";

    pub const HOOK_INVOKED: &str = "hook.invoked";
    pub const HOOK_FAILED: &str = "hook.failed";
    pub const HOOK_ABORTED: &str = "hook.aborted";

    pub const RPC_REQUEST: &str = "rpc.request";
    pub const RPC_TIMEOUT: &str = "rpc.timeout";
    pub const RPC_REMOTE_ERROR: &str = "rpc.remote_error";
    pub const RPC_MALFORMED_FRAME: &str = "rpc.malformed_frame";
}

/// Named counters plus named timings.
#[derive(Debug)]
pub struct Metrics {
    counters: RwLock<HashMap<&'static str, u64>>,
    timings: RwLock<HashMap<&'static str, Timing>>,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            timings: RwLock::new(HashMap::new()),
            started: Instant::now(),
        }
    }

    pub fn increment(&self, name: &'static str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &'static str, delta: u64) {
        let mut counters = self.counters.write().unwrap_or_else(|e| e.into_inner());
        *counters.entry(name).or_insert(0) += delta;
    }

    /// Record one occurrence of a timed operation.
    pub fn record_operation(&self, name: &'static str, elapsed: Duration) {
        let mut timings = self.timings.write().unwrap_or_else(|e| e.into_inner());
        timings.entry(name).or_default().record(elapsed);
    }

    /// Current value of a counter; zero if never touched.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn timing(&self, name: &str) -> Option<Timing> {
        self.timings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .copied()
    }

    /// Copy out everything recorded so far, sorted by name.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let timings = self
            .timings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        MetricsSnapshot {
            counters,
            timings,
            uptime: self.started.elapsed(),
        }
    }

    pub fn reset(&self) {
        self.counters.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.timings.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Running statistics for one timed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
        }
    }
}

impl Timing {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
    }

    pub fn mean(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub timings: BTreeMap<String, Timing>,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    /// Human-readable report, one metric per line.
    pub fn format_report(&self) -> String {
        let mut report = format!("conductor metrics (uptime {:.2?})\n", self.uptime);
        for (name, value) in &self.counters {
            let _ = writeln!(report, "  {name}: {value}");
        }
        for (name, timing) in &self.timings {
            let _ = writeln!(
                report,
                "  {name}: {} x, mean {:.2?}, max {:.2?}",
                timing.count,
                timing.mean(),
                timing.max
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.increment(names::RPC_REQUEST);
        metrics.increment(names::RPC_REQUEST);
        metrics.add(names::HOOK_FAILED, 3);

        assert_eq!(metrics.counter(names::RPC_REQUEST), 2);
        assert_eq!(metrics.counter(names::HOOK_FAILED), 3);
        assert_eq!(metrics.counter("never.touched"), 0);
    }

    #[test]
    fn test_timing() {
        let metrics = Metrics::new();
        for ms in [10, 20, 30] {
            metrics.record_operation(names::GATE_WAIT, Duration::from_millis(ms));
        }

        let timing = metrics.timing(names::GATE_WAIT).unwrap();
        assert_eq!(timing.count, 3);
        assert_eq!(timing.mean(), Duration::from_millis(20));
        assert_eq!(timing.min, Duration::from_millis(10));
        assert_eq!(timing.max, Duration::from_millis(30));
        assert_eq!(Timing::default().mean(), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = Metrics::new();
        metrics.increment(names::TASK_SPAWNED);
        metrics.record_operation(names::TASK_RUN, Duration::from_millis(5));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters.get(names::TASK_SPAWNED), Some(&1));
        let report = snapshot.format_report();
        assert!(report.contains("task.spawned: 1"), "{report}");
        assert!(report.contains("task.run: 1 x"), "{report}");

        metrics.reset();
        assert_eq!(metrics.counter(names::TASK_SPAWNED), 0);
        assert!(metrics.timing(names::TASK_RUN).is_none());
    }
}
