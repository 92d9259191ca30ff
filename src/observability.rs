use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub phases: BTreeMap<String, PhaseMetrics>,
    pub fetch: FetchCounters,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct FetchCounters {
    pub attempts: u64,
    pub container_failures: u64,
    pub decode_failures: u64,
    pub replacements: u64,
    pub successes: u64,
    pub exhausted: u64,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct PhaseMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

/// Outcome of one step of the fetch loop, as counted by [`MetricsCollector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchEvent {
    Attempt,
    ContainerFailure,
    DecodeFailure,
    Replacement,
    Success,
    Exhausted,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn global() -> &'static MetricsCollector {
        static INSTANCE: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);
        &INSTANCE
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn start_phase(&self, phase: &str) -> PhaseTimer {
        PhaseTimer {
            phase: phase.to_string(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record(&self, event: FetchEvent) {
        if let Ok(mut guard) = self.inner.lock() {
            let counters = &mut guard.fetch;
            let slot = match event {
                FetchEvent::Attempt => &mut counters.attempts,
                FetchEvent::ContainerFailure => &mut counters.container_failures,
                FetchEvent::DecodeFailure => &mut counters.decode_failures,
                FetchEvent::Replacement => &mut counters.replacements,
                FetchEvent::Success => &mut counters.successes,
                FetchEvent::Exhausted => &mut counters.exhausted,
            };
            *slot += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

/// Records the elapsed time of a fetch phase when dropped.
pub struct PhaseTimer {
    phase: String,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl PhaseTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.phases.entry(self.phase.clone()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(phase = self.phase.as_str(), duration_ms, "Phase duration recorded");
        self.recorded = true;
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    let fetch = &snapshot.fetch;
    info!(
        attempts = fetch.attempts,
        successes = fetch.successes,
        container_failures = fetch.container_failures,
        decode_failures = fetch.decode_failures,
        replacements = fetch.replacements,
        exhausted = fetch.exhausted,
        "Fetch metrics summary"
    );
    for (phase, metrics) in &snapshot.phases {
        info!(
            phase = phase.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Phase metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_phases_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record(FetchEvent::Attempt);
        metrics.record(FetchEvent::Attempt);
        metrics.record(FetchEvent::DecodeFailure);
        {
            let _timer = metrics.start_phase("decode");
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch.attempts, 2);
        assert_eq!(snapshot.fetch.decode_failures, 1);
        assert_eq!(snapshot.phases["decode"].calls, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
