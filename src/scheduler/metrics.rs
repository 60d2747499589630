use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Tracks counters for the tick scheduler
#[derive(Clone, Debug, Default)]
pub struct SchedulerMetrics {
    /// Ticks run since start
    ticks: Arc<AtomicU64>,

    /// Entity transitions observed, automatic and manual
    transitions: Arc<AtomicU64>,

    overrides_applied: Arc<AtomicU64>,
    overrides_rejected: Arc<AtomicU64>,

    transients_fired: Arc<AtomicU64>,
    standing_raised: Arc<AtomicU64>,

    /// Duration of the most recent tick in microseconds
    last_tick_micros: Arc<AtomicU64>,

    /// WebSocket connection count
    websocket_connections: Arc<AtomicU64>,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed tick
    pub fn record_tick(&self, transitions: usize, transients: usize, micros: u64) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.transitions
            .fetch_add(transitions as u64, Ordering::Relaxed);
        self.transients_fired
            .fetch_add(transients as u64, Ordering::Relaxed);
        self.last_tick_micros.store(micros, Ordering::Relaxed);
    }

    pub fn record_standing_raised(&self) {
        self.standing_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_override(&self, applied: bool) {
        if applied {
            self.overrides_applied.fetch_add(1, Ordering::Relaxed);
            self.transitions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.overrides_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_ws_connection(&self) {
        self.websocket_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_ws_connection(&self) {
        self.websocket_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks(),
            transitions: self.transitions.load(Ordering::Relaxed),
            overrides_applied: self.overrides_applied.load(Ordering::Relaxed),
            overrides_rejected: self.overrides_rejected.load(Ordering::Relaxed),
            transients_fired: self.transients_fired.load(Ordering::Relaxed),
            standing_raised: self.standing_raised.load(Ordering::Relaxed),
            last_tick_micros: self.last_tick_micros.load(Ordering::Relaxed),
            websocket_connections: self.websocket_connections.load(Ordering::Relaxed),
        }
    }
}

/// Counters at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub transitions: u64,
    pub overrides_applied: u64,
    pub overrides_rejected: u64,
    pub transients_fired: u64,
    pub standing_raised: u64,
    pub last_tick_micros: u64,
    pub websocket_connections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_recording() {
        let metrics = SchedulerMetrics::new();
        assert_eq!(metrics.ticks(), 0);

        metrics.record_tick(3, 1, 250);
        metrics.record_tick(2, 0, 120);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.transitions, 5);
        assert_eq!(snapshot.transients_fired, 1);
        assert_eq!(snapshot.last_tick_micros, 120);
    }

    #[test]
    fn test_override_counts() {
        let metrics = SchedulerMetrics::new();

        metrics.record_override(true);
        metrics.record_override(false);
        metrics.record_override(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.overrides_applied, 1);
        assert_eq!(snapshot.overrides_rejected, 2);
        assert_eq!(snapshot.transitions, 1);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = SchedulerMetrics::new();
        let clone = metrics.clone();

        clone.increment_ws_connection();
        clone.increment_ws_connection();
        metrics.decrement_ws_connection();

        assert_eq!(metrics.snapshot().websocket_connections, 1);
    }
}
