//! Per-chain listener counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time copy of [`ListenerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub logs_received: u64,
    pub logs_skipped: u64,
    pub events_accepted: u64,
    pub decode_errors: u64,
    pub validation_rejections: u64,
    pub store_errors: u64,
    pub subscription_errors: u64,
    pub polls_started: u64,
    pub polls_failed: u64,
    pub poll_requests_dropped: u64,
    pub timer_arms: u64,
}

#[derive(Debug, Default)]
pub struct ListenerMetrics {
    pub logs_received: AtomicU64,
    /// Removed or already-processed logs that never reached the pipeline.
    pub logs_skipped: AtomicU64,
    pub events_accepted: AtomicU64,
    pub decode_errors: AtomicU64,
    pub validation_rejections: AtomicU64,
    pub store_errors: AtomicU64,
    pub subscription_errors: AtomicU64,
    pub polls_started: AtomicU64,
    /// Range queries that errored or timed out.
    pub polls_failed: AtomicU64,
    pub poll_requests_dropped: AtomicU64,
    pub timer_arms: AtomicU64,
}

impl ListenerMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            logs_received: get(&self.logs_received),
            logs_skipped: get(&self.logs_skipped),
            events_accepted: get(&self.events_accepted),
            decode_errors: get(&self.decode_errors),
            validation_rejections: get(&self.validation_rejections),
            store_errors: get(&self.store_errors),
            subscription_errors: get(&self.subscription_errors),
            polls_started: get(&self.polls_started),
            polls_failed: get(&self.polls_failed),
            poll_requests_dropped: get(&self.poll_requests_dropped),
            timer_arms: get(&self.timer_arms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let m = ListenerMetrics::default();
        ListenerMetrics::incr(&m.logs_received);
        ListenerMetrics::incr(&m.logs_received);
        ListenerMetrics::incr(&m.validation_rejections);

        let snap = m.snapshot();
        assert_eq!(snap.logs_received, 2);
        assert_eq!(snap.validation_rejections, 1);
        assert_eq!(snap.events_accepted, 0);
    }
}
