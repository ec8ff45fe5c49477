use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Process-wide counters. Every field is a relaxed atomic; snapshots are
/// not a consistent cut across fields.
#[derive(Default)]
pub struct ServerMetrics {
    matches_created: AtomicU64,
    matches_started: AtomicU64,
    matches_completed: AtomicU64,
    matches_cancelled: AtomicU64,
    matches_evicted: AtomicU64,
    actions_accepted: AtomicU64,
    actions_rejected: AtomicU64,
    bot_actions: AtomicU64,
    settlements: AtomicU64,
    settlement_failures: AtomicU64,
    reconciliations: AtomicU64,
    turn_timeouts: AtomicU64,
    fill_timeouts: AtomicU64,
    payouts_sent: AtomicU64,
    payouts_failed: AtomicU64,
    ws_connection_reject_global: AtomicU64,
    ws_connection_reject_per_ip: AtomicU64,
    ws_lagged: AtomicU64,
    ws_send_errors: AtomicU64,
    action_latency: LatencyMetrics,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerMetricsSnapshot {
    pub matches_created: u64,
    pub matches_started: u64,
    pub matches_completed: u64,
    pub matches_cancelled: u64,
    pub matches_evicted: u64,
    pub actions_accepted: u64,
    pub actions_rejected: u64,
    pub bot_actions: u64,
    pub settlements: u64,
    pub settlement_failures: u64,
    pub reconciliations: u64,
    pub turn_timeouts: u64,
    pub fill_timeouts: u64,
    pub payouts_sent: u64,
    pub payouts_failed: u64,
    pub ws_connection_reject_global: u64,
    pub ws_connection_reject_per_ip: u64,
    pub ws_lagged: u64,
    pub ws_send_errors: u64,
    pub action_latency: LatencySnapshot,
}

impl ServerMetrics {
    pub fn inc_matches_created(&self) {
        self.matches_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_matches_started(&self) {
        self.matches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_matches_completed(&self) {
        self.matches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_matches_cancelled(&self) {
        self.matches_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_matches_evicted(&self) {
        self.matches_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_actions_accepted(&self) {
        self.actions_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_actions_rejected(&self) {
        self.actions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_bot_actions(&self) {
        self.bot_actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_settlements(&self) {
        self.settlements.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_settlement_failures(&self) {
        self.settlement_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reconciliations(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_turn_timeouts(&self) {
        self.turn_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fill_timeouts(&self) {
        self.fill_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_payouts_sent(&self) {
        self.payouts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_payouts_failed(&self) {
        self.payouts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ws_connection_reject_global(&self) {
        self.ws_connection_reject_global
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ws_connection_reject_per_ip(&self) {
        self.ws_connection_reject_per_ip
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_ws_lagged(&self, skipped: u64) {
        self.ws_lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn inc_ws_send_errors(&self) {
        self.ws_send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_action(&self, duration: Duration) {
        self.action_latency.record(duration);
    }

    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            matches_created: self.matches_created.load(Ordering::Relaxed),
            matches_started: self.matches_started.load(Ordering::Relaxed),
            matches_completed: self.matches_completed.load(Ordering::Relaxed),
            matches_cancelled: self.matches_cancelled.load(Ordering::Relaxed),
            matches_evicted: self.matches_evicted.load(Ordering::Relaxed),
            actions_accepted: self.actions_accepted.load(Ordering::Relaxed),
            actions_rejected: self.actions_rejected.load(Ordering::Relaxed),
            bot_actions: self.bot_actions.load(Ordering::Relaxed),
            settlements: self.settlements.load(Ordering::Relaxed),
            settlement_failures: self.settlement_failures.load(Ordering::Relaxed),
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            turn_timeouts: self.turn_timeouts.load(Ordering::Relaxed),
            fill_timeouts: self.fill_timeouts.load(Ordering::Relaxed),
            payouts_sent: self.payouts_sent.load(Ordering::Relaxed),
            payouts_failed: self.payouts_failed.load(Ordering::Relaxed),
            ws_connection_reject_global: self.ws_connection_reject_global.load(Ordering::Relaxed),
            ws_connection_reject_per_ip: self.ws_connection_reject_per_ip.load(Ordering::Relaxed),
            ws_lagged: self.ws_lagged.load(Ordering::Relaxed),
            ws_send_errors: self.ws_send_errors.load(Ordering::Relaxed),
            action_latency: self.action_latency.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_lands_in_buckets() {
        let metrics = ServerMetrics::default();
        metrics.record_action(Duration::from_millis(3));
        metrics.record_action(Duration::from_millis(7_000));
        let snapshot = metrics.snapshot().action_latency;
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.counts[2], 1);
        assert_eq!(snapshot.overflow, 1);
        assert_eq!(snapshot.max_ms, 7_000);
    }

    #[test]
    fn counters_snapshot() {
        let metrics = ServerMetrics::default();
        metrics.inc_matches_created();
        metrics.inc_matches_created();
        metrics.add_ws_lagged(5);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.matches_created, 2);
        assert_eq!(snapshot.ws_lagged, 5);
        assert_eq!(snapshot.settlements, 0);
    }
}
