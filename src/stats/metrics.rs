//! Statistics for the device coordinator

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters updated by the coordinator loops
#[derive(Debug)]
pub struct CoordinatorStats {
    started_at: Instant,
    poll_rounds: AtomicU64,
    packets_routed: AtomicU64,
    packets_dropped: AtomicU64,
    disconnects: AtomicU64,
    reattachments: AtomicU64,
    failed_attaches: AtomicU64,
    reports_published: AtomicU64,
    reports_failed: AtomicU64,
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            poll_rounds: AtomicU64::new(0),
            packets_routed: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            reattachments: AtomicU64::new(0),
            failed_attaches: AtomicU64::new(0),
            reports_published: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_poll_round(&self) {
        self.poll_rounds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_routed(&self, packets: u64) {
        self.packets_routed.fetch_add(packets, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reattachment(&self) {
        self.reattachments.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_attach(&self) {
        self.failed_attaches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report(&self, ok: bool) {
        if ok {
            self.reports_published.fetch_add(1, Ordering::Relaxed);
        } else {
            self.reports_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.started_at.elapsed(),
            poll_rounds: self.poll_rounds.load(Ordering::Relaxed),
            packets_routed: self.packets_routed.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            reattachments: self.reattachments.load(Ordering::Relaxed),
            failed_attaches: self.failed_attaches.load(Ordering::Relaxed),
            reports_published: self.reports_published.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for CoordinatorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`CoordinatorStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Time since the coordinator was created
    pub uptime: Duration,
    /// Completed polling loop iterations
    pub poll_rounds: u64,
    /// Packets delivered to a live view
    pub packets_routed: u64,
    /// Packets with no live view registered for their key
    pub packets_dropped: u64,
    /// Devices demoted after a failed poll
    pub disconnects: u64,
    /// Successful attaches by the connection loop
    pub reattachments: u64,
    /// Attach attempts that failed or timed out
    pub failed_attaches: u64,
    /// Info and stats reports accepted by the agent
    pub reports_published: u64,
    /// Info and stats reports that could not be fetched or sent
    pub reports_failed: u64,
}

impl StatsSnapshot {
    /// Routed packets per second of uptime
    pub fn packet_rate(&self) -> f64 {
        let secs = self.uptime.as_secs_f64();
        if secs > 0.0 {
            self.packets_routed as f64 / secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_zero() {
        let snapshot = CoordinatorStats::new().snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                uptime: snapshot.uptime,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_counters() {
        let stats = CoordinatorStats::new();
        stats.record_poll_round();
        stats.record_poll_round();
        stats.record_routed(5);
        stats.record_dropped();
        stats.record_disconnect();
        stats.record_reattachment();
        stats.record_failed_attach();
        stats.record_report(true);
        stats.record_report(false);
        stats.record_report(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.poll_rounds, 2);
        assert_eq!(snapshot.packets_routed, 5);
        assert_eq!(snapshot.packets_dropped, 1);
        assert_eq!(snapshot.disconnects, 1);
        assert_eq!(snapshot.reattachments, 1);
        assert_eq!(snapshot.failed_attaches, 1);
        assert_eq!(snapshot.reports_published, 1);
        assert_eq!(snapshot.reports_failed, 2);
    }

    #[test]
    fn test_packet_rate_zero_uptime() {
        let snapshot = StatsSnapshot {
            packets_routed: 100,
            ..Default::default()
        };
        assert_eq!(snapshot.packet_rate(), 0.0);

        let snapshot = StatsSnapshot {
            uptime: Duration::from_secs(4),
            packets_routed: 100,
            ..Default::default()
        };
        assert_eq!(snapshot.packet_rate(), 25.0);
    }
}
