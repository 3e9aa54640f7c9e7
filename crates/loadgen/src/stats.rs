//! Run statistics and the periodic reporter

use crate::pool::EntryPool;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counters shared by every task of a run
#[derive(Debug, Default)]
pub struct Stats {
    /// Transfers the ledger accepted
    pub submitted: AtomicU64,
    /// Sends that were refused or errored
    pub failed: AtomicU64,
    /// Entries removed because nothing was left to spend
    pub exhausted: AtomicU64,
    /// Beneficiaries handed to the confirmation monitor
    pub forwarded: AtomicU64,
    /// Transactions observed in a block
    pub included: AtomicU64,
    /// Lookups that found the transaction still pooled
    pub pending_polls: AtomicU64,
    /// Transactions given up on after repeated unknown lookups
    pub dropped: AtomicU64,
    /// Funds lost with dropped transactions
    pub dropped_amount: AtomicU64,
    /// Entries returned to a worker pool after cooling down
    pub recycled: AtomicU64,
    /// Lookups that failed at the RPC level
    pub query_errors: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self, count: usize) {
        self.exhausted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_included(&self) {
        self.included.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending(&self) {
        self.pending_polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, amount: u64) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.dropped_amount.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_recycled(&self, count: usize) {
        self.recycled.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_query_error(&self) {
        self.query_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            included: self.included.load(Ordering::Relaxed),
            pending_polls: self.pending_polls.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dropped_amount: self.dropped_amount.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            query_errors: self.query_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub failed: u64,
    pub exhausted: u64,
    pub forwarded: u64,
    pub included: u64,
    pub pending_polls: u64,
    pub dropped: u64,
    pub dropped_amount: u64,
    pub recycled: u64,
    pub query_errors: u64,
}

impl StatsSnapshot {
    /// Share of send attempts the ledger accepted, between 0.0 and 1.0
    pub fn success_rate(&self) -> f64 {
        let attempts = self.submitted + self.failed;
        if attempts == 0 {
            return 0.0;
        }
        self.submitted as f64 / attempts as f64
    }
}

/// Log throughput and pool sizes every `interval` until cancelled
pub async fn report_loop(
    stats: Arc<Stats>,
    pools: Vec<Arc<EntryPool>>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = stats.submitted();

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = stats.snapshot();
                let delta = snapshot.submitted.saturating_sub(last);
                last = snapshot.submitted;
                let tps = delta as f64 / interval.as_secs_f64();
                let pool_sizes: Vec<usize> = pools.iter().map(|p| p.size()).collect();

                tracing::info!(
                    tps = %format!("{:.1}", tps),
                    submitted = snapshot.submitted,
                    failed = snapshot.failed,
                    included = snapshot.included,
                    recycled = snapshot.recycled,
                    dropped = snapshot.dropped,
                    pools = ?pool_sizes,
                    "Load report"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = Stats::new();
        stats.record_submitted();
        stats.record_submitted();
        stats.record_failed();
        stats.record_dropped(40);
        stats.record_recycled(3);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.submitted, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.dropped_amount, 40);
        assert_eq!(snapshot.recycled, 3);
        assert!((snapshot.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_success_rate_without_attempts() {
        assert_eq!(StatsSnapshot::default().success_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_cancel() {
        let token = CancellationToken::new();
        let handle = tokio::spawn(report_loop(
            Arc::new(Stats::new()),
            vec![Arc::new(EntryPool::default())],
            Duration::from_secs(10),
            token.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(25)).await;
        token.cancel();
        handle.await.unwrap();
    }
}
