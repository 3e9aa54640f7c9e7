//! Confirmation monitor (mode 1)
//!
//! Single owner of every in-flight and cooling entry. Workers hand over
//! freshly funded beneficiaries through a bounded channel; a poll timer
//! classifies them by looking their funding transaction up, and a release
//! timer returns entries to the worker pools once they have sat in a block
//! for longer than the cool-down.

use crate::config::LoadConfig;
use crate::entry::LedgerEntry;
use crate::pool::EntryPool;
use crate::stats::Stats;
use futures::stream::{self, StreamExt};
use ledger_client::{DirectoryError, LedgerError, ShardDirectory, TxLookup};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// An entry whose funding transaction has not been seen in a block yet
#[derive(Debug)]
struct InFlight {
    entry: LedgerEntry,
    /// Consecutive lookups that knew nothing about the transaction
    unknown_polls: u32,
}

#[derive(Debug)]
enum LookupFailure {
    Ledger(LedgerError),
    Unroutable(DirectoryError),
}

/// Counts from one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub included: usize,
    pub pending: usize,
    pub unknown: usize,
    pub dropped: usize,
    pub errors: usize,
}

pub struct ConfirmationMonitor {
    directory: Arc<ShardDirectory>,
    pools: Vec<Arc<EntryPool>>,
    stats: Arc<Stats>,
    queue: Vec<InFlight>,
    /// Included entries keyed by the poll that saw them included
    buckets: BTreeMap<Instant, Vec<LedgerEntry>>,
    poll_interval: Duration,
    release_interval: Duration,
    cool_down: Duration,
    unknown_retry_limit: u32,
    poll_concurrency: usize,
}

impl ConfirmationMonitor {
    pub fn new(
        directory: Arc<ShardDirectory>,
        pools: Vec<Arc<EntryPool>>,
        stats: Arc<Stats>,
        config: &LoadConfig,
    ) -> Self {
        Self {
            directory,
            pools,
            stats,
            queue: Vec::new(),
            buckets: BTreeMap::new(),
            poll_interval: config.poll_interval(),
            release_interval: config.release_interval(),
            cool_down: config.cool_down(),
            unknown_retry_limit: config.unknown_retry_limit,
            poll_concurrency: config.poll_concurrency.max(1),
        }
    }

    /// Entries waiting for a lookup
    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Entries included and cooling down
    pub fn cooling(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.buckets.is_empty()
    }

    /// Accept a beneficiary from a worker
    pub fn enqueue(&mut self, entry: LedgerEntry) {
        if entry.last_tx.is_none() {
            tracing::warn!("Discarding entry {} without a funding transaction", entry.address());
            return;
        }
        self.queue.push(InFlight {
            entry,
            unknown_polls: 0,
        });
    }

    /// Look every queued transaction up and classify it.
    ///
    /// Inclusion is stamped once the lookups have finished, so a slow poll
    /// never eats into the cool-down.
    pub async fn poll_once(&mut self) -> PollSummary {
        let queue = std::mem::take(&mut self.queue);
        let directory = &self.directory;

        let results: Vec<(InFlight, Result<TxLookup, LookupFailure>)> = stream::iter(queue)
            .map(|item| async move {
                let result = lookup(directory, &item.entry).await;
                (item, result)
            })
            .buffer_unordered(self.poll_concurrency)
            .collect()
            .await;
        let observed = Instant::now();

        let mut summary = PollSummary::default();
        for (mut item, result) in results {
            match result {
                Ok(TxLookup::Block(_)) => {
                    item.entry.confirmed = true;
                    self.stats.record_included();
                    self.buckets.entry(observed).or_default().push(item.entry);
                    summary.included += 1;
                }
                Ok(TxLookup::Pool(_)) => {
                    item.unknown_polls = 0;
                    self.stats.record_pending();
                    self.queue.push(item);
                    summary.pending += 1;
                }
                Ok(TxLookup::Unknown) => {
                    item.unknown_polls += 1;
                    summary.unknown += 1;
                    if item.unknown_polls > self.unknown_retry_limit {
                        self.drop_lost(item.entry, "transaction unknown to the ledger");
                        summary.dropped += 1;
                    } else {
                        self.queue.push(item);
                    }
                }
                Err(LookupFailure::Ledger(e)) => {
                    tracing::warn!("Status query for {} failed: {}", item.entry.address(), e);
                    self.stats.record_query_error();
                    self.queue.push(item);
                    summary.errors += 1;
                }
                Err(LookupFailure::Unroutable(e)) => {
                    self.drop_lost(item.entry, &e.to_string());
                    summary.dropped += 1;
                }
            }
        }

        tracing::debug!(
            included = summary.included,
            pending = summary.pending,
            unknown = summary.unknown,
            dropped = summary.dropped,
            errors = summary.errors,
            "Confirmation poll"
        );
        summary
    }

    /// Offer every bucket older than the cool-down back to the pools.
    /// Returns how many entries were released.
    pub fn release_due(&mut self, now: Instant) -> usize {
        let Some(deadline) = now.checked_sub(self.cool_down) else {
            return 0;
        };
        // keys strictly before the deadline are due
        let cooling = self.buckets.split_off(&deadline);
        let due = std::mem::replace(&mut self.buckets, cooling);

        let mut released = 0;
        for entry in due.into_values().flatten() {
            match self.pools.iter().min_by_key(|pool| pool.size()) {
                Some(pool) => {
                    pool.offer(std::iter::once(entry));
                    released += 1;
                }
                None => self.drop_lost(entry, "no worker pool to release into"),
            }
        }

        if released > 0 {
            self.stats.record_recycled(released);
            tracing::info!(
                "Released {} confirmed entries, pool sizes {:?}",
                released,
                self.pools.iter().map(|p| p.size()).collect::<Vec<_>>()
            );
        }
        released
    }

    /// Run until cancelled, or until the intake closes with nothing left to
    /// track. Returns whatever the monitor still held.
    pub async fn run(
        mut self,
        mut intake: mpsc::Receiver<LedgerEntry>,
        token: CancellationToken,
    ) -> Vec<LedgerEntry> {
        let start = Instant::now();
        let mut poll = tokio::time::interval_at(start + self.poll_interval, self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut release =
            tokio::time::interval_at(start + self.release_interval, self.release_interval);
        release.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut intake_open = true;

        tracing::info!(
            "Confirmation monitor started: poll every {:?}, release every {:?}, cool-down {:?}",
            self.poll_interval,
            self.release_interval,
            self.cool_down
        );

        loop {
            if !intake_open && self.is_idle() {
                tracing::info!("Confirmation monitor has nothing left to track");
                break;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                received = intake.recv(), if intake_open => match received {
                    Some(entry) => self.enqueue(entry),
                    None => intake_open = false,
                },
                _ = poll.tick() => {
                    self.poll_once().await;
                }
                _ = release.tick() => {
                    self.release_due(Instant::now());
                }
            }
        }

        // senders holding a permit still get through; recv ends once they have
        intake.close();
        while let Some(entry) = intake.recv().await {
            self.enqueue(entry);
        }
        tracing::info!(
            "Confirmation monitor stopped with {} in flight and {} cooling",
            self.in_flight(),
            self.cooling()
        );
        self.into_held()
    }

    fn into_held(self) -> Vec<LedgerEntry> {
        self.queue
            .into_iter()
            .map(|item| item.entry)
            .chain(self.buckets.into_values().flatten())
            .collect()
    }

    fn drop_lost(&self, entry: LedgerEntry, reason: &str) {
        tracing::warn!(
            "Giving up on {} ({} lost): {}",
            entry.address(),
            entry.spendable,
            reason
        );
        self.stats.record_dropped(entry.spendable);
    }
}

async fn lookup(
    directory: &ShardDirectory,
    entry: &LedgerEntry,
) -> Result<TxLookup, LookupFailure> {
    let Some(hash) = entry.last_tx else {
        return Ok(TxLookup::Unknown);
    };
    let client = directory
        .client_for(&entry.address())
        .map_err(LookupFailure::Unroutable)?;
    let result = client
        .get_transaction_by_hash(&entry.address(), &hash)
        .await
        .map_err(LookupFailure::Ledger);
    tracing::debug!("Lookup {} -> {:?}", hash, result);
    result
}
