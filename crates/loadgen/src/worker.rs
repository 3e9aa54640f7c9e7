//! Worker loop: the send phase

use crate::config::SendMode;
use crate::entry::LedgerEntry;
use crate::error::{LoadError, SendError};
use crate::generator::TxGenerator;
use crate::pool::EntryPool;
use crate::rate::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Number of rotation slots in mode 3
pub const ROTATION_SLOTS: usize = 3;

/// How a worker finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Nothing left to send from
    Drained,
    Cancelled,
}

/// Result of one pass over a batch
enum Pass {
    Completed,
    Cancelled,
}

/// Drives one partition of entries through the generator
pub struct Worker {
    id: usize,
    mode: SendMode,
    pool: Arc<EntryPool>,
    generator: TxGenerator,
    limiter: RateLimiter,
    handoff: Option<mpsc::Sender<LedgerEntry>>,
    idle_backoff: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        mode: SendMode,
        pool: Arc<EntryPool>,
        generator: TxGenerator,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            id,
            mode,
            pool,
            generator,
            limiter,
            handoff: None,
            idle_backoff: Duration::from_secs(1),
        }
    }

    /// Channel to the confirmation monitor (mode 1)
    pub fn with_handoff(mut self, handoff: mpsc::Sender<LedgerEntry>) -> Self {
        self.handoff = Some(handoff);
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub async fn run(mut self, token: CancellationToken) -> Result<WorkerExit, LoadError> {
        tracing::info!(
            "Worker {} starting in mode {} with {} entries",
            self.id,
            self.mode,
            self.pool.size()
        );

        let exit = match self.mode {
            SendMode::Rotate => self.run_rotation(&token).await,
            SendMode::Probe | SendMode::FireAndForget => self.run_pooled(&token).await,
        };

        match &exit {
            Ok(exit) => tracing::info!("Worker {} stopped: {:?}", self.id, exit),
            Err(e) => tracing::error!("Worker {} failed: {}", self.id, e),
        }
        exit
    }

    /// Modes 1 and 2: take the whole pool, send once from each entry, put
    /// back whatever can still spend.
    async fn run_pooled(&mut self, token: &CancellationToken) -> Result<WorkerExit, LoadError> {
        loop {
            if token.is_cancelled() {
                return Ok(WorkerExit::Cancelled);
            }

            let mut batch = self.pool.take_all();
            if batch.is_empty() {
                if !self.mode.tracks_confirmations() {
                    return Ok(WorkerExit::Drained);
                }
                // the monitor may still refill the pool
                tokio::select! {
                    _ = token.cancelled() => return Ok(WorkerExit::Cancelled),
                    _ = tokio::time::sleep(self.idle_backoff) => continue,
                }
            }

            tracing::debug!("Worker {} sending from {} entries", self.id, batch.len());
            let pass = self.send_pass(&mut batch, token).await;

            let before = batch.len();
            batch.retain(|entry| self.generator.can_send(entry));
            self.generator.stats().record_exhausted(before - batch.len());
            self.pool.offer(batch);

            if let Pass::Cancelled = pass? {
                return Ok(WorkerExit::Cancelled);
            }
        }
    }

    async fn send_pass(
        &mut self,
        batch: &mut [LedgerEntry],
        token: &CancellationToken,
    ) -> Result<Pass, LoadError> {
        for entry in batch.iter_mut() {
            if !self.throttle(token).await {
                return Ok(Pass::Cancelled);
            }

            let beneficiary = match self.generator.generate(entry).await {
                Ok(beneficiary) => beneficiary,
                Err(e) => {
                    absorb(self.id, entry, e)?;
                    continue;
                }
            };

            if let Some(handoff) = &self.handoff {
                // a full channel blocks here until the monitor catches up
                let permit = tokio::select! {
                    biased;
                    permit = handoff.reserve() => permit.ok(),
                    _ = token.cancelled() => None,
                };
                match permit {
                    Some(permit) => {
                        permit.send(beneficiary);
                        self.generator.stats().record_forwarded();
                    }
                    None => {
                        if !token.is_cancelled() {
                            tracing::warn!("Worker {}: confirmation monitor is gone", self.id);
                        }
                        // keep the funds in the run summary
                        self.pool.offer(std::iter::once(beneficiary));
                        return Ok(Pass::Cancelled);
                    }
                }
            }
        }
        Ok(Pass::Completed)
    }

    /// Mode 3: three slots driven round-robin; every pass replaces each
    /// entry with its successor.
    async fn run_rotation(&mut self, token: &CancellationToken) -> Result<WorkerExit, LoadError> {
        let mut slots = split_slots(self.pool.take_all());
        tracing::info!(
            "Worker {} rotating slots of {:?} entries",
            self.id,
            slots.iter().map(Vec::len).collect::<Vec<_>>()
        );

        let result = self.rotate(&mut slots, token).await;
        // whatever survives goes back for the run summary
        self.pool.offer(slots.into_iter().flatten());
        result
    }

    async fn rotate(
        &mut self,
        slots: &mut [Vec<LedgerEntry>; ROTATION_SLOTS],
        token: &CancellationToken,
    ) -> Result<WorkerExit, LoadError> {
        loop {
            if slots.iter().all(Vec::is_empty) {
                return Ok(WorkerExit::Drained);
            }
            for slot in slots.iter_mut() {
                if token.is_cancelled() {
                    return Ok(WorkerExit::Cancelled);
                }
                let current = std::mem::take(slot);
                let (next, pass) = self.rotate_slot(current, token).await;
                *slot = next;
                if let Pass::Cancelled = pass? {
                    return Ok(WorkerExit::Cancelled);
                }
            }
        }
    }

    /// Send everything out of one slot, returning the successors.
    ///
    /// The successor list always holds every entry with funds, even when
    /// the pass stops early.
    async fn rotate_slot(
        &mut self,
        current: Vec<LedgerEntry>,
        token: &CancellationToken,
    ) -> (Vec<LedgerEntry>, Result<Pass, LoadError>) {
        let mut next = Vec::with_capacity(current.len());
        let mut remaining = current.into_iter();

        while let Some(mut entry) = remaining.next() {
            if !self.generator.can_send(&entry) {
                self.generator.stats().record_exhausted(1);
                continue;
            }
            if !self.throttle(token).await {
                next.push(entry);
                next.extend(remaining);
                return (next, Ok(Pass::Cancelled));
            }

            match self.generator.generate(&mut entry).await {
                Ok(beneficiary) => {
                    if !self.generator.can_send(&entry) {
                        self.generator.stats().record_exhausted(1);
                    } else {
                        next.push(entry);
                    }
                    next.push(beneficiary);
                }
                Err(e) => {
                    let fatal = absorb(self.id, &entry, e);
                    next.push(entry);
                    if let Err(e) = fatal {
                        next.extend(remaining);
                        return (next, Err(e));
                    }
                }
            }
        }
        (next, Ok(Pass::Completed))
    }

    /// Wait for a rate slot; false if cancelled first
    async fn throttle(&mut self, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = self.limiter.throttle() => true,
        }
    }
}

/// Log a failed send, passing fatal ones up
fn absorb(worker: usize, entry: &LedgerEntry, err: SendError) -> Result<(), LoadError> {
    if err.is_fatal() {
        return Err(err.into());
    }
    tracing::debug!(
        worker,
        address = %entry.address(),
        nonce = entry.nonce,
        "Send skipped: {}",
        err
    );
    Ok(())
}

/// Split a partition into contiguous rotation slots, the last taking the
/// remainder
pub fn split_slots(mut entries: Vec<LedgerEntry>) -> [Vec<LedgerEntry>; ROTATION_SLOTS] {
    let unit = entries.len() / ROTATION_SLOTS;
    let third = entries.split_off(unit * 2);
    let second = entries.split_off(unit);
    [entries, second, third]
}

/// Sum of spendable amounts across rotation slots
pub fn slot_total(slots: &[Vec<LedgerEntry>]) -> u64 {
    slots.iter().flatten().map(|e| e.spendable).sum()
}
