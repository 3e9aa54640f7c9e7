//! Thread-safe pool of spendable entries
//!
//! The only structure touched by more than one actor: a worker takes
//! entries out to send from them and puts the survivors back, the
//! confirmation monitor offers recycled entries. The lock is held only
//! for the move itself.

use crate::entry::LedgerEntry;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct EntryPool {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl EntryPool {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Take up to `n` entries from the front of the pool
    pub fn take(&self, n: usize) -> Vec<LedgerEntry> {
        let mut entries = self.entries.lock();
        let n = n.min(entries.len());
        entries.drain(..n).collect()
    }

    /// Take everything
    pub fn take_all(&self) -> Vec<LedgerEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Append entries to the back of the pool
    pub fn offer<I>(&self, entries: I)
    where
        I: IntoIterator<Item = LedgerEntry>,
    {
        self.entries.lock().extend(entries);
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Sum of spendable amounts currently pooled
    pub fn total_spendable(&self) -> u64 {
        self.entries.lock().iter().map(|e| e.spendable).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::LedgerKeypair;

    fn entry(spendable: u64) -> LedgerEntry {
        LedgerEntry::new(LedgerKeypair::generate(&mut rand::thread_rng()), spendable, 0)
    }

    #[test]
    fn test_take_and_offer() {
        let pool = EntryPool::new(vec![entry(1), entry(2), entry(3)]);
        assert_eq!(pool.size(), 3);

        let taken = pool.take(2);
        assert_eq!(taken.iter().map(|e| e.spendable).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(pool.size(), 1);

        // asking for more than there is returns what is there
        let rest = pool.take(10);
        assert_eq!(rest.len(), 1);
        assert!(pool.is_empty());

        pool.offer(taken.into_iter().chain(rest));
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.total_spendable(), 6);
    }

    #[test]
    fn test_take_all_moves_ownership() {
        let pool = EntryPool::new(vec![entry(5), entry(0)]);
        let batch = pool.take_all();
        assert_eq!(batch.len(), 2);
        assert_eq!(pool.size(), 0);

        pool.offer(batch.into_iter().filter(|e| !e.is_exhausted()));
        assert_eq!(pool.size(), 1);
    }
}
