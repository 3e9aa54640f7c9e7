//! Transaction generator: one signed transfer per call

use crate::amount::AmountStrategy;
use crate::entry::LedgerEntry;
use crate::error::SendError;
use crate::stats::Stats;
use ledger_client::{LedgerKeypair, ShardDirectory, Transfer};
use std::sync::Arc;

/// Builds, signs and submits transfers out of ledger entries
#[derive(Clone)]
pub struct TxGenerator {
    directory: Arc<ShardDirectory>,
    strategy: Arc<dyn AmountStrategy>,
    fee: u64,
    stats: Arc<Stats>,
}

impl TxGenerator {
    pub fn new(
        directory: Arc<ShardDirectory>,
        strategy: Arc<dyn AmountStrategy>,
        fee: u64,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            directory,
            strategy,
            fee,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Whether `entry` can still pay for a transfer of at least one unit
    pub fn can_send(&self, entry: &LedgerEntry) -> bool {
        entry.spendable > self.fee
    }

    /// Send part of `source` to a fresh account on the same shard.
    ///
    /// On success the source is debited by the amount plus the fee, its
    /// nonce advances, and the new beneficiary entry is returned. On any
    /// error the source is unchanged.
    pub async fn generate(&self, source: &mut LedgerEntry) -> Result<LedgerEntry, SendError> {
        let budget = source.spendable.saturating_sub(self.fee);
        let amount = self.strategy.amount(budget);
        if amount == 0 || amount > budget {
            return Err(SendError::InvalidAmount {
                amount,
                spendable: source.spendable,
            });
        }

        let client = self.directory.client_for(&source.address())?;
        let beneficiary = LedgerKeypair::generate_on_shard(source.shard(), &mut rand::thread_rng())?;

        let signed = Transfer {
            from: source.address(),
            to: beneficiary.address(),
            amount,
            fee: self.fee,
            nonce: source.nonce,
        }
        .sign(source.keypair());
        let hash = signed.hash;

        let accepted = match client.submit_transaction(&signed).await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.stats.record_failed();
                return Err(e.into());
            }
        };
        if !accepted {
            self.stats.record_failed();
            return Err(SendError::Rejected {
                endpoint: client.endpoint().to_string(),
            });
        }

        source.spendable -= amount + self.fee;
        source.nonce += 1;
        source.last_tx = Some(hash);
        self.stats.record_submitted();

        tracing::debug!(
            from = %signed.transfer.from,
            to = %signed.transfer.to,
            amount,
            nonce = signed.transfer.nonce,
            tx = %hash,
            "Transfer submitted"
        );

        Ok(LedgerEntry::beneficiary(beneficiary, amount, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::{FullAmount, RandomAmount, ScriptedAmount};
    use ledger_client::{LedgerClient, MemoryLedger, TxLookup};

    fn funded(ledger: &MemoryLedger, amount: u64) -> LedgerEntry {
        let keypair =
            LedgerKeypair::generate_on_shard(ledger.shard(), &mut rand::thread_rng()).unwrap();
        ledger.fund(keypair.address(), amount);
        LedgerEntry::new(keypair, amount, 0)
    }

    fn generator(
        ledger: Arc<MemoryLedger>,
        strategy: Arc<dyn AmountStrategy>,
    ) -> TxGenerator {
        with_fee(ledger, strategy, 0)
    }

    fn with_fee(
        ledger: Arc<MemoryLedger>,
        strategy: Arc<dyn AmountStrategy>,
        fee: u64,
    ) -> TxGenerator {
        let directory = ShardDirectory::new().with_client(ledger.shard(), ledger);
        TxGenerator::new(Arc::new(directory), strategy, fee, Arc::new(Stats::new()))
    }

    #[tokio::test]
    async fn test_success_debits_source() {
        let ledger = Arc::new(MemoryLedger::new(1));
        let generator = generator(ledger.clone(), Arc::new(ScriptedAmount::new(vec![30])));
        let mut source = funded(&ledger, 100);

        let beneficiary = generator.generate(&mut source).await.unwrap();

        assert_eq!(source.spendable, 70);
        assert_eq!(source.nonce, 1);
        assert_eq!(beneficiary.spendable, 30);
        assert_eq!(beneficiary.nonce, 0);
        assert_eq!(beneficiary.shard(), source.shard());
        assert_eq!(beneficiary.last_tx, source.last_tx);
        assert!(!beneficiary.confirmed);

        let lookup = ledger
            .get_transaction_by_hash(&source.address(), &beneficiary.last_tx.unwrap())
            .await
            .unwrap();
        assert!(matches!(lookup, TxLookup::Pool(_)));
        assert_eq!(ledger.balance(&beneficiary.address()), 30);
        assert_eq!(generator.stats().submitted(), 1);
    }

    #[tokio::test]
    async fn test_full_drain_leaves_room_for_fee() {
        let ledger = Arc::new(MemoryLedger::new(1));
        let generator = with_fee(ledger.clone(), Arc::new(FullAmount), 1);
        let mut source = funded(&ledger, 10);

        let beneficiary = generator.generate(&mut source).await.unwrap();
        assert_eq!(beneficiary.spendable, 9);
        assert_eq!(source.spendable, 0);
        assert_eq!(ledger.balance(&source.address()), 0);
        assert_eq!(ledger.balance(&beneficiary.address()), 9);

        // one unit cannot cover a unit transfer plus the fee
        let mut dust = funded(&ledger, 1);
        assert!(!generator.can_send(&dust));
        let err = generator.generate(&mut dust).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidAmount { amount: 0, spendable: 1 }));
        assert_eq!(ledger.accepted_count(), 1);
    }

    #[tokio::test]
    async fn test_rejection_leaves_source_untouched() {
        let ledger = Arc::new(MemoryLedger::new(2));
        ledger.set_reject_all(true);
        let generator = generator(ledger.clone(), Arc::new(RandomAmount));
        let mut source = funded(&ledger, 100);

        let err = generator.generate(&mut source).await.unwrap_err();
        assert!(matches!(err, SendError::Rejected { .. }));
        assert_eq!(source.spendable, 100);
        assert_eq!(source.nonce, 0);
        assert!(source.last_tx.is_none());
        assert_eq!(generator.stats().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_invalid_amounts_are_not_sent() {
        let ledger = Arc::new(MemoryLedger::new(3));
        let generator = generator(ledger.clone(), Arc::new(FullAmount));
        let mut empty = funded(&ledger, 0);

        let err = generator.generate(&mut empty).await.unwrap_err();
        assert!(matches!(err, SendError::InvalidAmount { amount: 0, .. }));
        assert_eq!(ledger.accepted_count(), 0);
    }

    #[tokio::test]
    async fn test_unregistered_shard_is_fatal() {
        let ledger = Arc::new(MemoryLedger::new(1));
        let generator = generator(ledger, Arc::new(FullAmount));
        let keypair = LedgerKeypair::generate_on_shard(4, &mut rand::thread_rng()).unwrap();
        let mut source = LedgerEntry::new(keypair, 10, 0);

        let err = generator.generate(&mut source).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(source.spendable, 10);
    }

    #[tokio::test]
    async fn test_single_unit_moves_whole() {
        let ledger = Arc::new(MemoryLedger::new(4));
        let generator = generator(ledger.clone(), Arc::new(RandomAmount));
        let mut source = funded(&ledger, 1);

        let beneficiary = generator.generate(&mut source).await.unwrap();
        assert!(source.is_exhausted());
        assert_eq!(beneficiary.spendable, 1);
    }
}
