//! In-memory ledger shard
//!
//! Behaves like a single node serving one shard: it checks signatures and
//! nonces, moves balances when it accepts a transfer, keeps accepted
//! transfers in a pending pool until a block is sealed, and answers the
//! same queries a real node does. Used for dry runs and tests.

use crate::client::{LedgerClient, LedgerError};
use crate::keys::LedgerKeypair;
use crate::types::{Address, NodeInfo, ShardId, SignedTransfer, Transfer, TxHash, TxInfo, TxLookup};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// When accepted transfers show up in a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InclusionPolicy {
    /// Stay in the pool until [`MemoryLedger::seal_block`]
    #[default]
    Sealed,
    /// Go straight into a block
    Immediate,
}

#[derive(Debug, Clone, Copy, Default)]
struct AccountState {
    balance: u64,
    nonce: u64,
}

#[derive(Debug, Clone)]
struct TxRecord {
    info: TxInfo,
    included: bool,
}

/// In-memory ledger shard
pub struct MemoryLedger {
    shard: ShardId,
    coinbase: Address,
    endpoint: String,
    policy: InclusionPolicy,
    accounts: DashMap<Address, AccountState>,
    transactions: DashMap<TxHash, TxRecord>,
    /// Accepted but not yet sealed, in acceptance order
    pool: Mutex<Vec<TxHash>>,
    /// Every accepted transfer, in acceptance order
    accepted: Mutex<Vec<Transfer>>,
    reject_all: AtomicBool,
    height: AtomicU64,
}

impl MemoryLedger {
    /// Create an empty ledger serving `shard`
    pub fn new(shard: ShardId) -> Self {
        let coinbase = LedgerKeypair::generate_on_shard(shard, &mut rand::thread_rng())
            .map(|kp| kp.address())
            .unwrap_or_else(|_| Address::new([0u8; 32]));

        Self {
            shard,
            coinbase,
            endpoint: format!("memory://shard-{}", shard),
            policy: InclusionPolicy::default(),
            accounts: DashMap::new(),
            transactions: DashMap::new(),
            pool: Mutex::new(Vec::new()),
            accepted: Mutex::new(Vec::new()),
            reject_all: AtomicBool::new(false),
            height: AtomicU64::new(0),
        }
    }

    pub fn with_policy(mut self, policy: InclusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn shard(&self) -> ShardId {
        self.shard
    }

    /// Credit `amount` to `address`
    pub fn fund(&self, address: Address, amount: u64) {
        self.accounts.entry(address).or_default().balance += amount;
    }

    /// Refuse every submission while set
    pub fn set_reject_all(&self, reject: bool) {
        self.reject_all.store(reject, Ordering::SeqCst);
    }

    /// Move every pooled transfer into a new block, returning how many
    pub fn seal_block(&self) -> usize {
        let sealed: Vec<TxHash> = std::mem::take(&mut *self.pool.lock());
        for hash in &sealed {
            if let Some(mut record) = self.transactions.get_mut(hash) {
                record.included = true;
            }
        }
        self.height.fetch_add(1, Ordering::SeqCst);
        sealed.len()
    }

    /// Lose all knowledge of a transaction, as if it were evicted
    pub fn forget(&self, hash: &TxHash) -> bool {
        self.pool.lock().retain(|h| h != hash);
        self.transactions.remove(hash).is_some()
    }

    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    pub fn pool_len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    pub fn nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or(0)
    }

    /// Accepted transfers in acceptance order
    pub fn accepted(&self) -> Vec<Transfer> {
        self.accepted.lock().clone()
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().len()
    }

    /// Apply a transfer, returning why it was refused if it was
    fn apply(&self, tx: &SignedTransfer) -> Result<(), &'static str> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Err("rejecting all submissions");
        }
        if !tx.verify() {
            return Err("bad signature");
        }
        let transfer = &tx.transfer;
        if transfer.from.shard() != self.shard {
            return Err("sender on another shard");
        }
        if transfer.amount == 0 {
            return Err("zero amount");
        }
        if self.transactions.contains_key(&tx.hash) {
            return Err("duplicate transaction");
        }

        {
            // Guard must drop before touching the receiver entry
            let mut sender = self
                .accounts
                .get_mut(&transfer.from)
                .ok_or("unknown sender")?;
            if transfer.nonce != sender.nonce {
                return Err("nonce mismatch");
            }
            // the fee is burned
            let cost = transfer
                .amount
                .checked_add(transfer.fee)
                .ok_or("amount overflow")?;
            if sender.balance < cost {
                return Err("insufficient balance");
            }
            sender.balance -= cost;
            sender.nonce += 1;
        }
        self.accounts.entry(transfer.to).or_default().balance += transfer.amount;

        let included = self.policy == InclusionPolicy::Immediate;
        self.transactions.insert(
            tx.hash,
            TxRecord {
                info: TxInfo {
                    from: transfer.from,
                    to: transfer.to,
                    amount: transfer.amount,
                    nonce: transfer.nonce,
                },
                included,
            },
        );
        if !included {
            self.pool.lock().push(tx.hash);
        }
        self.accepted.lock().push(transfer.clone());
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn submit_transaction(&self, tx: &SignedTransfer) -> Result<bool, LedgerError> {
        match self.apply(tx) {
            Ok(()) => Ok(true),
            Err(reason) => {
                tracing::debug!("Shard {} refused {}: {}", self.shard, tx.hash, reason);
                Ok(false)
            }
        }
    }

    async fn get_transaction_by_hash(
        &self,
        _address: &Address,
        hash: &TxHash,
    ) -> Result<TxLookup, LedgerError> {
        Ok(match self.transactions.get(hash) {
            Some(record) if record.included => TxLookup::Block(record.info.clone()),
            Some(record) => TxLookup::Pool(record.info.clone()),
            None => TxLookup::Unknown,
        })
    }

    async fn get_account_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self.balance(address))
    }

    async fn get_account_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        Ok(self.nonce(address))
    }

    async fn get_node_info(&self) -> Result<NodeInfo, LedgerError> {
        Ok(NodeInfo {
            coinbase: self.coinbase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(ledger: &MemoryLedger, amount: u64) -> LedgerKeypair {
        let keypair =
            LedgerKeypair::generate_on_shard(ledger.shard(), &mut rand::thread_rng()).unwrap();
        ledger.fund(keypair.address(), amount);
        keypair
    }

    fn transfer(from: &LedgerKeypair, to: Address, amount: u64, nonce: u64) -> SignedTransfer {
        Transfer {
            from: from.address(),
            to,
            amount,
            fee: 1,
            nonce,
        }
        .sign(from)
    }

    #[tokio::test]
    async fn test_accept_moves_balance_and_nonce() {
        let ledger = MemoryLedger::new(1);
        let sender = funded(&ledger, 100);
        let receiver = Address::new([7u8; 32]);

        let tx = transfer(&sender, receiver, 40, 0);
        assert!(ledger.submit_transaction(&tx).await.unwrap());

        assert_eq!(ledger.balance(&sender.address()), 59);
        assert_eq!(ledger.nonce(&sender.address()), 1);
        assert_eq!(ledger.balance(&receiver), 40);
        assert_eq!(ledger.accepted_count(), 1);
    }

    #[tokio::test]
    async fn test_refusals() {
        let ledger = MemoryLedger::new(1);
        let sender = funded(&ledger, 10);
        let receiver = Address::new([7u8; 32]);

        // wrong nonce
        assert!(!ledger
            .submit_transaction(&transfer(&sender, receiver, 1, 5))
            .await
            .unwrap());
        // too much
        assert!(!ledger
            .submit_transaction(&transfer(&sender, receiver, 11, 0))
            .await
            .unwrap());
        // unfunded sender
        let stranger = LedgerKeypair::generate_on_shard(1, &mut rand::thread_rng()).unwrap();
        assert!(!ledger
            .submit_transaction(&transfer(&stranger, receiver, 1, 0))
            .await
            .unwrap());

        ledger.set_reject_all(true);
        assert!(!ledger
            .submit_transaction(&transfer(&sender, receiver, 1, 0))
            .await
            .unwrap());

        assert_eq!(ledger.balance(&sender.address()), 10);
        assert_eq!(ledger.nonce(&sender.address()), 0);
        assert_eq!(ledger.accepted_count(), 0);
    }

    #[tokio::test]
    async fn test_fee_is_charged() {
        let ledger = MemoryLedger::new(4);
        let sender = funded(&ledger, 10);
        let receiver = Address::new([3u8; 32]);

        // the whole balance leaves nothing for the fee
        assert!(!ledger
            .submit_transaction(&transfer(&sender, receiver, 10, 0))
            .await
            .unwrap());
        assert!(ledger
            .submit_transaction(&transfer(&sender, receiver, 9, 0))
            .await
            .unwrap());
        assert_eq!(ledger.balance(&sender.address()), 0);
        assert_eq!(ledger.balance(&receiver), 9);
    }

    #[tokio::test]
    async fn test_pool_then_block() {
        let ledger = MemoryLedger::new(2);
        let sender = funded(&ledger, 10);
        let tx = transfer(&sender, Address::new([1u8; 32]), 3, 0);
        ledger.submit_transaction(&tx).await.unwrap();

        let lookup = ledger
            .get_transaction_by_hash(&sender.address(), &tx.hash)
            .await
            .unwrap();
        assert!(matches!(lookup, TxLookup::Pool(_)));

        assert_eq!(ledger.seal_block(), 1);
        assert_eq!(ledger.height(), 1);
        let lookup = ledger
            .get_transaction_by_hash(&sender.address(), &tx.hash)
            .await
            .unwrap();
        assert!(lookup.is_included());

        assert!(ledger.forget(&tx.hash));
        let lookup = ledger
            .get_transaction_by_hash(&sender.address(), &tx.hash)
            .await
            .unwrap();
        assert_eq!(lookup, TxLookup::Unknown);
    }

    #[tokio::test]
    async fn test_immediate_inclusion() {
        let ledger = MemoryLedger::new(3).with_policy(InclusionPolicy::Immediate);
        let sender = funded(&ledger, 10);
        let tx = transfer(&sender, Address::new([1u8; 32]), 3, 0);
        ledger.submit_transaction(&tx).await.unwrap();

        assert_eq!(ledger.pool_len(), 0);
        let lookup = ledger
            .get_transaction_by_hash(&sender.address(), &tx.hash)
            .await
            .unwrap();
        assert!(lookup.is_included());
    }

    #[tokio::test]
    async fn test_node_info_reports_own_shard() {
        for shard in 1..=crate::types::SHARD_COUNT {
            let ledger = MemoryLedger::new(shard);
            assert_eq!(ledger.get_node_info().await.unwrap().shard(), shard);
        }
    }
}
