//! Per-account ledger entry

use ledger_client::{Address, LedgerKeypair, ShardId, TxHash};

/// The harness's own record of one account.
///
/// An entry has exactly one holder at a time (a pool, a worker batch, or
/// the confirmation monitor) and is moved between them, never shared.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    keypair: LedgerKeypair,
    /// Funds this harness believes the account can still spend
    pub spendable: u64,
    /// Next nonce to sign with
    pub nonce: u64,
    /// Most recent transaction that funded or was sent by this entry
    pub last_tx: Option<TxHash>,
    /// Whether `last_tx` has been observed in a block
    pub confirmed: bool,
}

impl LedgerEntry {
    pub fn new(keypair: LedgerKeypair, spendable: u64, nonce: u64) -> Self {
        Self {
            keypair,
            spendable,
            nonce,
            last_tx: None,
            confirmed: false,
        }
    }

    /// A freshly derived beneficiary funded by `tx`
    pub fn beneficiary(keypair: LedgerKeypair, amount: u64, tx: TxHash) -> Self {
        Self {
            keypair,
            spendable: amount,
            nonce: 0,
            last_tx: Some(tx),
            confirmed: false,
        }
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn shard(&self) -> ShardId {
        self.keypair.shard()
    }

    pub fn keypair(&self) -> &LedgerKeypair {
        &self.keypair
    }

    pub fn is_exhausted(&self) -> bool {
        self.spendable == 0
    }
}
