//! The narrow ledger surface the load generator depends on

use crate::types::{Address, NodeInfo, SignedTransfer, TxHash, TxLookup};
use async_trait::async_trait;

/// Errors talking to a ledger node
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One connection to the node serving a shard
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Human readable endpoint, for logs
    fn endpoint(&self) -> &str;

    /// Submit a signed transfer. `Ok(false)` means the node refused it.
    async fn submit_transaction(&self, tx: &SignedTransfer) -> Result<bool, LedgerError>;

    /// Look up a transaction sent from `address`
    async fn get_transaction_by_hash(
        &self,
        address: &Address,
        hash: &TxHash,
    ) -> Result<TxLookup, LedgerError>;

    async fn get_account_balance(&self, address: &Address) -> Result<u64, LedgerError>;

    async fn get_account_nonce(&self, address: &Address) -> Result<u64, LedgerError>;

    async fn get_node_info(&self) -> Result<NodeInfo, LedgerError>;
}
