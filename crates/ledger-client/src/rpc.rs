//! JSON-RPC over HTTP client for a ledger node
//!
//! Method names and payload shapes:
//! - `ledger_sendTransaction [base64 tx]` -> bool
//! - `ledger_getTransactionByHash [address, hash]` -> object or null
//! - `ledger_getBalance [address]` -> `{ "balance": u64 }`
//! - `ledger_getAccountNonce [address]` -> u64
//! - `ledger_getInfo []` -> `{ "coinbase": address }`

use crate::client::{LedgerClient, LedgerError};
use crate::types::{Address, NodeInfo, SignedTransfer, TxHash, TxInfo, TxLookup};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const METHOD_SEND_TRANSACTION: &str = "ledger_sendTransaction";
pub const METHOD_GET_TRANSACTION_BY_HASH: &str = "ledger_getTransactionByHash";
pub const METHOD_GET_BALANCE: &str = "ledger_getBalance";
pub const METHOD_GET_ACCOUNT_NONCE: &str = "ledger_getAccountNonce";
pub const METHOD_GET_INFO: &str = "ledger_getInfo";

/// Transaction object as returned by `ledger_getTransactionByHash`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    /// "block" or "pool"
    pub status: String,
    #[serde(flatten)]
    pub info: TxInfo,
}

impl From<Option<RpcTransaction>> for TxLookup {
    fn from(tx: Option<RpcTransaction>) -> Self {
        match tx {
            Some(tx) if tx.status == "block" => TxLookup::Block(tx.info),
            Some(tx) if tx.status == "pool" => TxLookup::Pool(tx.info),
            _ => TxLookup::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetBalanceResponse {
    pub balance: u64,
}

/// HTTP JSON-RPC ledger client
pub struct JsonRpcClient {
    url: String,
    client: HttpClient,
}

impl JsonRpcClient {
    pub fn connect(url: &str, request_timeout: Duration) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(request_timeout)
            .build(url)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: ArrayParams,
    ) -> Result<R, LedgerError> {
        tracing::trace!("{} -> {}", method, self.url);
        self.client
            .request(method, params)
            .await
            .map_err(map_client_error)
    }
}

fn map_client_error(error: ClientError) -> LedgerError {
    match error {
        ClientError::Call(obj) => LedgerError::Rpc(obj.message().to_string()),
        ClientError::ParseError(e) => LedgerError::InvalidResponse(e.to_string()),
        other => LedgerError::Transport(other.to_string()),
    }
}

#[async_trait]
impl LedgerClient for JsonRpcClient {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn submit_transaction(&self, tx: &SignedTransfer) -> Result<bool, LedgerError> {
        self.call(METHOD_SEND_TRANSACTION, rpc_params![tx.to_base64()])
            .await
    }

    async fn get_transaction_by_hash(
        &self,
        address: &Address,
        hash: &TxHash,
    ) -> Result<TxLookup, LedgerError> {
        let tx: Option<RpcTransaction> = self
            .call(
                METHOD_GET_TRANSACTION_BY_HASH,
                rpc_params![address.to_string(), hash.to_string()],
            )
            .await?;
        Ok(tx.into())
    }

    async fn get_account_balance(&self, address: &Address) -> Result<u64, LedgerError> {
        let response: GetBalanceResponse = self
            .call(METHOD_GET_BALANCE, rpc_params![address.to_string()])
            .await?;
        Ok(response.balance)
    }

    async fn get_account_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        self.call(METHOD_GET_ACCOUNT_NONCE, rpc_params![address.to_string()])
            .await
    }

    async fn get_node_info(&self) -> Result<NodeInfo, LedgerError> {
        self.call(METHOD_GET_INFO, rpc_params![]).await
    }
}
