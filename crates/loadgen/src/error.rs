//! Load generator errors

use ledger_client::{Address, DirectoryError, KeyError, LedgerError, ShardId};
use std::path::PathBuf;

/// Why a single send did not happen.
///
/// The source entry is left untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("amount {amount} is not sendable from a balance of {spendable}")]
    InvalidAmount { amount: u64, spendable: u64 },
    #[error("transaction refused by {endpoint}")]
    Rejected { endpoint: String },
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Unroutable(#[from] DirectoryError),
    #[error("failed to derive a beneficiary key: {0}")]
    Key(#[from] KeyError),
}

impl SendError {
    /// Errors that mean the run itself is misconfigured
    pub fn is_fatal(&self) -> bool {
        matches!(self, SendError::Unroutable(_) | SendError::Key(_))
    }
}

/// Errors that stop a run
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed key on line {line}: {source}")]
    InvalidKey {
        line: usize,
        #[source]
        source: KeyError,
    },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("bootstrap query for {address} failed: {source}")]
    Bootstrap {
        address: Address,
        #[source]
        source: LedgerError,
    },
    #[error("no usable accounts: every key is blank, unroutable or unfunded")]
    NoAccounts,
    #[error("no client for shard {0} during the run")]
    UnroutableShard(ShardId),
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl LoadError {
    /// Whether the error happened before any load was sent
    pub fn is_setup(&self) -> bool {
        !matches!(self, LoadError::UnroutableShard(_) | LoadError::TaskFailed(_))
    }
}

impl From<SendError> for LoadError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Unroutable(DirectoryError::UnknownShard(shard)) => {
                LoadError::UnroutableShard(shard)
            }
            other => LoadError::TaskFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_vs_run_errors() {
        assert!(LoadError::NoAccounts.is_setup());
        assert!(LoadError::InvalidConfig("x".into()).is_setup());
        assert!(LoadError::Directory(DirectoryError::Empty).is_setup());
        assert!(!LoadError::UnroutableShard(2).is_setup());
        assert!(!LoadError::TaskFailed("panic".into()).is_setup());
    }

    #[test]
    fn test_unroutable_send_becomes_run_error() {
        let err = SendError::from(DirectoryError::UnknownShard(3));
        assert!(err.is_fatal());
        assert!(matches!(LoadError::from(err), LoadError::UnroutableShard(3)));

        let err = SendError::Ledger(LedgerError::Transport("down".into()));
        assert!(!err.is_fatal());
    }
}
