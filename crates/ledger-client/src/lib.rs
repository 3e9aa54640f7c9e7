//! Ledger Client - the network boundary of the load generator
//!
//! - Shared types: addresses, shards, transfers, transaction lookups
//! - ed25519 key pairs with shard-targeted generation
//! - `LedgerClient` trait with a JSON-RPC implementation
//! - Shard directory mapping shards to clients
//! - In-memory ledger shard for dry runs and tests

pub mod client;
pub mod directory;
pub mod keys;
pub mod memory;
pub mod rpc;
pub mod types;

pub use client::{LedgerClient, LedgerError};
pub use directory::{DirectoryError, ShardDirectory};
pub use keys::{KeyError, LedgerKeypair};
pub use memory::{InclusionPolicy, MemoryLedger};
pub use rpc::JsonRpcClient;
pub use types::*;
