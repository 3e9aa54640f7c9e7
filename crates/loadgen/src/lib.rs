//! Load Generator - sustained transfer traffic against a sharded ledger
//!
//! Architecture:
//! - Bootstrap loads funded accounts from a key list behind a join barrier
//! - One worker per partition sends at a per-worker TPS ceiling
//! - Mode 1 hands fresh beneficiaries to a single confirmation monitor,
//!   which returns them to the worker pools once confirmed and cooled down
//! - Mode 2 sends single units until every account is empty
//! - Mode 3 drains full balances along a three-slot rotation

pub mod amount;
pub mod bootstrap;
pub mod config;
pub mod entry;
pub mod error;
pub mod generator;
pub mod monitor;
pub mod pool;
pub mod rate;
pub mod runner;
pub mod stats;
pub mod worker;

pub use amount::{AmountStrategy, FullAmount, RandomAmount, ScriptedAmount, UnitAmount};
pub use bootstrap::{bootstrap, load_key_lines};
pub use config::{LoadConfig, SendMode};
pub use entry::LedgerEntry;
pub use error::{LoadError, SendError};
pub use generator::TxGenerator;
pub use monitor::{ConfirmationMonitor, PollSummary};
pub use pool::EntryPool;
pub use rate::RateLimiter;
pub use runner::{LoadRunner, RunHandle, RunSummary};
pub use stats::{Stats, StatsSnapshot};
pub use worker::{Worker, WorkerExit};
