//! Load generator configuration

use crate::amount::{AmountStrategy, FullAmount, RandomAmount, UnitAmount};
use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Transaction generation policy for a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SendMode {
    /// Mode 1: random partial amounts, beneficiaries recycled once confirmed
    #[default]
    Probe,
    /// Mode 2: one unit per send, nothing tracked
    FireAndForget,
    /// Mode 3: full balance moves along a three-slot rotation
    Rotate,
}

impl SendMode {
    pub fn number(self) -> u8 {
        match self {
            SendMode::Probe => 1,
            SendMode::FireAndForget => 2,
            SendMode::Rotate => 3,
        }
    }

    /// Whether sends are handed to the confirmation monitor
    pub fn tracks_confirmations(self) -> bool {
        self == SendMode::Probe
    }

    pub fn default_strategy(self) -> Arc<dyn AmountStrategy> {
        match self {
            SendMode::Probe => Arc::new(RandomAmount),
            SendMode::FireAndForget => Arc::new(UnitAmount),
            SendMode::Rotate => Arc::new(FullAmount),
        }
    }
}

impl TryFrom<u8> for SendMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SendMode::Probe),
            2 => Ok(SendMode::FireAndForget),
            3 => Ok(SendMode::Rotate),
            other => Err(format!("unknown send mode {} (expected 1, 2 or 3)", other)),
        }
    }
}

impl From<SendMode> for u8 {
    fn from(mode: SendMode) -> Self {
        mode.number()
    }
}

impl FromStr for SendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("send mode must be a number, got {:?}", s))?;
        SendMode::try_from(value)
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendMode::Probe => "probe-and-reuse",
            SendMode::FireAndForget => "fire-and-forget",
            SendMode::Rotate => "rotating full-drain",
        };
        write!(f, "{} ({})", self.number(), name)
    }
}

/// Load generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Send ceiling per worker per rate window
    pub tps_per_worker: u32,
    /// Number of worker tasks
    pub workers: usize,
    pub mode: SendMode,
    /// Log every send and status lookup
    pub debug: bool,
    /// Newline separated private keys
    pub key_file: PathBuf,
    /// Ledger RPC endpoints, one or more per shard
    pub endpoints: Vec<String>,
    /// Rate limiter window length
    pub rate_window_ms: u64,
    /// How often in-flight transactions are looked up
    pub poll_interval_secs: u64,
    /// How often cooled-down buckets are swept
    pub release_interval_secs: u64,
    /// Time after inclusion before funds are reused
    pub cool_down_secs: u64,
    /// Consecutive unknown lookups before a transaction is given up on
    pub unknown_retry_limit: u32,
    /// Capacity of the worker -> monitor channel
    pub handoff_capacity: usize,
    /// Concurrent status lookups per poll
    pub poll_concurrency: usize,
    /// Pause while a worker's pool is empty
    pub idle_backoff_ms: u64,
    /// How often throughput and pool sizes are logged
    pub report_interval_secs: u64,
    /// Fee attached to each transfer, charged on top of the amount
    pub fee: u64,
    /// Per-request RPC timeout
    pub rpc_timeout_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            tps_per_worker: 3,
            workers: 1,
            mode: SendMode::Probe,
            debug: false,
            key_file: PathBuf::from("keystore.txt"),
            endpoints: Vec::new(),
            rate_window_ms: 1_000,
            poll_interval_secs: 30,
            release_interval_secs: 30,
            cool_down_secs: 120,
            unknown_retry_limit: 3,
            handoff_capacity: 100_000,
            poll_concurrency: 32,
            idle_backoff_ms: 1_000,
            report_interval_secs: 10,
            fee: 0,
            rpc_timeout_secs: 10,
        }
    }
}

impl LoadConfig {
    pub fn with_tps(mut self, tps: u32) -> Self {
        self.tps_per_worker = tps;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_mode(mut self, mode: SendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_release_interval_secs(mut self, secs: u64) -> Self {
        self.release_interval_secs = secs;
        self
    }

    pub fn with_cool_down_secs(mut self, secs: u64) -> Self {
        self.cool_down_secs = secs;
        self
    }

    pub fn with_unknown_retry_limit(mut self, limit: u32) -> Self {
        self.unknown_retry_limit = limit;
        self
    }

    pub fn with_handoff_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity;
        self
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn release_interval(&self) -> Duration {
        Duration::from_secs(self.release_interval_secs)
    }

    pub fn cool_down(&self) -> Duration {
        Duration::from_secs(self.cool_down_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Overall target: the ceiling applies per worker
    pub fn target_tps(&self) -> u64 {
        u64::from(self.tps_per_worker) * self.workers as u64
    }

    /// Reject settings the run cannot work with
    pub fn validate(&self) -> Result<(), LoadError> {
        let checks = [
            (self.tps_per_worker == 0, "tps must be at least 1"),
            (self.workers == 0, "at least one worker is required"),
            (self.rate_window_ms == 0, "rate window must be positive"),
            (self.poll_interval_secs == 0, "poll interval must be positive"),
            (self.release_interval_secs == 0, "release interval must be positive"),
            (self.handoff_capacity == 0, "handoff capacity must be positive"),
            (self.poll_concurrency == 0, "poll concurrency must be positive"),
            (self.report_interval_secs == 0, "report interval must be positive"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, reason)) => Err(LoadError::InvalidConfig(reason.to_string())),
            None => Ok(()),
        }
    }
}
