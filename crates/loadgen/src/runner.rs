//! Load runner: wires workers, monitor and reporter together

use crate::amount::AmountStrategy;
use crate::bootstrap::bootstrap;
use crate::config::LoadConfig;
use crate::entry::LedgerEntry;
use crate::error::LoadError;
use crate::generator::TxGenerator;
use crate::monitor::ConfirmationMonitor;
use crate::pool::EntryPool;
use crate::rate::RateLimiter;
use crate::stats::{report_loop, Stats, StatsSnapshot};
use crate::worker::{Worker, WorkerExit};
use ledger_client::{DirectoryError, ShardDirectory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Configured load run, ready to bootstrap and start
pub struct LoadRunner {
    config: LoadConfig,
    directory: Arc<ShardDirectory>,
    strategy: Arc<dyn AmountStrategy>,
    stats: Arc<Stats>,
}

impl LoadRunner {
    pub fn new(config: LoadConfig, directory: Arc<ShardDirectory>) -> Result<Self, LoadError> {
        config.validate()?;
        if directory.is_empty() {
            return Err(DirectoryError::Empty.into());
        }
        let strategy = config.mode.default_strategy();
        Ok(Self {
            config,
            directory,
            strategy,
            stats: Arc::new(Stats::new()),
        })
    }

    /// Replace the mode's default amount policy
    pub fn with_amount_strategy(mut self, strategy: Arc<dyn AmountStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Build the initial entry set from a key list
    pub async fn bootstrap(&self, keys: &[String]) -> Result<Vec<LedgerEntry>, LoadError> {
        bootstrap(keys, self.directory.clone(), self.config.workers).await
    }

    /// Partition `entries` across the workers and spawn every task.
    ///
    /// Cancelling `token` stops the run; a fatal worker error stops it too.
    pub fn start(&self, entries: Vec<LedgerEntry>, token: CancellationToken) -> RunHandle {
        let config = &self.config;
        let run_token = token.child_token();
        let started = Instant::now();

        let pools: Vec<Arc<EntryPool>> = partition(entries, config.workers)
            .into_iter()
            .map(|part| Arc::new(EntryPool::new(part)))
            .collect();

        tracing::info!(
            "Starting {} workers in mode {}, target {} tx/s ({} per worker)",
            config.workers,
            config.mode,
            config.target_tps(),
            config.tps_per_worker
        );

        let generator = TxGenerator::new(
            self.directory.clone(),
            self.strategy.clone(),
            config.fee,
            self.stats.clone(),
        );

        let (handoff, monitor) = if config.mode.tracks_confirmations() {
            let (tx, rx) = mpsc::channel(config.handoff_capacity);
            let monitor = ConfirmationMonitor::new(
                self.directory.clone(),
                pools.clone(),
                self.stats.clone(),
                config,
            );
            (Some(tx), Some(tokio::spawn(monitor.run(rx, run_token.clone()))))
        } else {
            (None, None)
        };

        let workers = pools
            .iter()
            .enumerate()
            .map(|(id, pool)| {
                let mut worker = Worker::new(
                    id,
                    config.mode,
                    pool.clone(),
                    generator.clone(),
                    RateLimiter::new(config.tps_per_worker, config.rate_window()),
                )
                .with_idle_backoff(config.idle_backoff());
                if let Some(tx) = &handoff {
                    worker = worker.with_handoff(tx.clone());
                }

                let token = run_token.clone();
                tokio::spawn(async move {
                    let exit = worker.run(token.clone()).await;
                    if exit.is_err() {
                        token.cancel();
                    }
                    exit
                })
            })
            .collect();
        // only the workers hold senders, so the monitor sees the intake close
        drop(handoff);

        let reporter = tokio::spawn(report_loop(
            self.stats.clone(),
            pools.clone(),
            config.report_interval(),
            run_token.clone(),
        ));

        RunHandle {
            pools,
            stats: self.stats.clone(),
            token: run_token,
            workers,
            monitor,
            reporter,
            started,
        }
    }
}

/// Split entries into `parts` contiguous ranges, the last taking the
/// remainder
pub fn partition(mut entries: Vec<LedgerEntry>, parts: usize) -> Vec<Vec<LedgerEntry>> {
    let parts = parts.max(1);
    let unit = entries.len() / parts;
    let mut out = Vec::with_capacity(parts);
    for _ in 0..parts - 1 {
        let rest = entries.split_off(unit);
        out.push(std::mem::replace(&mut entries, rest));
    }
    out.push(entries);
    out
}

/// A running load test
pub struct RunHandle {
    pools: Vec<Arc<EntryPool>>,
    stats: Arc<Stats>,
    token: CancellationToken,
    workers: Vec<JoinHandle<Result<WorkerExit, LoadError>>>,
    monitor: Option<JoinHandle<Vec<LedgerEntry>>>,
    reporter: JoinHandle<()>,
    started: Instant,
}

/// What a finished run leaves behind
#[derive(Debug)]
pub struct RunSummary {
    pub stats: StatsSnapshot,
    /// Entries still holding funds: pooled, in flight or cooling
    pub remaining: Vec<LedgerEntry>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn remaining_spendable(&self) -> u64 {
        self.remaining.iter().map(|e| e.spendable).sum()
    }
}

impl RunHandle {
    pub fn pools(&self) -> &[Arc<EntryPool>] {
        &self.pools
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Stop every task of this run
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for every task. Returns the first worker error, if any.
    pub async fn join(self) -> Result<RunSummary, LoadError> {
        let mut first_error = None;

        for (id, handle) in self.workers.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    self.token.cancel();
                    Err(LoadError::TaskFailed(format!("worker {}: {}", id, e)))
                }
            };
            if let Err(e) = result {
                first_error = first_error.or(Some(e));
            }
        }

        let mut remaining = Vec::new();
        if let Some(monitor) = self.monitor {
            match monitor.await {
                Ok(held) => remaining.extend(held),
                Err(e) => {
                    let err = LoadError::TaskFailed(format!("confirmation monitor: {}", e));
                    first_error = first_error.or(Some(err));
                }
            }
        }

        self.token.cancel();
        if let Err(e) = self.reporter.await {
            tracing::warn!("Reporter task failed: {}", e);
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        for pool in &self.pools {
            remaining.extend(pool.take_all());
        }
        let summary = RunSummary {
            stats: self.stats.snapshot(),
            remaining,
            elapsed: self.started.elapsed(),
        };
        tracing::info!(
            "Run finished after {:?}: {} submitted, {} failed, {} recycled, {} dropped, {} entries left",
            summary.elapsed,
            summary.stats.submitted,
            summary.stats.failed,
            summary.stats.recycled,
            summary.stats.dropped,
            summary.remaining.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::{LedgerKeypair, MemoryLedger};

    fn entries(count: usize) -> Vec<LedgerEntry> {
        (0..count as u64)
            .map(|i| LedgerEntry::new(LedgerKeypair::generate(&mut rand::thread_rng()), i, 0))
            .collect()
    }

    #[test]
    fn test_partition_is_contiguous() {
        let parts = partition(entries(10), 3);
        let sizes: Vec<_> = parts.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 4]);
        let order: Vec<_> = parts.iter().flatten().map(|e| e.spendable).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());

        let parts = partition(entries(2), 4);
        assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), vec![0, 0, 0, 2]);
    }

    #[test]
    fn test_runner_rejects_bad_setup() {
        let directory = Arc::new(ShardDirectory::new());
        let err = LoadRunner::new(LoadConfig::default(), directory).err().unwrap();
        assert!(matches!(err, LoadError::Directory(DirectoryError::Empty)));

        let directory =
            Arc::new(ShardDirectory::new().with_client(1, Arc::new(MemoryLedger::new(1))));
        let err = LoadRunner::new(LoadConfig::default().with_tps(0), directory)
            .err()
            .unwrap();
        assert!(matches!(err, LoadError::InvalidConfig(_)));
    }
}
