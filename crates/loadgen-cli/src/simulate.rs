//! Dry runs against in-memory ledger shards

use anyhow::Result;
use ledger_client::{LedgerKeypair, MemoryLedger, ShardDirectory, SHARD_COUNT};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One in-memory ledger per shard
pub struct Simulation {
    pub ledgers: Vec<Arc<MemoryLedger>>,
}

impl Simulation {
    pub fn new() -> Self {
        let ledgers = (1..=SHARD_COUNT)
            .map(|shard| Arc::new(MemoryLedger::new(shard)))
            .collect();
        Self { ledgers }
    }

    pub fn directory(&self) -> ShardDirectory {
        self.ledgers.iter().fold(ShardDirectory::new(), |dir, ledger| {
            dir.with_client(ledger.shard(), ledger.clone())
        })
    }

    /// Credit `balance` to every key. Blank lines are skipped.
    pub fn fund_keys(&self, keys: &[String], balance: u64) -> Result<usize> {
        let mut funded = 0;
        for key in keys.iter().filter(|k| !k.trim().is_empty()) {
            let keypair = LedgerKeypair::from_secret_str(key)?;
            if let Some(ledger) = self.ledgers.iter().find(|l| l.shard() == keypair.shard()) {
                ledger.fund(keypair.address(), balance);
                funded += 1;
            }
        }
        Ok(funded)
    }

    /// Seal a block on every shard each `block_time` until cancelled
    pub async fn seal_loop(self: Arc<Self>, block_time: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(block_time);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Simulated block sealer started ({}ms blocks)", block_time.as_millis());

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    for ledger in &self.ledgers {
                        let sealed = ledger.seal_block();
                        if sealed > 0 {
                            tracing::debug!(
                                "Shard {} sealed block {} with {} txs",
                                ledger.shard(),
                                ledger.height(),
                                sealed
                            );
                        }
                    }
                }
            }
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

/// Fresh keys, one per line, for simulated runs without a key file
pub fn generate_keys(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| LedgerKeypair::generate(&mut rng).secret_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_shard_is_served() {
        let simulation = Simulation::new();
        let directory = simulation.directory();
        assert_eq!(directory.shards(), (1..=SHARD_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn test_fund_keys() {
        let simulation = Simulation::new();
        let mut keys = generate_keys(5);
        keys.push(String::new());

        assert_eq!(simulation.fund_keys(&keys, 250).unwrap(), 5);
        let total: u64 = keys
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| {
                let address = LedgerKeypair::from_secret_str(k).unwrap().address();
                simulation.ledgers.iter().map(|l| l.balance(&address)).sum::<u64>()
            })
            .sum();
        assert_eq!(total, 1_250);

        assert!(simulation.fund_keys(&["garbage".to_string()], 1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seal_loop_stops_on_cancel() {
        let simulation = Arc::new(Simulation::new());
        let token = CancellationToken::new();
        let handle = tokio::spawn(simulation.clone().seal_loop(Duration::from_secs(1), token.clone()));

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        token.cancel();
        handle.await.unwrap();
        assert!(simulation.ledgers.iter().all(|l| l.height() >= 3));
    }
}
