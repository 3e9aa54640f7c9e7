//! Bootstrap: turn a key list into funded ledger entries

use crate::entry::LedgerEntry;
use crate::error::LoadError;
use ledger_client::{LedgerKeypair, ShardDirectory};
use std::path::Path;
use std::sync::Arc;

/// Read a newline separated key file. Line endings may be `\n` or `\r\n`.
pub fn load_key_lines(path: &Path) -> Result<Vec<String>, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents.lines().map(str::to_string).collect())
}

/// Query balance and nonce for every usable key.
///
/// Keys are split into `slices` contiguous ranges, one task each, and
/// every task is awaited before anything is returned. The output keeps
/// the key order. Blank lines, keys on shards without a client and
/// unfunded accounts are skipped; a malformed key or a failed query is
/// fatal.
pub async fn bootstrap(
    keys: &[String],
    directory: Arc<ShardDirectory>,
    slices: usize,
) -> Result<Vec<LedgerEntry>, LoadError> {
    let slices = slices.max(1);
    let unit = keys.len() / slices;

    let mut handles = Vec::with_capacity(slices);
    for i in 0..slices {
        let start = i * unit;
        let end = if i == slices - 1 { keys.len() } else { start + unit };
        let chunk: Vec<(usize, String)> = keys[start..end]
            .iter()
            .enumerate()
            .map(|(offset, key)| (start + offset + 1, key.clone()))
            .collect();
        handles.push(tokio::spawn(load_slice(chunk, directory.clone())));
    }

    // join barrier: wait for every slice before looking at any result
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .await
                .map_err(|e| LoadError::TaskFailed(format!("bootstrap task: {}", e))),
        );
    }

    let mut entries = Vec::new();
    for result in results {
        entries.extend(result??);
    }

    if entries.is_empty() {
        return Err(LoadError::NoAccounts);
    }

    let total: u64 = entries.iter().map(|e| e.spendable).sum();
    tracing::info!(
        "Bootstrapped {} accounts out of {} keys, {} spendable",
        entries.len(),
        keys.len(),
        total
    );
    Ok(entries)
}

async fn load_slice(
    keys: Vec<(usize, String)>,
    directory: Arc<ShardDirectory>,
) -> Result<Vec<LedgerEntry>, LoadError> {
    let mut entries = Vec::new();

    for (line, key) in keys {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let keypair = LedgerKeypair::from_secret_str(key)
            .map_err(|source| LoadError::InvalidKey { line, source })?;
        let address = keypair.address();

        let Ok(client) = directory.client_for(&address) else {
            tracing::debug!("Skipping {} on shard {}: no client", address, keypair.shard());
            continue;
        };

        let balance = client
            .get_account_balance(&address)
            .await
            .map_err(|source| LoadError::Bootstrap { address, source })?;
        tracing::debug!("{} balance is {}", address, balance);
        if balance == 0 {
            continue;
        }

        let nonce = client
            .get_account_nonce(&address)
            .await
            .map_err(|source| LoadError::Bootstrap { address, source })?;

        entries.push(LedgerEntry::new(keypair, balance, nonce));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::MemoryLedger;
    use std::io::Write;

    fn key_on(ledger: &MemoryLedger, balance: u64) -> (LedgerKeypair, String) {
        let keypair =
            LedgerKeypair::generate_on_shard(ledger.shard(), &mut rand::thread_rng()).unwrap();
        if balance > 0 {
            ledger.fund(keypair.address(), balance);
        }
        let secret = keypair.secret_string();
        (keypair, secret)
    }

    #[tokio::test]
    async fn test_bootstrap_keeps_order_and_skips() {
        let shard1 = Arc::new(MemoryLedger::new(1));
        let shard2 = Arc::new(MemoryLedger::new(2));
        let orphan = MemoryLedger::new(3);
        let directory = Arc::new(
            ShardDirectory::new()
                .with_client(1, shard1.clone())
                .with_client(2, shard2.clone()),
        );

        let (a, key_a) = key_on(&shard1, 50);
        let (_, key_unfunded) = key_on(&shard2, 0);
        let (_, key_orphan) = key_on(&orphan, 10);
        let (b, key_b) = key_on(&shard2, 70);
        let (c, key_c) = key_on(&shard1, 5);

        let keys = vec![
            key_a,
            String::new(),
            key_unfunded,
            key_orphan,
            "   ".to_string(),
            format!("  {}\t", key_b),
            key_c,
        ];

        for slices in [1, 2, 3, 10] {
            let entries = bootstrap(&keys, directory.clone(), slices).await.unwrap();
            let addresses: Vec<_> = entries.iter().map(|e| e.address()).collect();
            assert_eq!(addresses, vec![a.address(), b.address(), c.address()]);
            assert_eq!(
                entries.iter().map(|e| e.spendable).collect::<Vec<_>>(),
                vec![50, 70, 5]
            );
        }
    }

    #[tokio::test]
    async fn test_bootstrap_reads_nonce() {
        use ledger_client::{LedgerClient, Transfer};

        let ledger = Arc::new(MemoryLedger::new(4));
        let (keypair, key) = key_on(&ledger, 100);
        let signed = Transfer {
            from: keypair.address(),
            to: keypair.address(),
            amount: 1,
            fee: 0,
            nonce: 0,
        }
        .sign(&keypair);
        assert!(ledger.submit_transaction(&signed).await.unwrap());

        let directory = Arc::new(ShardDirectory::new().with_client(4, ledger));
        let entries = bootstrap(&[key], directory, 1).await.unwrap();
        assert_eq!(entries[0].nonce, 1);
        assert_eq!(entries[0].spendable, 100);
    }

    #[tokio::test]
    async fn test_malformed_key_is_fatal() {
        let ledger = Arc::new(MemoryLedger::new(1));
        let (_, key) = key_on(&ledger, 10);
        let directory = Arc::new(ShardDirectory::new().with_client(1, ledger));

        let keys = vec![key, "not-a-key".to_string()];
        let err = bootstrap(&keys, directory, 2).await.unwrap_err();
        assert!(matches!(err, LoadError::InvalidKey { line: 2, .. }));
        assert!(err.is_setup());
    }

    #[tokio::test]
    async fn test_no_usable_accounts() {
        let ledger = Arc::new(MemoryLedger::new(1));
        let (_, key) = key_on(&ledger, 0);
        let directory = Arc::new(ShardDirectory::new().with_client(1, ledger));

        let err = bootstrap(&[key, String::new()], directory, 1).await.unwrap_err();
        assert!(matches!(err, LoadError::NoAccounts));
    }

    #[test]
    fn test_load_key_lines_handles_crlf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "aaa\r\nbbb\r\n\r\nccc").unwrap();

        let lines = load_key_lines(file.path()).unwrap();
        assert_eq!(lines, vec!["aaa", "bbb", "", "ccc"]);
    }

    #[test]
    fn test_missing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_key_lines(&dir.path().join("keystore.txt")).unwrap_err();
        assert!(matches!(err, LoadError::KeyFile { .. }));
    }
}
