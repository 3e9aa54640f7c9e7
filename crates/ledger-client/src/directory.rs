//! Shard client directory: which connection serves which shard

use crate::client::{LedgerClient, LedgerError};
use crate::types::{Address, ShardId};
use std::collections::HashMap;
use std::sync::Arc;

/// Directory errors. All of them are configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("no client registered for shard {0}")]
    UnknownShard(ShardId),
    #[error("no shard clients registered")]
    Empty,
    #[error("failed to query node info from {endpoint}: {source}")]
    NodeInfo {
        endpoint: String,
        #[source]
        source: LedgerError,
    },
}

/// Immutable shard -> client lookup, built once at startup
#[derive(Clone, Default)]
pub struct ShardDirectory {
    clients: HashMap<ShardId, Arc<dyn LedgerClient>>,
}

impl ShardDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client for `shard`, returning the one it replaces
    pub fn register(
        &mut self,
        shard: ShardId,
        client: Arc<dyn LedgerClient>,
    ) -> Option<Arc<dyn LedgerClient>> {
        self.clients.insert(shard, client)
    }

    pub fn with_client(mut self, shard: ShardId, client: Arc<dyn LedgerClient>) -> Self {
        self.register(shard, client);
        self
    }

    /// Ask every endpoint which shard it serves and register it there.
    ///
    /// The first endpoint found for a shard wins.
    pub async fn discover(
        clients: Vec<Arc<dyn LedgerClient>>,
    ) -> Result<Self, DirectoryError> {
        let mut directory = Self::new();

        for client in clients {
            let info = client
                .get_node_info()
                .await
                .map_err(|source| DirectoryError::NodeInfo {
                    endpoint: client.endpoint().to_string(),
                    source,
                })?;
            let shard = info.shard();

            if directory.contains(shard) {
                tracing::warn!(
                    "Shard {} already served, ignoring endpoint {}",
                    shard,
                    client.endpoint()
                );
                continue;
            }

            tracing::info!("Endpoint {} serves shard {}", client.endpoint(), shard);
            directory.register(shard, client);
        }

        if directory.is_empty() {
            return Err(DirectoryError::Empty);
        }

        Ok(directory)
    }

    /// Client responsible for the shard `address` lives on
    pub fn client_for(&self, address: &Address) -> Result<&Arc<dyn LedgerClient>, DirectoryError> {
        self.client_for_shard(address.shard())
    }

    pub fn client_for_shard(
        &self,
        shard: ShardId,
    ) -> Result<&Arc<dyn LedgerClient>, DirectoryError> {
        self.clients
            .get(&shard)
            .ok_or(DirectoryError::UnknownShard(shard))
    }

    pub fn contains(&self, shard: ShardId) -> bool {
        self.clients.contains_key(&shard)
    }

    /// Registered shards in ascending order
    pub fn shards(&self) -> Vec<ShardId> {
        let mut shards: Vec<ShardId> = self.clients.keys().copied().collect();
        shards.sort_unstable();
        shards
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ShardDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.shards()
                    .into_iter()
                    .filter_map(|s| self.clients.get(&s).map(|c| (s, c.endpoint().to_string()))),
            )
            .finish()
    }
}
