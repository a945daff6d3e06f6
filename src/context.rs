//! Shared server context
//!
//! Built once at startup and handed to the gate, the identity linker, the
//! console and the shutdown coordinator.

use crate::metrics::ServerMetrics;
use crate::shard::{LifecycleBarrier, ShardPool};
use crate::store::WalletStore;

use std::sync::Arc;

pub struct ServerContext {
    pub pool: Arc<ShardPool>,
    pub readiness: Arc<LifecycleBarrier>,
    /// `None` in offline mode
    pub store: Option<Arc<dyn WalletStore>>,
    pub metrics: ServerMetrics,
}

impl ServerContext {
    /// Bundle a pool with a fresh readiness barrier sized to it.
    pub fn new(
        pool: ShardPool,
        connect_url: impl Into<String>,
        store: Option<Arc<dyn WalletStore>>,
        metrics: ServerMetrics,
    ) -> Self {
        let readiness = Arc::new(LifecycleBarrier::new(pool.len(), connect_url));
        Self {
            pool: Arc::new(pool),
            readiness,
            store,
            metrics,
        }
    }

    /// Issue boot for every shard, reporting completions to the barrier.
    pub fn boot_shards(&self) -> Vec<tokio::task::JoinHandle<()>> {
        self.pool.boot_all(Arc::clone(&self.readiness))
    }
}
