//! Shard pool implementation
//!
//! Owns the fixed, ordered set of shards created at startup.

use crate::error::ServerError;
use crate::shard::barrier::LifecycleBarrier;
use crate::shard::state::ShardState;
use crate::shard::{Shard, ShardFactory};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Fixed-length ordered pool of shards, indexed 1..=n
pub struct ShardPool {
    shards: Vec<Arc<dyn Shard>>,
    state: ShardState,
}

impl ShardPool {
    /// Create exactly `count` shards, sequentially indexed from 1.
    pub fn initialize(count: usize, factory: &dyn ShardFactory) -> Result<Self, ServerError> {
        let last = u32::try_from(count).map_err(|_| ServerError::ShardIndexOverflow { value: count })?;

        info!(shard_count = count, "Creating shard pool");

        let shards: Vec<Arc<dyn Shard>> = (1..=last).map(|index| factory.create(index)).collect();
        let state = ShardState::new(1..=last);

        Ok(Self { shards, state })
    }

    /// Shards in pool order
    pub fn shards(&self) -> &[Arc<dyn Shard>] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// The lowest-indexed shard
    pub fn first(&self) -> Option<&Arc<dyn Shard>> {
        self.shards.first()
    }

    /// Get shared state (for readiness checks)
    pub fn state(&self) -> ShardState {
        self.state.clone()
    }

    /// First shard, by ascending index, with spare capacity.
    ///
    /// First-fit, not least-loaded: the lowest index always wins.
    pub fn find_available(&self) -> Option<&Arc<dyn Shard>> {
        self.shards.iter().find(|shard| shard.has_capacity())
    }

    /// Occupant count of every shard, in pool order
    pub fn populations(&self) -> Vec<usize> {
        self.shards.iter().map(|shard| shard.player_count()).collect()
    }

    /// Issue boot for every shard in index order.
    ///
    /// Each completion is reported to `barrier` as it arrives; completion
    /// order is whatever the shards produce.
    pub fn boot_all(&self, barrier: Arc<LifecycleBarrier>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.shards.len());

        for shard in &self.shards {
            let index = shard.index();
            let shard = Arc::clone(shard);
            let state = self.state.clone();
            let barrier = Arc::clone(&barrier);

            state.mark_booting(index);
            debug!(shard_id = index, "Shard boot issued");

            handles.push(tokio::spawn(async move {
                shard.boot().await;
                state.mark_ready(index);
                debug!(
                    shard_id = index,
                    boot_ms = state.boot_duration(index).map(|d| d.as_millis() as u64),
                    "Shard booted"
                );
                barrier.complete();
            }));
        }

        handles
    }
}
