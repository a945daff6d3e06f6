//! Shard state tracking
//!
//! Tracks boot status of individual shards for the readiness endpoint.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

/// Boot status for a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStatus {
    /// Shard has been created but boot has not been issued
    Created,
    /// Boot issued, waiting for completion
    Booting,
    /// Boot completed
    Ready,
}

impl ShardStatus {
    /// Returns true if the shard finished booting
    pub fn is_ready(&self) -> bool {
        matches!(self, ShardStatus::Ready)
    }
}

/// State for a single shard
#[derive(Debug)]
pub struct ShardStateEntry {
    pub status: ShardStatus,
    pub boot_started_at: Option<Instant>,
    pub booted_at: Option<Instant>,
}

impl Default for ShardStateEntry {
    fn default() -> Self {
        Self {
            status: ShardStatus::Created,
            boot_started_at: None,
            booted_at: None,
        }
    }
}

/// Shared boot state across all shards in a pool
#[derive(Debug, Clone)]
pub struct ShardState {
    inner: Arc<DashMap<u32, ShardStateEntry>>,
}

impl ShardState {
    /// Create a new shard state tracker
    pub fn new(indices: impl Iterator<Item = u32>) -> Self {
        let shards = DashMap::new();
        for index in indices {
            shards.insert(index, ShardStateEntry::default());
        }

        Self {
            inner: Arc::new(shards),
        }
    }

    /// Record that boot was issued
    pub fn mark_booting(&self, index: u32) {
        if let Some(mut entry) = self.inner.get_mut(&index) {
            entry.status = ShardStatus::Booting;
            entry.boot_started_at = Some(Instant::now());
        }
    }

    /// Record that boot completed
    pub fn mark_ready(&self, index: u32) {
        if let Some(mut entry) = self.inner.get_mut(&index) {
            entry.status = ShardStatus::Ready;
            if entry.booted_at.is_none() {
                entry.booted_at = Some(Instant::now());
            }
        }
    }

    /// Get status for a specific shard
    pub fn status(&self, index: u32) -> Option<ShardStatus> {
        self.inner.get(&index).map(|e| e.status)
    }

    /// Boot duration, if the shard has finished booting
    pub fn boot_duration(&self, index: u32) -> Option<std::time::Duration> {
        let entry = self.inner.get(&index)?;
        Some(entry.booted_at?.duration_since(entry.boot_started_at?))
    }

    /// Get count of booted shards
    pub fn ready_shards(&self) -> usize {
        self.inner.iter().filter(|e| e.status.is_ready()).count()
    }

    /// Get total shard count in this pool
    pub fn shard_count(&self) -> usize {
        self.inner.len()
    }
}
