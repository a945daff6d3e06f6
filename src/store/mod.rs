//! Persistence interface for player wallets
//!
//! The storage engine is external; the core consumes it through
//! [`WalletStore`]. Every call returns a typed result so a backend failure is
//! routed into the caller's error path instead of escaping as a panic.

mod memory;
mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Table holding one wallet row per username
pub const WALLET_TABLE: &str = "player_wallet";

/// Persisted wallet row keyed by username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub username: String,
    pub access_token: String,
    pub access_time: DateTime<Utc>,
    /// Cached copy of the external ledger balance
    pub balance: i64,
}

/// Write mode for [`WalletStore::upsert_wallet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// Create a new row; fails if the key exists
    Insert,
    /// Update the existing row, ignoring uniqueness conflicts
    UpdateIgnore,
}

impl UpsertMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT INTO",
            Self::UpdateIgnore => "UPDATE IGNORE",
        }
    }
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Look up the wallet row for `username`
    async fn select_wallet(&self, username: &str) -> Result<Option<WalletRecord>, PersistenceError>;

    async fn upsert_wallet(&self, mode: UpsertMode, record: &WalletRecord) -> Result<(), PersistenceError>;

    /// Forward a schema alteration request
    async fn alter(&self, database: &str, table: &str, kind: &str) -> Result<(), PersistenceError>;
}
