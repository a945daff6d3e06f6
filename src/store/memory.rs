//! In-process wallet store
//!
//! Knows a single table, [`WALLET_TABLE`]. Rows live only as long as the
//! process, so the binary never uses it as its backend.

use super::{UpsertMode, WalletRecord, WalletStore, WALLET_TABLE};
use crate::error::PersistenceError;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// Wallet store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    wallets: DashMap<String, WalletRecord>,
    alterations: Mutex<Vec<(String, String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current row for `username`
    pub fn wallet(&self, username: &str) -> Option<WalletRecord> {
        self.wallets.get(username).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Schema alterations received so far, as (database, table, kind)
    pub fn alterations(&self) -> Vec<(String, String, String)> {
        self.alterations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn select_wallet(&self, username: &str) -> Result<Option<WalletRecord>, PersistenceError> {
        Ok(self.wallet(username))
    }

    async fn upsert_wallet(&self, mode: UpsertMode, record: &WalletRecord) -> Result<(), PersistenceError> {
        debug!(mode = mode.as_sql(), username = %record.username, "Wallet write");

        match mode {
            UpsertMode::Insert => {
                if self.wallets.contains_key(&record.username) {
                    return Err(PersistenceError::Duplicate {
                        table: WALLET_TABLE.to_string(),
                        key: record.username.clone(),
                    });
                }
                self.wallets.insert(record.username.clone(), record.clone());
            }
            UpsertMode::UpdateIgnore => {
                if let Some(mut row) = self.wallets.get_mut(&record.username) {
                    *row = record.clone();
                }
            }
        }

        Ok(())
    }

    async fn alter(&self, database: &str, table: &str, kind: &str) -> Result<(), PersistenceError> {
        if table != WALLET_TABLE {
            return Err(PersistenceError::UnknownTable(format!("{database}.{table}")));
        }

        info!(database, table, kind, "Schema alteration recorded");
        self.alterations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((database.to_string(), table.to_string(), kind.to_string()));
        Ok(())
    }
}
