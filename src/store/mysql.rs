//! MySQL wallet store
//!
//! Uses [`sqlx`] with runtime query construction, so no live database is
//! needed at build time. Row values are always bound as parameters; only the
//! operator-issued `alter` splices names into SQL, after validating them.

use super::{UpsertMode, WalletRecord, WalletStore, WALLET_TABLE};
use crate::error::PersistenceError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use std::time::Duration;
use tracing::{debug, info};

/// Connection acquire timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_WALLET_TABLE: &str = r"CREATE TABLE IF NOT EXISTS player_wallet (
    username VARCHAR(64) NOT NULL PRIMARY KEY,
    access_token VARCHAR(512) NOT NULL,
    access_time DATETIME(3) NOT NULL,
    balance BIGINT NOT NULL DEFAULT 0
)";

const SELECT_WALLET: &str =
    "SELECT username, access_token, access_time, balance FROM player_wallet WHERE username = ?";

const INSERT_WALLET: &str =
    "INSERT INTO player_wallet (username, access_token, access_time, balance) VALUES (?, ?, ?, ?)";

const UPDATE_WALLET: &str =
    "UPDATE IGNORE player_wallet SET access_token = ?, access_time = ?, balance = ? WHERE username = ?";

const TABLE_EXISTS: &str =
    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?";

/// Wallet store backed by a MySQL connection pool
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect and make sure the wallet table exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let options: MySqlConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| PersistenceError::Backend(format!("invalid database URL: {e}")))?;

        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(backend)?;

        info!(max_connections, "Connected to MySQL");

        sqlx::query(CREATE_WALLET_TABLE)
            .execute(&pool)
            .await
            .map_err(backend)?;

        Ok(Self { pool })
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl WalletStore for MySqlStore {
    async fn select_wallet(&self, username: &str) -> Result<Option<WalletRecord>, PersistenceError> {
        let row = sqlx::query_as::<_, (String, String, DateTime<Utc>, i64)>(SELECT_WALLET)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        Ok(row.map(|(username, access_token, access_time, balance)| WalletRecord {
            username,
            access_token,
            access_time,
            balance,
        }))
    }

    async fn upsert_wallet(&self, mode: UpsertMode, record: &WalletRecord) -> Result<(), PersistenceError> {
        debug!(mode = mode.as_sql(), username = %record.username, "Wallet write");

        let result = match mode {
            UpsertMode::Insert => {
                sqlx::query(INSERT_WALLET)
                    .bind(&record.username)
                    .bind(&record.access_token)
                    .bind(record.access_time)
                    .bind(record.balance)
                    .execute(&self.pool)
                    .await
            }
            UpsertMode::UpdateIgnore => {
                sqlx::query(UPDATE_WALLET)
                    .bind(&record.access_token)
                    .bind(record.access_time)
                    .bind(record.balance)
                    .bind(&record.username)
                    .execute(&self.pool)
                    .await
            }
        };

        result.map(|_| ()).map_err(|e| {
            let duplicate = matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
            if duplicate {
                PersistenceError::Duplicate {
                    table: WALLET_TABLE.to_string(),
                    key: record.username.clone(),
                }
            } else {
                backend(e)
            }
        })
    }

    async fn alter(&self, database: &str, table: &str, kind: &str) -> Result<(), PersistenceError> {
        let statement = alter_statement(database, table, kind)?;

        let (found,): (i64,) = sqlx::query_as(TABLE_EXISTS)
            .bind(database)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        if found == 0 {
            return Err(PersistenceError::UnknownTable(format!("{database}.{table}")));
        }

        info!(database, table, kind, "Altering table");
        sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Backend(e.to_string())
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// `kind` is a single-token alter clause such as `ENGINE=InnoDB`
fn is_clause(kind: &str) -> bool {
    !kind.is_empty()
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '(' | ')' | ','))
}

fn alter_statement(database: &str, table: &str, kind: &str) -> Result<String, PersistenceError> {
    for name in [database, table] {
        if !is_identifier(name) {
            return Err(PersistenceError::InvalidName(name.to_string()));
        }
    }
    if !is_clause(kind) {
        return Err(PersistenceError::InvalidName(kind.to_string()));
    }

    Ok(format!("ALTER TABLE `{database}`.`{table}` {kind}"))
}
