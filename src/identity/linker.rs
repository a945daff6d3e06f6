//! Identity-linking pipeline
//!
//! One pipeline per OAuth callback. Stages run strictly in sequence and any
//! failure short-circuits to a single terminal handler. Nothing is retried
//! and writes already issued are not rolled back.

use super::{handoff_page, handoff_token, parse_balance, AccessToken, IdentityProvider, Ledger};
use crate::context::ServerContext;
use crate::error::ServerError;
use crate::store::{UpsertMode, WalletRecord, WalletStore};

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Pipeline stage, recorded for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    ExchangingToken,
    FetchingProfile,
    ReconcilingBalance,
    Persisting,
    Responding,
    Failed,
    Done,
}

/// HTTP answer for the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResponse {
    pub status: u16,
    pub body: String,
    /// Terminal stage (`Done` or `Failed`)
    pub stage: LinkStage,
}

impl LinkResponse {
    fn failed() -> Self {
        Self {
            status: 502,
            body: "<html><body>Account linking failed. Please try again.</body></html>".to_string(),
            stage: LinkStage::Failed,
        }
    }
}

/// How a fresh ledger balance is written against the cached row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub mode: UpsertMode,
    /// Cached balance that disagreed with the ledger
    pub mismatch: Option<i64>,
}

impl Reconciliation {
    /// Fresh balance always wins; a disagreement is only reported.
    pub fn decide(existing: Option<&WalletRecord>, fresh: i64) -> Self {
        match existing {
            None => Self {
                mode: UpsertMode::Insert,
                mismatch: None,
            },
            Some(row) => Self {
                mode: UpsertMode::UpdateIgnore,
                mismatch: (row.balance != fresh).then_some(row.balance),
            },
        }
    }
}

pub struct IdentityLinker {
    ctx: Arc<ServerContext>,
    provider: Arc<dyn IdentityProvider>,
    ledger: Arc<dyn Ledger>,
    /// Serializes pipelines for the same username across stages 3-4
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IdentityLinker {
    pub fn new(
        ctx: Arc<ServerContext>,
        provider: Arc<dyn IdentityProvider>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            ctx,
            provider,
            ledger,
            user_locks: DashMap::new(),
        }
    }

    /// Run one pipeline to completion. Always produces a response.
    pub async fn link(&self, code: &str) -> LinkResponse {
        let link_id = Uuid::new_v4();
        let span = tracing::info_span!("identity_link", %link_id);

        async {
            let mut stage = LinkStage::ExchangingToken;
            match self.run(code, &mut stage).await {
                Ok(response) => {
                    self.ctx.metrics.record_link("linked");
                    response
                }
                Err(e) => {
                    error!(?stage, error = %e, detail = ?e, "Identity link failed");
                    self.ctx.metrics.record_link("failed");
                    self.ctx.metrics.record_error(e.error_type_label());
                    LinkResponse::failed()
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run(&self, code: &str, stage: &mut LinkStage) -> Result<LinkResponse, ServerError> {
        *stage = LinkStage::ExchangingToken;
        let token = self.provider.exchange_code(code).await?;

        *stage = LinkStage::FetchingProfile;
        let identity = self.provider.fetch_profile(&token).await?;
        let username = identity.account.clone();

        *stage = LinkStage::ReconcilingBalance;
        let store = self.store()?;
        let entry = self.user_lock(&username);
        let guard = entry.lock.lock().await;
        let (fresh, mode) = self.reconcile(store.as_ref(), &username, token, stage).await?;
        drop(guard);
        drop(entry);

        *stage = LinkStage::Responding;
        info!(%username, balance = fresh, mode = mode.as_sql(), "Identity linked");
        let token = handoff_token(&identity.id);

        *stage = LinkStage::Done;
        Ok(LinkResponse {
            status: 200,
            body: handoff_page(&identity.id, &token),
            stage: LinkStage::Done,
        })
    }

    /// Stages 3-4: ledger and local lookup, then the overwrite.
    async fn reconcile(
        &self,
        store: &dyn WalletStore,
        username: &str,
        token: AccessToken,
        stage: &mut LinkStage,
    ) -> Result<(i64, UpsertMode), ServerError> {
        let (balance, existing) = tokio::join!(
            self.ledger.balance(username),
            store.select_wallet(username)
        );
        let fresh = parse_balance(balance?.as_ref());
        let existing = existing?;

        let plan = Reconciliation::decide(existing.as_ref(), fresh);
        if let Some(cached) = plan.mismatch {
            warn!(username, cached, ledger = fresh, "balance not matching to wallet");
            self.ctx.metrics.record_balance_mismatch();
        }

        *stage = LinkStage::Persisting;
        let record = WalletRecord {
            username: username.to_string(),
            access_token: token.0,
            access_time: Utc::now(),
            balance: fresh,
        };
        store.upsert_wallet(plan.mode, &record).await?;

        Ok((fresh, plan.mode))
    }

    fn store(&self) -> Result<&Arc<dyn WalletStore>, ServerError> {
        self.ctx
            .store
            .as_ref()
            .ok_or_else(|| ServerError::Config("no persistence backend configured".to_string()))
    }

    fn user_lock(&self, username: &str) -> UserLock<'_> {
        let lock = Arc::clone(
            self.user_locks
                .entry(username.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        UserLock {
            locks: &self.user_locks,
            username: username.to_string(),
            lock,
        }
    }

    /// Usernames with a pipeline currently holding or awaiting a lock
    pub fn locked_users(&self) -> usize {
        self.user_locks.len()
    }
}

/// A pipeline's claim on a username's lock entry.
///
/// Dropping it removes the entry once no other pipeline holds or awaits the
/// same lock, including when the pipeline future is cancelled mid-stage.
struct UserLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    username: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        // The map's reference plus ours
        self.locks
            .remove_if(&self.username, |_, lock| Arc::strong_count(lock) == 2);
    }
}
