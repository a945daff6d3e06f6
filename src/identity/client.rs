//! HTTP clients for the identity provider and the external ledger

use super::{AccessToken, ExternalIdentity, IdentityProvider, Ledger};
use crate::config::{LedgerConfig, OAuthConfig};
use crate::error::{ExternalStage, ServerError};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
}

/// OAuth client for the external identity provider
pub struct OAuthClient {
    client: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ServerError> {
        let stage = ExternalStage::TokenExchange;
        let url = self.config.token_url();

        let body = serde_json::json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
            "grant_type": self.config.grant_type,
        });

        debug!(url, "Exchanging authorization code");

        let response: TokenResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ServerError::external(stage, e))?
            .json()
            .await
            .map_err(|e| ServerError::external(stage, e))?;

        Ok(AccessToken(response.access_token.token))
    }

    async fn fetch_profile(&self, token: &AccessToken) -> Result<ExternalIdentity, ServerError> {
        let stage = ExternalStage::ProfileFetch;

        self.client
            .get(self.config.me_url())
            .bearer_auth(&token.0)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ServerError::external(stage, e))?
            .json()
            .await
            .map_err(|e| ServerError::external(stage, e))
    }
}

/// Client for the external token ledger
pub struct LedgerClient {
    client: reqwest::Client,
    config: LedgerConfig,
}

impl LedgerClient {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    async fn balance(&self, account: &str) -> Result<Option<Value>, ServerError> {
        let stage = ExternalStage::LedgerBalance;

        let json: Value = self
            .client
            .get(self.config.balance_url(account))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ServerError::external(stage, e))?
            .json()
            .await
            .map_err(|e| ServerError::external(stage, e))?;

        Ok(json.get("balance").cloned())
    }
}
