//! Server configuration module
//!
//! Handles loading configuration from environment variables (and an optional
//! `.env` file).

use crate::error::ServerError;
use std::env;
use std::str::FromStr;

/// Bind address that is rewritten to a loopback host for display.
const WILDCARD_HOST: &str = "0.0.0.0";

/// OAuth client settings for the external identity provider
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Base URL of the identity provider
    pub server_url: String,
    /// Path of the token endpoint, appended to `server_url`
    pub token_path: String,
    /// Path of the profile endpoint, appended to `server_url`
    pub me_path: String,
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
}

impl OAuthConfig {
    pub fn token_url(&self) -> String {
        format!("{}{}", self.server_url, self.token_path)
    }

    pub fn me_url(&self) -> String {
        format!("{}{}", self.server_url, self.me_path)
    }
}

/// External ledger settings
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub url: String,
    /// Balance path; `{account}` is replaced with the account id
    pub balance_path: String,
}

impl LedgerConfig {
    pub fn balance_url(&self, account: &str) -> String {
        format!("{}{}", self.url, self.balance_path.replace("{account}", account))
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Display name used in log lines
    pub name: String,

    /// Game socket bind host
    pub host: String,

    /// Game socket port
    pub port: u16,

    /// Health/metrics/OAuth HTTP port
    pub http_port: u16,

    /// Number of shards (worlds) to create
    pub worlds: usize,

    /// Maximum occupants per shard
    pub max_players: usize,

    /// Run without a persistence backend
    pub offline_mode: bool,

    /// MySQL URL of the wallet database; required unless offline
    pub database_url: Option<String>,

    pub database_max_connections: u32,

    pub oauth: OAuthConfig,

    pub ledger: LedgerConfig,

    /// Leading character that marks a console line as a command
    pub console_prefix: char,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// `json` (default) or `pretty`
    pub log_format: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ServerError> {
        dotenvy::dotenv().ok();

        let worlds: usize = parse_var("WORLDS", "1")?;
        if worlds == 0 {
            return Err(ServerError::Config("WORLDS must be at least 1".to_string()));
        }

        let console_prefix = env::var("CONSOLE_PREFIX")
            .unwrap_or_else(|_| "/".to_string())
            .chars()
            .next()
            .ok_or_else(|| ServerError::Config("CONSOLE_PREFIX must not be empty".to_string()))?;

        Ok(Self {
            name: env::var("SERVER_NAME").unwrap_or_else(|_| "Realm".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| WILDCARD_HOST.to_string()),
            port: parse_var("PORT", "8000")?,
            http_port: parse_var("HTTP_PORT", "9090")?,
            worlds,
            max_players: parse_var("MAX_PLAYERS", "200")?,
            offline_mode: parse_var("OFFLINE_MODE", "false")?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            oauth: OAuthConfig {
                server_url: env::var("OAUTH_SERVER_URL").unwrap_or_default(),
                token_path: env::var("OAUTH_TOKEN_PATH")
                    .unwrap_or_else(|_| "/oauth/token".to_string()),
                me_path: env::var("OAUTH_ME_PATH").unwrap_or_else(|_| "/oauth/me".to_string()),
                client_id: env::var("OAUTH_CLIENT_ID").unwrap_or_default(),
                client_secret: env::var("OAUTH_CLIENT_SECRET").unwrap_or_default(),
                grant_type: env::var("OAUTH_GRANT_TYPE")
                    .unwrap_or_else(|_| "authorization_code".to_string()),
            },
            ledger: LedgerConfig {
                url: env::var("LEDGER_URL").unwrap_or_default(),
                balance_path: env::var("LEDGER_BALANCE_PATH")
                    .unwrap_or_else(|_| "/wallet/{account}/balance".to_string()),
            },
            console_prefix,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        })
    }

    /// Operator-facing URL announced once every shard has booted
    pub fn connect_url(&self) -> String {
        connect_url(&self.host, self.port)
    }

    /// Database to connect to, or `None` when running offline
    pub fn persistence_url(&self) -> Result<Option<&str>, ServerError> {
        persistence_url(self.offline_mode, self.database_url.as_deref())
    }
}

fn persistence_url(offline: bool, url: Option<&str>) -> Result<Option<&str>, ServerError> {
    match (offline, url) {
        (true, _) => Ok(None),
        (false, Some(url)) => Ok(Some(url)),
        (false, None) => Err(ServerError::Config(
            "DATABASE_URL is required unless OFFLINE_MODE is set".to_string(),
        )),
    }
}

/// Render `http://host:port`, showing a wildcard bind address as `localhost`.
pub fn connect_url(host: &str, port: u16) -> String {
    let host = if host == WILDCARD_HOST { "localhost" } else { host };
    format!("http://{host}:{port}")
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ServerError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| ServerError::Config(format!("{name} must be a valid value: {e}")))
}
