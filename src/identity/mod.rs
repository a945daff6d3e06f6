//! External identity linking
//!
//! Links a third-party account to a local wallet row: OAuth code exchange,
//! profile fetch, ledger balance fetch, reconciliation against the cached
//! balance, then a popup-to-parent handoff page.

mod client;
mod linker;

pub use client::{LedgerClient, OAuthClient};
pub use linker::{IdentityLinker, LinkResponse, LinkStage, Reconciliation};

use crate::error::ServerError;
use async_trait::async_trait;
use ring::digest::{digest, SHA256};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Name of the function the opener page exposes for the handoff
pub const HANDOFF_FUNCTION: &str = "gxcLoginHander";

/// Bearer token issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

/// Profile returned by the identity provider. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalIdentity {
    /// External account id, used as the local username
    pub account: String,
    #[serde(default)]
    pub email: String,
    /// External user id
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an authorization code for an access token
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ServerError>;

    /// Fetch the account profile with the token as bearer credential
    async fn fetch_profile(&self, token: &AccessToken) -> Result<ExternalIdentity, ServerError>;
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Raw `balance` field for `account`, if the ledger returned one
    async fn balance(&self, account: &str) -> Result<Option<Value>, ServerError>;
}

/// Interpret a ledger `balance` field as an integer.
///
/// Numbers are truncated, strings contribute their leading integer digits,
/// anything else (or nothing) counts as 0.
pub fn parse_balance(raw: Option<&Value>) -> i64 {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => leading_integer(s).unwrap_or(0),
        _ => 0,
    }
}

/// Integer formed by the leading digits of `s`, after an optional sign.
pub(crate) fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Deterministic opaque token for the popup handoff (hex SHA-256 of the id)
pub fn handoff_token(external_id: &str) -> String {
    digest(&SHA256, external_id.as_bytes())
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// HTML page that hands the identity to the opener window
pub fn handoff_page(external_id: &str, token: &str) -> String {
    format!(
        "<html><script>window.opener.{HANDOFF_FUNCTION}({},{});</script></html>",
        script_string(external_id),
        script_string(token)
    )
}

/// Quote a value as a JS string literal that cannot close the script tag.
fn script_string(value: &str) -> String {
    Value::String(value.to_owned()).to_string().replace("</", "<\\/")
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn balance_defaults_to_zero() {
        assert_eq!(parse_balance(None), 0);
        assert_eq!(parse_balance(Some(&Value::Null)), 0);
        assert_eq!(parse_balance(Some(&json!("abc"))), 0);
        assert_eq!(parse_balance(Some(&json!(true))), 0);
    }

    #[test]
    fn balance_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_balance(Some(&json!(250))), 250);
        assert_eq!(parse_balance(Some(&json!(12.9))), 12);
        assert_eq!(parse_balance(Some(&json!("300"))), 300);
        assert_eq!(parse_balance(Some(&json!(" -7"))), -7);
        assert_eq!(parse_balance(Some(&json!("42.5"))), 42);
    }

    #[test]
    fn handoff_token_is_deterministic_hex() {
        let a = handoff_token("user-1");
        assert_eq!(a, handoff_token("user-1"));
        assert_ne!(a, handoff_token("user-2"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn handoff_page_calls_opener() {
        let page = handoff_page("77", "abc");
        assert_eq!(
            page,
            "<html><script>window.opener.gxcLoginHander(\"77\",\"abc\");</script></html>"
        );
    }

    #[test]
    fn handoff_page_escapes_script_breakout() {
        let page = handoff_page("x');</script><script>alert(1)//", "t");
        assert_eq!(page.matches("</script>").count(), 1);
    }

    #[test]
    fn profile_accepts_numeric_id() {
        let identity: ExternalIdentity =
            serde_json::from_value(json!({"account": "alice", "email": "a@x.io", "id": 1234}))
                .unwrap();
        assert_eq!(identity.id, "1234");
        assert_eq!(identity.account, "alice");
    }
}
