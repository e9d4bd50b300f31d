//! Bearer credentials: where the token lives and how it is obtained.

use std::time::Duration;

use keyring::Entry;
use tracing::{debug, info, warn};

use crate::api::{read_json, unwrap_envelope, ApiError, Envelope, LoginData, LoginRequest};
use crate::utils::url::api_url;

pub mod keyring_access;
pub mod ui;

pub use self::keyring_access::KeyringAccessError;

const KEYRING_SERVICE: &str = "kbchat";
const KEYRING_ENTRY: &str = "token";
pub const TOKEN_ENV: &str = "KBCHAT_TOKEN";

/// Keyring-backed token storage with an environment fallback.
pub struct TokenStore {
    use_keyring: bool,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self::new_with_keyring(true)
    }

    /// Construct a store, optionally disabling keyring access (useful for tests)
    pub fn new_with_keyring(use_keyring: bool) -> Self {
        Self { use_keyring }
    }

    fn entry() -> Result<Entry, KeyringAccessError> {
        Entry::new(KEYRING_SERVICE, KEYRING_ENTRY).map_err(KeyringAccessError::from)
    }

    pub fn get_token(&self) -> Result<Option<String>, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(None);
        }
        match Self::entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn store_token(&self, token: &str) -> Result<(), KeyringAccessError> {
        if !self.use_keyring {
            return Ok(());
        }
        Self::entry()?.set_password(token)?;
        Ok(())
    }

    /// Removes the stored token. Returns whether one was present.
    pub fn clear_token(&self) -> Result<bool, KeyringAccessError> {
        if !self.use_keyring {
            return Ok(false);
        }
        match Self::entry()?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// The token calls should use: the keyring first, then `KBCHAT_TOKEN`.
    pub fn resolve_token(&self) -> Option<String> {
        self.resolve_token_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_token_with<F>(&self, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stored = match self.get_token() {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, recoverable = err.is_recoverable(), "keyring lookup failed");
                None
            }
        };
        stored
            .or_else(|| env(TOKEN_ENV))
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

/// Exchanges credentials for a bearer token.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    identifier: &str,
    password: &str,
    timeout: Duration,
) -> Result<String, ApiError> {
    debug!(identifier, "logging in");
    let response = client
        .post(api_url(base_url, "login"))
        .timeout(timeout)
        .json(&LoginRequest {
            identifier,
            password,
        })
        .send()
        .await?;
    let envelope: Envelope<LoginData> = read_json(response, "login").await?;
    let token = unwrap_envelope(envelope)?
        .and_then(|data| data.token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::MissingField("token"))?;
    info!(identifier, "login succeeded");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::failure::describe_failure;
    use crate::utils::test_utils::{json_response, serve_once};

    #[test]
    fn disabled_keyring_falls_back_to_environment() {
        let store = TokenStore::new_with_keyring(false);
        assert_eq!(store.get_token().expect("no keyring"), None);
        assert!(!store.clear_token().expect("nothing to clear"));
        store.store_token("ignored").expect("no-op");

        let token = store.resolve_token_with(|key| (key == TOKEN_ENV).then(|| " env-token\n".into()));
        assert_eq!(token.as_deref(), Some("env-token"));
        assert_eq!(store.resolve_token_with(|_| Some("  ".into())), None);
        assert_eq!(store.resolve_token_with(|_| None), None);
    }

    #[tokio::test]
    async fn login_returns_token_from_envelope() {
        let (base_url, request_rx) = serve_once(vec![json_response(
            "200 OK",
            r#"{"code":200,"data":{"token":"tok-1"}}"#,
        )])
        .await;

        let token = login(
            &reqwest::Client::new(),
            &base_url,
            "ada",
            "secret",
            Duration::from_secs(5),
        )
        .await
        .expect("logged in");
        assert_eq!(token, "tok-1");

        let request = request_rx.await.expect("request");
        assert!(request.starts_with("POST /api/v1/login HTTP/1.1"));
        assert!(request.contains(r#""identifier":"ada""#));
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn rejected_login_surfaces_backend_message() {
        let (base_url, _request_rx) = serve_once(vec![json_response(
            "200 OK",
            r#"{"code":-1,"msg":"wrong password"}"#,
        )])
        .await;

        let err = login(
            &reqwest::Client::new(),
            &base_url,
            "ada",
            "nope",
            Duration::from_secs(5),
        )
        .await
        .expect_err("rejected");
        assert_eq!(describe_failure(&err, "Login failed"), "wrong password");
    }

    #[tokio::test]
    async fn login_without_token_is_a_failure() {
        let (base_url, _request_rx) =
            serve_once(vec![json_response("200 OK", r#"{"code":200,"data":{}}"#)]).await;

        let err = login(
            &reqwest::Client::new(),
            &base_url,
            "ada",
            "secret",
            Duration::from_secs(5),
        )
        .await
        .expect_err("no token");
        assert!(matches!(err, ApiError::MissingField("token")));
    }
}
