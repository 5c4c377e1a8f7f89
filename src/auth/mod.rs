// ===========================================================================
// auth - Access Token Acquisition
// ===========================================================================

mod oauth;
mod token;

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};

use crate::context::{self, Context};
use crate::rpc::messages::ExchangeKeyForTokenRequest;
use crate::rpc::{self, ApiKeyClient, Transport};

pub use oauth::{device_authorization, refresh, requested_scopes, DeviceCode, TokenResponse};
pub use token::{AccessToken, CachedToken};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not exchange API key for a token: {0}")]
    ApiKey(#[source] rpc::Error),

    #[error("malformed access token: {0}")]
    MalformedToken(String),

    #[error("authenticated successfully, but you don't have the required permission: '{}'", .0.join(", "))]
    MissingScopes(Vec<String>),

    #[error("no OAuth client id configured; set --auth0-client-id or use --api-key")]
    NoClientId,

    #[error("authorization server rejected the request: {0}")]
    OAuth(String),

    #[error("the login code expired before it was confirmed")]
    DeviceCodeExpired,

    #[error("the login request was denied")]
    AccessDenied,

    #[error("http error: {0}")]
    Http(String),

    #[error(transparent)]
    Context(#[from] context::Error),

    #[error("token cache error: {0}")]
    Cache(#[from] std::io::Error),

    #[error("invalid token cache: {0}")]
    CacheFormat(#[from] serde_json::Error),
}

/// Everything needed to obtain a token
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// API root, used for API key exchange
    pub api_url: String,
    pub api_key: Option<String>,

    /// Authorization server host, or a full base URL
    pub domain: String,
    pub client_id: Option<String>,
    pub audience: String,

    /// Where interactive logins are remembered; `None` disables caching
    pub token_cache: Option<PathBuf>,
}

impl AuthSettings {
    fn authorization_base(&self) -> String {
        let domain = self.domain.trim_end_matches('/');
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }

    pub fn device_code_url(&self) -> String {
        format!("{}/oauth/device/code", self.authorization_base())
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.authorization_base())
    }

    #[cfg(test)]
    pub(crate) fn for_tests(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key: None,
            domain: "login.example.com".into(),
            client_id: Some("client".into()),
            audience: "https://api.example.com".into(),
            token_cache: None,
        }
    }
}

/// Obtain a token carrying `required_scopes`.
///
/// An API key, when configured, is exchanged for a token. Otherwise a cached
/// login is reused or refreshed, falling back to an interactive device login.
pub fn ensure_token(
    ctx: &Context,
    settings: &AuthSettings,
    required_scopes: &[&str],
) -> Result<AccessToken> {
    let token = match &settings.api_key {
        Some(key) => exchange_api_key(ctx, settings, key)?,
        None => oauth_token(ctx, settings, required_scopes)?,
    };

    let missing = token.missing_scopes(required_scopes);
    if !missing.is_empty() {
        return Err(Error::MissingScopes(missing));
    }

    debug!(subject = token.subject().unwrap_or("-"), "using access token");
    Ok(token)
}

fn exchange_api_key(ctx: &Context, settings: &AuthSettings, key: &str) -> Result<AccessToken> {
    let client = ApiKeyClient::new(Transport::new(rpc::api_base(&settings.api_url)));
    let response = client
        .exchange_key_for_token(
            ctx,
            &ExchangeKeyForTokenRequest {
                api_key: key.to_string(),
            },
        )
        .map_err(Error::ApiKey)?;

    AccessToken::parse(response.access_token)
}

fn oauth_token(ctx: &Context, settings: &AuthSettings, required_scopes: &[&str]) -> Result<AccessToken> {
    let cached = match &settings.token_cache {
        Some(path) => CachedToken::load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "ignoring unreadable token cache");
            None
        }),
        None => None,
    };

    if let Some(cached) = cached {
        if let Some(token) = usable(&cached, required_scopes) {
            debug!("using cached token");
            return Ok(token);
        }

        if let Some(refresh_token) = cached.refresh_token.clone() {
            match refresh(ctx, settings, &refresh_token) {
                Ok(response) => {
                    let fresh = response.into_cached(Some(refresh_token));
                    store(settings, &fresh);
                    if let Some(token) = usable(&fresh, required_scopes) {
                        debug!("refreshed cached token");
                        return Ok(token);
                    }
                }
                Err(Error::Context(e)) => return Err(e.into()),
                Err(e) => debug!(error = %e, "token refresh failed, logging in again"),
            }
        }
    }

    let response = device_authorization(ctx, settings, required_scopes)?;
    let fresh = response.into_cached(None);
    store(settings, &fresh);
    AccessToken::parse(fresh.access_token)
}

fn usable(cached: &CachedToken, required_scopes: &[&str]) -> Option<AccessToken> {
    let now = Utc::now();
    if cached.is_expired(now) {
        return None;
    }
    let token = AccessToken::parse(cached.access_token.clone()).ok()?;
    if token.is_expired(now) || !token.missing_scopes(required_scopes).is_empty() {
        return None;
    }
    Some(token)
}

fn store(settings: &AuthSettings, cached: &CachedToken) {
    if let Some(path) = &settings.token_cache {
        if let Err(e) = cached.save(path) {
            warn!(path = %path.display(), error = %e, "could not save token cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_authorization_urls() {
        let settings = AuthSettings::for_tests("http://unused");
        assert_eq!(
            settings.device_code_url(),
            "https://login.example.com/oauth/device/code"
        );
        assert_eq!(settings.token_url(), "https://login.example.com/oauth/token");

        let settings = AuthSettings {
            domain: "http://127.0.0.1:4000/".into(),
            ..settings
        };
        assert_eq!(settings.token_url(), "http://127.0.0.1:4000/oauth/token");
    }

    #[test]
    fn test_missing_scopes_message() {
        let err = Error::MissingScopes(vec!["changes:write".into()]);
        assert_eq!(
            err.to_string(),
            "authenticated successfully, but you don't have the required permission: 'changes:write'"
        );
    }

    #[test]
    fn test_cached_token_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        let raw = token::fake_jwt(&json!({
            "scope": "changes:write",
            "exp": Utc::now().timestamp() + 3600
        }));
        CachedToken {
            access_token: raw.clone(),
            token_type: "Bearer".into(),
            refresh_token: None,
            expiry: None,
        }
        .save(&path)
        .unwrap();

        // The authorization server is unreachable, so success proves the cache was used
        let settings = AuthSettings {
            domain: "http://127.0.0.1:9".into(),
            token_cache: Some(path),
            ..AuthSettings::for_tests("http://127.0.0.1:9")
        };
        let token = ensure_token(&Context::background(), &settings, &["changes:read"]).unwrap();
        assert_eq!(token.as_str(), raw);
    }

    #[test]
    fn test_usable_rejects_expired_and_underscoped() {
        let now = Utc::now().timestamp();
        let cached = |claims: serde_json::Value| CachedToken {
            access_token: token::fake_jwt(&claims),
            token_type: String::new(),
            refresh_token: None,
            expiry: None,
        };

        assert!(usable(&cached(json!({ "scope": "changes:read", "exp": now + 600 })), &["changes:read"]).is_some());
        assert!(usable(&cached(json!({ "scope": "changes:read", "exp": now - 600 })), &["changes:read"]).is_none());
        assert!(usable(&cached(json!({ "scope": "changes:read", "exp": now + 600 })), &["changes:write"]).is_none());
    }

    #[test]
    fn test_canceled_context_stops_login() {
        let ctx = Context::background();
        ctx.cancel();
        let settings = AuthSettings::for_tests("http://127.0.0.1:9");
        let result = ensure_token(&ctx, &settings, &["changes:read"]);
        assert!(matches!(result, Err(Error::Context(context::Error::Canceled))));
    }
}
