// ===========================================================================
// auth/oauth - Device Authorization Flow & Token Refresh
// ===========================================================================

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use super::token::CachedToken;
use super::{AuthSettings, Error, Result};
use crate::context::Context;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Upper bound for a single request to the authorization server
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,

    #[serde(default)]
    pub verification_uri_complete: Option<String>,

    pub expires_in: u64,

    #[serde(default = "default_interval")]
    pub interval: u64,
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub fn into_cached(self, previous_refresh: Option<String>) -> CachedToken {
        CachedToken {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self.refresh_token.or(previous_refresh),
            // Out-of-range lifetimes are stored without an expiry
            expiry: self
                .expires_in
                .and_then(chrono::Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OAuthError {
    error: String,

    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthError {
    fn into_error(self) -> Error {
        match self.error_description {
            Some(desc) if !desc.is_empty() => Error::OAuth(format!("{}: {}", self.error, desc)),
            _ => Error::OAuth(self.error),
        }
    }
}

enum FormReply<T> {
    Ok(T),
    Rejected(OAuthError),
}

/// Scopes requested from the authorization server. `offline_access` asks
/// for a refresh token.
pub fn requested_scopes(required: &[&str]) -> String {
    let mut scopes: Vec<&str> = required.to_vec();
    if !scopes.contains(&"offline_access") {
        scopes.push("offline_access");
    }
    scopes.join(" ")
}

/// Run the device authorization grant: print a URL for the user to visit and
/// poll until the login is approved, denied or expires.
pub fn device_authorization(
    ctx: &Context,
    settings: &AuthSettings,
    required_scopes: &[&str],
) -> Result<TokenResponse> {
    let client_id = settings.client_id.as_deref().ok_or(Error::NoClientId)?;
    let scope = requested_scopes(required_scopes);

    let code: DeviceCode = match post_form(
        ctx,
        &settings.device_code_url(),
        vec![
            ("client_id", client_id.to_string()),
            ("scope", scope),
            ("audience", settings.audience.clone()),
        ],
    )? {
        FormReply::Ok(code) => code,
        FormReply::Rejected(err) => return Err(err.into_error()),
    };

    let url = code
        .verification_uri_complete
        .as_deref()
        .unwrap_or(&code.verification_uri);
    info!(
        url = %url,
        code = %code.user_code,
        "open this URL in your browser to log in, then confirm the code"
    );

    let (expires, mut interval) = poll_schedule(&code, Instant::now());

    loop {
        ctx.sleep(interval)?;
        if expires.is_some_and(|at| Instant::now() >= at) {
            return Err(Error::DeviceCodeExpired);
        }

        let reply = post_form::<TokenResponse>(
            ctx,
            &settings.token_url(),
            vec![
                ("grant_type", DEVICE_CODE_GRANT.to_string()),
                ("device_code", code.device_code.clone()),
                ("client_id", client_id.to_string()),
            ],
        )?;

        match reply {
            FormReply::Ok(token) => {
                info!("authenticated successfully");
                return Ok(token);
            }
            FormReply::Rejected(err) => match err.error.as_str() {
                "authorization_pending" => debug!("waiting for the login to be confirmed"),
                "slow_down" => {
                    interval = slowed_down(interval);
                    debug!(interval_secs = interval.as_secs(), "polling more slowly");
                }
                "expired_token" => return Err(Error::DeviceCodeExpired),
                "access_denied" => return Err(Error::AccessDenied),
                _ => return Err(err.into_error()),
            },
        }
    }
}

/// When the device code expires (`None` if beyond representable time) and
/// the first polling interval, clamped to `1s..=MAX_POLL_INTERVAL`.
fn poll_schedule(code: &DeviceCode, now: Instant) -> (Option<Instant>, Duration) {
    let expires = now.checked_add(Duration::from_secs(code.expires_in));
    let interval = Duration::from_secs(code.interval.clamp(1, MAX_POLL_INTERVAL.as_secs()));
    (expires, interval)
}

fn slowed_down(interval: Duration) -> Duration {
    (interval + SLOW_DOWN_STEP).min(MAX_POLL_INTERVAL)
}

/// Exchange a refresh token for a new access token
pub fn refresh(ctx: &Context, settings: &AuthSettings, refresh_token: &str) -> Result<TokenResponse> {
    let client_id = settings.client_id.as_deref().ok_or(Error::NoClientId)?;

    match post_form(
        ctx,
        &settings.token_url(),
        vec![
            ("grant_type", "refresh_token".to_string()),
            ("client_id", client_id.to_string()),
            ("refresh_token", refresh_token.to_string()),
        ],
    )? {
        FormReply::Ok(token) => Ok(token),
        FormReply::Rejected(err) => Err(err.into_error()),
    }
}

fn post_form<T>(
    ctx: &Context,
    url: &str,
    form: Vec<(&'static str, String)>,
) -> Result<FormReply<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let timeout = ctx
        .remaining()
        .map_or(REQUEST_TIMEOUT, |left| left.min(REQUEST_TIMEOUT));
    let agent = ureq::Agent::new_with_config(
        ureq::config::Config::builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build(),
    );
    let url = url.to_string();

    let outcome = ctx.run_blocking(move || -> std::result::Result<(u16, String), String> {
        let mut response = agent
            .post(&url)
            .header("Accept", "application/json")
            .send_form(form)
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| e.to_string())?;
        Ok((status, body))
    })?;

    let (status, body) = outcome
        .ok_or_else(|| Error::Http("request worker exited without a response".into()))?
        .map_err(Error::Http)?;

    if (200..300).contains(&status) {
        return Ok(FormReply::Ok(serde_json::from_str(&body).map_err(|e| {
            Error::OAuth(format!("unexpected response from authorization server: {e}"))
        })?));
    }

    match serde_json::from_str::<OAuthError>(&body) {
        Ok(err) => Ok(FormReply::Rejected(err)),
        Err(_) => Err(Error::Http(format!(
            "authorization server returned HTTP status {status}"
        ))),
    }
}
