// ===========================================================================
// auth/token - Access Tokens & Token Cache
// ===========================================================================

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Tokens this close to expiry are treated as already expired
const EXPIRY_LEEWAY_SECS: i64 = 30;

#[derive(Debug, Default, Clone, Deserialize)]
struct Claims {
    #[serde(default)]
    scope: String,

    #[serde(default)]
    exp: Option<i64>,

    #[serde(default)]
    sub: Option<String>,
}

/// A bearer token and the claims read from its (unverified) JWT payload.
///
/// The server verifies signatures; the client only looks at the claims to
/// fail early on expired tokens or missing scopes.
#[derive(Debug, Clone)]
pub struct AccessToken {
    raw: String,
    claims: Claims,
}

impl AccessToken {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let mut parts = raw.split('.');
        let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(Error::MalformedToken("expected three dot-separated parts".into())),
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;
        let claims: Claims = serde_json::from_slice(&decoded)
            .map_err(|e| Error::MalformedToken(format!("payload is not JSON: {e}")))?;

        Ok(Self { raw, claims })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.sub.as_deref()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.claims.scope.split_whitespace()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .exp
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(exp) => exp <= now + Duration::seconds(EXPIRY_LEEWAY_SECS),
            None => false,
        }
    }

    /// Required scopes this token does not cover.
    ///
    /// A `<resource>:write` scope also grants `<resource>:read`.
    pub fn missing_scopes(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.covers(scope))
            .map(|scope| scope.to_string())
            .collect()
    }

    fn covers(&self, required: &str) -> bool {
        let write_equivalent = required
            .strip_suffix(":read")
            .map(|resource| format!("{resource}:write"));

        self.scopes().any(|have| {
            have == required || write_equivalent.as_deref() == Some(have)
        })
    }
}

// ---------------------------------------------------------------------------
// Token Cache (~/.overmind/token.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,

    #[serde(default)]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Load the cache; a missing file is not an error
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write the cache readable by the owner only
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // The mode above only applies to new files
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(content.as_bytes())?;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + Duration::seconds(EXPIRY_LEEWAY_SECS),
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
