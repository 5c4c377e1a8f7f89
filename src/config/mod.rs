// ===========================================================================
// config - Configuration Loading & Merging
// ===========================================================================

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

pub const DEFAULT_URL: &str = "https://api.prod.overmind.tech";
pub const DEFAULT_FRONTEND: &str = "https://app.overmind.tech/";
pub const DEFAULT_AUTH_DOMAIN: &str = "om-prod.eu.auth0.com";
pub const DEFAULT_AUDIENCE: &str = "https://api.overmind.tech";
pub const DEFAULT_LOG_LEVEL: &str = "info";

const CONFIG_FILE: &str = "config.toml";
const TOKEN_FILE: &str = "token.json";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("home directory not found")]
    NoHome,
}

// ---------------------------------------------------------------------------
// Config File (~/.overmind/config.toml)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url: Option<String>,
    pub frontend: Option<String>,
    pub bookmark_url: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub domain: Option<String>,
    pub client_id: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: Option<String>,
}

// ---------------------------------------------------------------------------
// Overrides (command line & environment)
// ---------------------------------------------------------------------------

/// Values given on the command line or through the environment. `None`
/// means "not given" and falls through to the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub frontend: Option<String>,
    pub api_key: Option<String>,
    pub auth_domain: Option<String>,
    pub auth_client_id: Option<String>,
    pub auth_audience: Option<String>,
    pub log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Merged Config (runtime)
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub url: String,
    pub frontend: String,
    pub bookmark_url: Option<String>,
    pub api_key: Option<String>,
    pub auth_domain: String,
    pub auth_client_id: Option<String>,
    pub auth_audience: String,
    pub log_level: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_dir", &self.base_dir)
            .field("url", &self.url)
            .field("frontend", &self.frontend)
            .field("bookmark_url", &self.bookmark_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("auth_domain", &self.auth_domain)
            .field("auth_client_id", &self.auth_client_id)
            .field("auth_audience", &self.auth_audience)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load the config file and apply overrides on top
    pub fn load(overrides: Overrides) -> Result<Self> {
        let base_dir = Self::base_dir()?;
        let file = Self::load_file(&base_dir.join(CONFIG_FILE))?;
        Ok(Self::merge(base_dir, file, overrides))
    }

    pub fn base_dir() -> Result<PathBuf> {
        let base = BaseDirs::new().ok_or(Error::NoHome)?;
        Ok(base.home_dir().join(".overmind"))
    }

    pub fn token_cache_path(&self) -> PathBuf {
        self.base_dir.join(TOKEN_FILE)
    }

    fn load_file(path: &Path) -> Result<FileConfig> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Precedence: override > config file > built-in default
    fn merge(base_dir: PathBuf, file: FileConfig, overrides: Overrides) -> Self {
        let pick = |given: Option<String>, from_file: Option<String>, default: &str| {
            non_empty(given)
                .or_else(|| non_empty(from_file))
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            base_dir,
            url: pick(overrides.url, file.api.url, DEFAULT_URL),
            frontend: pick(overrides.frontend, file.api.frontend, DEFAULT_FRONTEND),
            bookmark_url: non_empty(file.api.bookmark_url),
            api_key: non_empty(overrides.api_key),
            auth_domain: pick(overrides.auth_domain, file.auth.domain, DEFAULT_AUTH_DOMAIN),
            auth_client_id: non_empty(overrides.auth_client_id)
                .or_else(|| non_empty(file.auth.client_id)),
            auth_audience: pick(overrides.auth_audience, file.auth.audience, DEFAULT_AUDIENCE),
            log_level: pick(overrides.log_level, file.log.level, DEFAULT_LOG_LEVEL),
        }
    }

    /// Frontend page of a change
    pub fn change_url(&self, change: &uuid::Uuid) -> String {
        format!("{}/changes/{}", self.frontend.trim_end_matches('/'), change)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
