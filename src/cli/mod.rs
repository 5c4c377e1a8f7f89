// ===========================================================================
// cli - Command Line Interface
// ===========================================================================

mod commands;

use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::auth::{self, AccessToken, AuthSettings};
use crate::config::{Config, Overrides};
use crate::context::{self, Context};
use crate::util::parse_duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] crate::config::Error),

    #[error("invalid --{flag} value '{value}': {reason}")]
    InvalidFlag {
        flag: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to authenticate against {url}: {source}")]
    Auth {
        url: String,
        #[source]
        source: auth::Error,
    },

    #[error("failed to identify change: {0}")]
    Change(String),

    #[error("failed {action}: {source}")]
    Rpc {
        action: &'static str,
        #[source]
        source: crate::rpc::Error,
    },

    #[error("could not listen for signals: {0}")]
    Signals(#[source] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub(crate) fn invalid_flag(
        flag: &'static str,
        value: &str,
        reason: impl std::fmt::Display,
    ) -> Self {
        Error::InvalidFlag {
            flag,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn rpc(action: &'static str) -> impl FnOnce(crate::rpc::Error) -> Self {
        move |source| Error::Rpc { action, source }
    }
}

#[derive(Parser)]
#[command(
    name = "ovm-cli",
    version,
    about = "Command line client for Overmind changes and bookmarks",
    after_help = "Settings can also be stored in ~/.overmind/config.toml."
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// The Overmind API to connect to
    #[arg(long, global = true, env = "OVM_URL", value_name = "URL")]
    url: Option<String>,

    /// The frontend base URL
    #[arg(long, global = true, env = "OVM_FRONTEND", value_name = "URL")]
    frontend: Option<String>,

    /// API key to authenticate with instead of an interactive login
    #[arg(
        long,
        global = true,
        env = "OVM_API_KEY",
        hide_env_values = true,
        value_name = "KEY"
    )]
    api_key: Option<String>,

    /// Domain of the authorization server used for interactive logins
    #[arg(long, global = true, env = "OVM_AUTH0_DOMAIN", value_name = "DOMAIN")]
    auth0_domain: Option<String>,

    /// OAuth client id used for interactive logins
    #[arg(long, global = true, env = "OVM_AUTH0_CLIENT_ID", value_name = "ID")]
    auth0_client_id: Option<String>,

    /// Audience requested for interactive logins
    #[arg(long, global = true, env = "OVM_AUTH0_AUDIENCE", value_name = "AUDIENCE")]
    auth0_audience: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "OVM_LOG", value_name = "LEVEL")]
    log: Option<String>,
}

impl GlobalArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            frontend: self.frontend.clone(),
            api_key: self.api_key.clone(),
            auth_domain: self.auth0_domain.clone(),
            auth_client_id: self.auth0_client_id.clone(),
            auth_audience: self.auth0_audience.clone(),
            log_level: self.log.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the specified change; call this just before making it. Stores a
    /// snapshot of the current system state for later reference
    StartChange(commands::StartChangeArgs),

    /// Finish the specified change; call this just after making it. Stores a
    /// snapshot of the current system state for later reference
    EndChange(commands::EndChangeArgs),

    /// Calculate the bookmarks that would be overlapping with a snapshot
    GetAffectedBookmarks(commands::GetAffectedBookmarksArgs),

    /// Print a shell completion script
    Completions(commands::CompletionsArgs),
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(self.global.overrides())?)
    }

    pub fn run(self, config: &Config) -> Result<()> {
        match self.command {
            Command::StartChange(args) => commands::start_change::run(args, config, &interruptible()?),
            Command::EndChange(args) => commands::end_change::run(args, config, &interruptible()?),
            Command::GetAffectedBookmarks(args) => {
                commands::get_affected_bookmarks::run(args, config, &interruptible()?)
            }
            Command::Completions(args) => commands::completions::run(args),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared command helpers
// ---------------------------------------------------------------------------

/// Root context for a command, canceled by SIGINT/SIGTERM
fn interruptible() -> Result<Context> {
    let ctx = Context::background();
    context::cancel_on_signals(&ctx).map_err(Error::Signals)?;
    Ok(ctx)
}

pub(crate) fn parse_timeout(value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| Error::invalid_flag("timeout", value, e))
}

pub(crate) fn parse_uuid(flag: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|e| Error::invalid_flag(flag, value, e))
}

pub(crate) fn auth_settings(config: &Config) -> AuthSettings {
    AuthSettings {
        api_url: config.url.clone(),
        api_key: config.api_key.clone(),
        domain: config.auth_domain.clone(),
        client_id: config.auth_client_id.clone(),
        audience: config.auth_audience.clone(),
        token_cache: Some(config.token_cache_path()),
    }
}

pub(crate) fn authenticate(ctx: &Context, config: &Config, scopes: &[&str]) -> Result<AccessToken> {
    auth::ensure_token(ctx, &auth_settings(config), scopes).map_err(|source| Error::Auth {
        url: config.url.clone(),
        source,
    })
}
