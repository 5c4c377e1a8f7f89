// ===========================================================================
// logging - tracing subscriber setup
// ===========================================================================

use std::io::IsTerminal;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid log level '{0}' (expected error, warn, info, debug or trace)")]
    InvalidLevel(String),

    #[error("invalid RUST_LOG filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("could not install logger: {0}")]
    Init(String),
}

/// Parse a log level name. `warning`, `fatal` and `panic` are accepted as
/// aliases so existing configs keep working.
pub fn parse_level(level: &str) -> Result<LevelFilter, Error> {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Ok(LevelFilter::WARN),
        "fatal" | "panic" => Ok(LevelFilter::ERROR),
        other => LevelFilter::from_str(other).map_err(|_| Error::InvalidLevel(level.to_string())),
    }
}

/// Filter directives for `level`; HTTP internals stay at warn
fn directives(level: LevelFilter) -> String {
    format!("{level},ureq=warn,ureq_proto=warn,rustls=warn")
}

/// Install the global subscriber writing to stderr. `RUST_LOG`, when set,
/// replaces the configured level.
pub fn init(level: &str) -> Result<(), Error> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(spec)?,
        _ => EnvFilter::try_new(directives(parse_level(level)?))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Init(e.to_string()))
}
