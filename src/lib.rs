// ===========================================================================
// ovm-cli - Command Line Client for Overmind Changes & Bookmarks
// ===========================================================================

pub mod auth;
pub mod cli;
pub mod config;
pub mod context;
pub mod logging;
pub mod rpc;
pub mod util;

pub use config::Config;
