// ===========================================================================
// ovm-cli get-affected-bookmarks - Bookmarks overlapping a snapshot
// ===========================================================================

use clap::Args;
use tracing::{info, info_span};
use uuid::Uuid;

use crate::cli::{authenticate, parse_timeout, parse_uuid, Error, Result};
use crate::config::Config;
use crate::context::Context;
use crate::rpc::messages::GetAffectedBookmarksRequest;
use crate::rpc::{self, BookmarksClient, Transport};

#[derive(Args, Debug)]
pub struct GetAffectedBookmarksArgs {
    /// The UUID of the snapshot that should be checked
    #[arg(long, value_name = "ID")]
    pub snapshot_uuid: Option<String>,

    /// Comma separated UUIDs of the bookmarks to check against the snapshot
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub bookmark_uuids: Vec<String>,

    /// The bookmark service API endpoint (defaults to --url)
    #[arg(long, env = "OVM_BOOKMARK_URL", value_name = "URL")]
    pub bookmark_url: Option<String>,

    /// How long to wait for responses (e.g. 90s, 5m)
    #[arg(long, default_value = "5m", value_name = "DURATION")]
    pub timeout: String,
}

pub fn run(args: GetAffectedBookmarksArgs, config: &Config, ctx: &Context) -> Result<()> {
    let timeout = parse_timeout(&args.timeout)?;
    let snapshot_uuid = parse_uuid("snapshot-uuid", args.snapshot_uuid.as_deref().unwrap_or(""))?;
    let bookmark_uuids = parse_bookmark_uuids(&args.bookmark_uuids)?;

    let bookmark_url = args
        .bookmark_url
        .filter(|u| !u.trim().is_empty())
        .or_else(|| config.bookmark_url.clone())
        .unwrap_or_else(|| config.url.clone());

    let span = info_span!(
        "CLI GetAffectedBookmarks",
        url = %config.url,
        bookmark_url = %bookmark_url,
        snapshot = %snapshot_uuid
    );
    let _guard = span.enter();

    let token = authenticate(ctx, config, &["changes:read"])?;

    let ctx = ctx.with_timeout(timeout);
    let client = BookmarksClient::new(
        Transport::new(rpc::api_base(&bookmark_url)).with_token(token.as_str()),
    );

    let response = client
        .get_affected_bookmarks(
            &ctx,
            &GetAffectedBookmarksRequest {
                snapshot_uuid,
                bookmark_uuids,
            },
        )
        .map_err(Error::rpc("to get affected bookmarks"))?;

    let affected = response
        .bookmark_uuids()
        .map_err(|e| Error::Other(format!("server returned an invalid bookmark UUID: {e}")))?;

    if affected.is_empty() {
        info!("no affected bookmarks");
    }
    for uuid in affected {
        info!(uuid = %uuid, "found affected bookmark");
    }
    Ok(())
}

fn parse_bookmark_uuids(entries: &[String]) -> Result<Vec<Uuid>> {
    entries
        .iter()
        .map(|entry| parse_uuid("bookmark-uuids", entry))
        .collect()
}
