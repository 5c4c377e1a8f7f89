// ===========================================================================
// change selection & progress reporting shared by start-change/end-change
// ===========================================================================

use clap::Args;
use tracing::{field, info, Span};
use uuid::Uuid;

use crate::cli::{authenticate, parse_timeout, parse_uuid, Error, Result};
use crate::config::Config;
use crate::context::Context;
use crate::rpc::messages::{
    ChangeProgress, ChangeStatus, ChangeTransitionRequest, ListChangesByStatusRequest,
};
use crate::rpc::{self, ChangesClient, ServerStream, Transport};

#[derive(Args, Debug, Clone, Default)]
pub struct ChangeArgs {
    /// The UUID of the change
    #[arg(long, value_name = "ID", conflicts_with_all = ["change", "ticket_link"])]
    pub uuid: Option<String>,

    /// The frontend URL of the change, e.g. https://app.overmind.tech/changes/<ID>
    #[arg(long, value_name = "URL", conflicts_with = "ticket_link")]
    pub change: Option<String>,

    /// Link to the ticket this change was created for
    #[arg(long, value_name = "URL")]
    pub ticket_link: Option<String>,
}

/// How the change to act on is identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSelector {
    Uuid(Uuid),
    TicketLink(String),
    /// The single change currently in the expected status
    Current,
}

impl ChangeArgs {
    /// Validate the flags without touching the network
    pub fn selector(&self) -> Result<ChangeSelector> {
        if let Some(raw) = given(&self.uuid) {
            return parse_uuid("uuid", raw).map(ChangeSelector::Uuid);
        }
        if let Some(url) = given(&self.change) {
            return parse_change_url(url).map(ChangeSelector::Uuid);
        }
        if let Some(link) = given(&self.ticket_link) {
            return Ok(ChangeSelector::TicketLink(link.trim().to_string()));
        }
        Ok(ChangeSelector::Current)
    }
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Extract the change UUID from a frontend URL: the path segment following
/// `changes`.
pub fn parse_change_url(url: &str) -> Result<Uuid> {
    let invalid = |reason: &str| Error::invalid_flag("change", url, reason);

    let (_, rest) = url
        .trim()
        .split_once("://")
        .ok_or_else(|| invalid("not an absolute URL"))?;
    let path = rest.split_once('/').map_or("", |(_, path)| path);
    let path = path.split(['?', '#']).next().unwrap_or_default();

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "changes" {
            let id = segments
                .next()
                .ok_or_else(|| invalid("the URL does not contain a change id"))?;
            return Uuid::parse_str(id).map_err(|e| invalid(&e.to_string()));
        }
    }

    Err(invalid("expected a URL like https://app.overmind.tech/changes/<ID>"))
}

/// Turn a selector into a change UUID, asking the API when needed
pub fn resolve(
    ctx: &Context,
    client: &ChangesClient,
    selector: &ChangeSelector,
    expected: ChangeStatus,
) -> Result<Uuid> {
    let link = match selector {
        ChangeSelector::Uuid(id) => return Ok(*id),
        ChangeSelector::TicketLink(link) => Some(link.as_str()),
        ChangeSelector::Current => None,
    };

    let changes = client
        .list_changes_by_status(ctx, &ListChangesByStatusRequest { status: expected })
        .map_err(Error::rpc("to list changes"))?
        .changes;

    match link {
        Some(link) => changes
            .iter()
            .find(|c| c.properties.ticket_link == link)
            .map(|c| c.metadata.uuid)
            .ok_or_else(|| {
                Error::Change(format!("no {expected} change found with ticket link {link}"))
            }),
        None => match changes.as_slice() {
            [only] => Ok(only.metadata.uuid),
            [] => Err(Error::Change(format!(
                "no change is currently {expected}; use --uuid, --change or --ticket-link"
            ))),
            many => Err(Error::Change(format!(
                "{} changes are currently {expected}; use --uuid, --change or --ticket-link to pick one",
                many.len()
            ))),
        },
    }
}

/// A lifecycle step of a change: which status it starts from, which RPC
/// performs it and what to log once it finished.
pub struct Transition {
    pub expected: ChangeStatus,
    pub call: fn(
        &ChangesClient,
        &Context,
        &ChangeTransitionRequest,
    ) -> rpc::Result<ServerStream<ChangeProgress>>,
    pub action: &'static str,
    pub finished: &'static str,
}

/// Run `transition` on the selected change inside `span`, which must have an
/// empty `uuid` field.
pub fn run_transition(
    transition: &Transition,
    change: &ChangeArgs,
    timeout: &str,
    config: &Config,
    ctx: &Context,
    span: Span,
) -> Result<()> {
    let timeout = parse_timeout(timeout)?;
    let selector = change.selector()?;

    let _guard = span.enter();

    let token = authenticate(ctx, config, &["changes:write"])?;

    let ctx = ctx.with_timeout(timeout);
    let client = ChangesClient::new(
        Transport::new(rpc::api_base(&config.url)).with_token(token.as_str()),
    );

    let change_uuid = resolve(&ctx, &client, &selector, transition.expected)?;
    span.record("uuid", field::display(change_uuid));

    let stream = (transition.call)(&client, &ctx, &ChangeTransitionRequest { change_uuid })
        .map_err(Error::rpc(transition.action))?;

    info!(change_url = %config.change_url(&change_uuid), "processing");
    log_progress(stream, transition.action)?;
    info!("{}", transition.finished);
    Ok(())
}

/// Log every progress message until the server closes the stream
pub fn log_progress(stream: ServerStream<ChangeProgress>, action: &'static str) -> Result<()> {
    for progress in stream {
        let progress = progress.map_err(Error::rpc(action))?;
        info!(
            state = progress.state.as_str(),
            items = progress.num_items,
            edges = progress.num_edges,
            "progress"
        );
    }
    Ok(())
}
