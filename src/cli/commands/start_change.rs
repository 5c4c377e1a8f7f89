// ===========================================================================
// ovm-cli start-change - Begin a change and snapshot the system
// ===========================================================================

use clap::Args;
use tracing::{field, info_span};

use super::change::{run_transition, ChangeArgs, Transition};
use crate::cli::Result;
use crate::config::Config;
use crate::context::Context;
use crate::rpc::messages::ChangeStatus;
use crate::rpc::ChangesClient;

/// Starting a change snapshots the system before it is modified
const START_CHANGE: Transition = Transition {
    expected: ChangeStatus::Defining,
    call: ChangesClient::start_change,
    action: "to start change",
    finished: "started change",
};

#[derive(Args, Debug)]
pub struct StartChangeArgs {
    #[command(flatten)]
    pub change: ChangeArgs,

    /// How long to wait for responses (e.g. 90s, 5m)
    #[arg(long, default_value = "1m", value_name = "DURATION")]
    pub timeout: String,
}

pub fn run(args: StartChangeArgs, config: &Config, ctx: &Context) -> Result<()> {
    let span = info_span!("CLI StartChange", url = %config.url, uuid = field::Empty);
    run_transition(&START_CHANGE, &args.change, &args.timeout, config, ctx, span)
}
