// ===========================================================================
// ovm-cli end-change - Finish a change and snapshot the system
// ===========================================================================

use clap::Args;
use tracing::{field, info_span};

use super::change::{run_transition, ChangeArgs, Transition};
use crate::cli::Result;
use crate::config::Config;
use crate::context::Context;
use crate::rpc::messages::ChangeStatus;
use crate::rpc::ChangesClient;

const END_CHANGE: Transition = Transition {
    expected: ChangeStatus::Happening,
    call: ChangesClient::end_change,
    action: "to end change",
    finished: "ended change",
};

#[derive(Args, Debug)]
pub struct EndChangeArgs {
    #[command(flatten)]
    pub change: ChangeArgs,

    /// How long to wait for responses (e.g. 90s, 5m)
    #[arg(long, default_value = "1m", value_name = "DURATION")]
    pub timeout: String,
}

pub fn run(args: EndChangeArgs, config: &Config, ctx: &Context) -> Result<()> {
    let span = info_span!("CLI EndChange", url = %config.url, uuid = field::Empty);
    run_transition(&END_CHANGE, &args.change, &args.timeout, config, ctx, span)
}
