use super::Context;

/// Cancel `ctx` when SIGINT or SIGTERM arrives.
///
/// The signals are blocked on the calling thread and waited for on a
/// dedicated listener thread. Call this before spawning any other thread so
/// that every worker inherits the blocked mask.
#[cfg(unix)]
pub fn cancel_on_signals(ctx: &Context) -> std::io::Result<()> {
    use nix::sys::signal::{SigSet, Signal};

    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block().map_err(std::io::Error::from)?;

    let ctx = ctx.clone();
    std::thread::Builder::new()
        .name("signal-listener".into())
        .spawn(move || match set.wait() {
            Ok(signal) => {
                tracing::warn!(signal = signal.as_str(), "received signal, cancelling");
                ctx.cancel();
            }
            Err(e) => tracing::debug!(error = %e, "signal listener stopped"),
        })?;

    Ok(())
}

#[cfg(not(unix))]
pub fn cancel_on_signals(_ctx: &Context) -> std::io::Result<()> {
    Ok(())
}
