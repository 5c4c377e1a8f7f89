// ===========================================================================
// context - Cancellation & Deadlines
// ===========================================================================

mod signals;

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub use signals::cancel_on_signals;

pub type Result<T> = std::result::Result<T, Error>;

/// How often a waiting thread re-checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest single condvar wait; longer sleeps loop.
const MAX_WAIT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Default)]
struct CancelState {
    canceled: Mutex<bool>,
    cond: Condvar,
}

/// Shared cancellation flag plus an optional deadline.
///
/// Clones share the same cancellation state. `with_timeout` derives a context
/// with a tighter deadline that is still canceled together with its parent.
#[derive(Debug, Clone, Default)]
pub struct Context {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(current), Some(new)) => Some(current.min(new)),
            (current, None) => current,
            (None, new) => new,
        };
        Self {
            state: Arc::clone(&self.state),
            deadline,
        }
    }

    pub fn cancel(&self) {
        let mut canceled = self
            .state
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *canceled = true;
        self.state.cond.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        *self
            .state
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` when no deadline is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Reason this context is done, if it is
    pub fn err(&self) -> Option<Error> {
        if self.is_canceled() {
            return Some(Error::Canceled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Sleep for `dur`, waking early when the context is done. A `dur` too
    /// large to represent as an instant sleeps until the context is done.
    pub fn sleep(&self, dur: Duration) -> Result<()> {
        let until = Instant::now().checked_add(dur);
        let mut canceled = self
            .state
            .canceled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        loop {
            if *canceled {
                return Err(Error::Canceled);
            }
            let now = Instant::now();
            if let Some(d) = self.deadline {
                if now >= d {
                    return Err(Error::DeadlineExceeded);
                }
            }
            let mut wait = MAX_WAIT;
            if let Some(until) = until {
                if now >= until {
                    return Ok(());
                }
                wait = wait.min(until - now);
            }
            if let Some(left) = self.remaining() {
                wait = wait.min(left);
            }
            canceled = self
                .state
                .cond
                .wait_timeout(canceled, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Receive from a worker channel while observing cancellation.
    ///
    /// Returns `Ok(None)` once every sender has been dropped.
    pub fn recv<T>(&self, rx: &Receiver<T>) -> Result<Option<T>> {
        loop {
            self.check()?;

            let wait = match self.remaining() {
                Some(left) => left.min(POLL_INTERVAL),
                None => POLL_INTERVAL,
            };

            match rx.recv_timeout(wait) {
                Ok(value) => return Ok(Some(value)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }

    /// Run blocking work on a worker thread and wait for it while observing
    /// cancellation. The worker is abandoned if the context finishes first.
    pub fn run_blocking<T, F>(&self, work: F) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(work());
        });
        self.recv(&rx)
    }
}
