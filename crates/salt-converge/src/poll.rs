//! Fixed-interval polling under a shared deadline and cancellation token.
//!
//! Both the registration waiter and the job poller are driven by
//! [`poll_until`]. Every point that can block (the remote call itself and the
//! sleep between ticks) is raced against the token and the deadline, so an
//! external cancel is observed immediately rather than at the end of an
//! interval.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ConvergeError, Result};

/// Upper bound for any wake-up or deadline, about thirty years out.
/// Durations beyond it are treated as "never".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + by`, saturating at [`FAR_FUTURE`] instead of overflowing.
fn after(by: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(by.min(FAR_FUTURE))
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

// ─── PollContext ──────────────────────────────────────────────────────────

/// Deadline, interval and cancellation shared by one provisioning run.
#[derive(Debug, Clone)]
pub struct PollContext {
    interval: Duration,
    timeout: Duration,
    deadline: Instant,
    cancel: CancellationToken,
}

impl PollContext {
    /// Start the clock: the deadline is `now + timeout`, saturating for
    /// timeouts too large to represent.
    pub fn new(timeout: Duration, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            interval,
            timeout,
            deadline: after(timeout),
            cancel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast if the run was cancelled or the deadline has passed.
    /// Cancellation wins when both hold.
    pub fn check(&self, phase: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ConvergeError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(self.timeout_error(phase));
        }
        Ok(())
    }

    /// Sleep one interval, clamped to the deadline. Returns early with
    /// `Cancelled` if the token fires mid-sleep.
    pub async fn sleep(&self, phase: &str) -> Result<()> {
        let wake = after(self.interval).min(self.deadline);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ConvergeError::Cancelled),
            _ = tokio::time::sleep_until(wake) => self.check(phase),
        }
    }

    /// Run a remote call, abandoning it on cancellation or deadline.
    pub async fn guard<F, T>(&self, phase: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ConvergeError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(self.timeout_error(phase)),
            res = fut => res,
        }
    }

    fn timeout_error(&self, phase: &str) -> ConvergeError {
        ConvergeError::Timeout {
            phase: phase.to_string(),
            waited: self.timeout,
        }
    }
}

// ─── PollState ────────────────────────────────────────────────────────────

/// Where a polling loop currently stands. Emitted on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    fn terminal_for(err: &ConvergeError) -> Self {
        match err {
            ConvergeError::Cancelled => PollState::Cancelled,
            ConvergeError::Timeout { .. } => PollState::TimedOut,
            _ => PollState::Failed,
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollState::Waiting => "waiting",
            PollState::Polling => "polling",
            PollState::Succeeded => "succeeded",
            PollState::Failed => "failed",
            PollState::TimedOut => "timed_out",
            PollState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ─── poll_until ───────────────────────────────────────────────────────────

/// Result of one probe.
#[derive(Debug)]
pub enum Tick<T> {
    Ready(T),
    /// Not there yet; the reason is only used for logging.
    Pending(String),
}

/// Call `probe` once per interval until it reports [`Tick::Ready`].
///
/// The deadline is checked before every probe. Errors returned by the probe
/// are fatal and propagate unchanged; anything the caller wants retried must
/// be mapped to [`Tick::Pending`] inside the probe.
pub async fn poll_until<T, F, Fut>(ctx: &PollContext, phase: &str, mut probe: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Tick<T>>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if let Err(e) = ctx.check(phase) {
            return Err(finish(phase, attempt, e));
        }

        debug!(phase, attempt, state = %PollState::Polling, "querying master");
        match ctx.guard(phase, probe(attempt)).await {
            Ok(Tick::Ready(value)) => {
                info!(phase, attempt, state = %PollState::Succeeded, "poll complete");
                return Ok(value);
            }
            Ok(Tick::Pending(reason)) => {
                debug!(phase, attempt, state = %PollState::Waiting, reason = %reason, "not ready");
            }
            Err(e) => return Err(finish(phase, attempt, e)),
        }

        if let Err(e) = ctx.sleep(phase).await {
            return Err(finish(phase, attempt, e));
        }
    }
}

fn finish(phase: &str, attempt: u32, err: ConvergeError) -> ConvergeError {
    let state = PollState::terminal_for(&err);
    warn!(phase, attempt, state = %state, error = %err, "polling stopped");
    err
}

// ─── Tests ────────────────────────────────────────────────────────────────
