use tracing::{info, warn};

use crate::classify::{classify, poll_verdict};
use crate::client::SaltClient;
use crate::poll::{poll_until, PollContext, Tick};
use crate::types::{JobHandle, MinionJob, Submission, Verdict};
use crate::{ConvergeError, Result};

pub(crate) const SUBMIT_PHASE: &str = "submitting job";
pub(crate) const RESULT_PHASE: &str = "waiting for job result";

// ─── Public API ───────────────────────────────────────────────────────────

/// Run `function` on `minion` and reduce its return to a [`Verdict`].
///
/// Works with either submission mode of the client:
///
/// - **async**: the master hands back a jid, which is looked up every
///   interval until the minion's entry is a finished result.
/// - **sync**: the submit call returns the result directly. If the minion did
///   not answer (`false` entry) the job is resubmitted after one interval,
///   until the deadline.
///
/// A failed submission, a lookup error, or an unrecognisable payload aborts
/// immediately. A `Verdict::Failure` is a normal return value, not an error.
pub async fn run_and_verify<C>(
    client: &C,
    minion: &str,
    function: &str,
    ctx: &PollContext,
) -> Result<Verdict>
where
    C: SaltClient + ?Sized,
{
    let job = MinionJob::new(minion, function);

    loop {
        info!(minion, function, "submitting job");
        match submit(client, &job, ctx).await? {
            Submission::Async(handle) => return await_job(client, minion, &handle, ctx).await,
            Submission::Sync(payload) => match classify(minion, &payload) {
                Err(ConvergeError::AgentUnavailable(_)) => {
                    warn!(minion, "minion did not return; resubmitting after interval");
                    ctx.sleep(SUBMIT_PHASE).await?;
                }
                other => return other,
            },
        }
    }
}

// ─── Internal ─────────────────────────────────────────────────────────────

async fn submit<C>(client: &C, job: &MinionJob, ctx: &PollContext) -> Result<Submission>
where
    C: SaltClient + ?Sized,
{
    ctx.check(SUBMIT_PHASE)?;

    let submission = ctx
        .guard(SUBMIT_PHASE, client.submit_job(job))
        .await
        .map_err(|e| match e {
            ConvergeError::Api { .. } | ConvergeError::Http(_) | ConvergeError::Json(_) => {
                ConvergeError::JobSubmission(e.to_string())
            }
            other => other,
        })?;

    if let Submission::Async(handle) = &submission {
        check_handle(job, handle)?;
    }
    Ok(submission)
}

fn check_handle(job: &MinionJob, handle: &JobHandle) -> Result<()> {
    if handle.jid.is_empty() {
        return Err(ConvergeError::JobSubmission(
            "master did not return a job id".into(),
        ));
    }
    if !handle.minions.iter().any(|m| m == &job.target) {
        return Err(ConvergeError::JobSubmission(format!(
            "job {} did not target minion {}",
            handle.jid, job.target
        )));
    }
    Ok(())
}

async fn await_job<C>(
    client: &C,
    minion: &str,
    handle: &JobHandle,
    ctx: &PollContext,
) -> Result<Verdict>
where
    C: SaltClient + ?Sized,
{
    let jid = handle.jid.as_str();
    info!(minion, jid, "job submitted; polling for result");

    // A freshly submitted highstate never finishes instantly.
    ctx.sleep(RESULT_PHASE).await?;

    poll_until(ctx, RESULT_PHASE, move |_| async move {
        match client.lookup_job(jid).await? {
            None => Ok(Tick::Pending("job has no data yet".into())),
            Some(payload) => poll_verdict(minion, &payload),
        }
    })
    .await
}

// ─── Tests ────────────────────────────────────────────────────────────────
