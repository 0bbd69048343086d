use tracing::info;

use crate::client::SaltClient;
use crate::poll::{poll_until, PollContext, Tick};
use crate::{ConvergeError, Result};

pub(crate) const PHASE: &str = "waiting for minion registration";

/// Block until `minion` has reported grains to the master.
///
/// Unknown and offline minions are retried every interval; any other error
/// from the master aborts immediately. Gives up with
/// [`ConvergeError::Timeout`] at the deadline or [`ConvergeError::Cancelled`]
/// when the token fires.
pub async fn wait_for_registration<C>(client: &C, minion: &str, ctx: &PollContext) -> Result<()>
where
    C: SaltClient + ?Sized,
{
    info!(minion, "waiting for minion to register");

    poll_until(ctx, PHASE, move |_| async move {
        match client.minion(minion).await {
            Ok(Some(info)) if info.is_registered() => Ok(Tick::Ready(())),
            Ok(Some(_)) => Ok(Tick::Pending("minion has no grains".into())),
            Ok(None) | Err(ConvergeError::MinionNotFound(_)) => {
                Ok(Tick::Pending("minion unknown to master".into()))
            }
            Err(e) => Err(e),
        }
    })
    .await
}
