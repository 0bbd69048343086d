use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::SaltApi;
use crate::client::SaltClient;
use crate::config::ProvisionConfig;
use crate::orchestrator::run_and_verify;
use crate::poll::PollContext;
use crate::types::Verdict;
use crate::waiter::wait_for_registration;
use crate::{ConvergeError, Result};

// ─── OutputSink ───────────────────────────────────────────────────────────

/// Receives the human-readable progress lines of a run.
pub trait OutputSink: Send + Sync {
    fn output(&self, line: &str);
}

impl<F> OutputSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn output(&self, line: &str) {
        self(line)
    }
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Provision one minion with a fresh [`SaltApi`] built from `config`.
///
/// The config is validated before anything is sent to the master.
pub async fn provision(
    config: &ProvisionConfig,
    sink: &dyn OutputSink,
    cancel: CancellationToken,
) -> Result<()> {
    config.ensure_valid()?;
    let client = SaltApi::from_config(config)?;
    info!(address = %config.address, mode = %client.mode(), "connecting to salt-api");
    provision_with(&client, config, sink, cancel).await
}

/// Log in, wait for the minion to register, apply the configured function
/// and verify its result, all under one deadline of `config.timeout()`.
///
/// Returns `Ok(())` only when every state unit succeeded. Failed units come
/// back together as [`ConvergeError::StateFailure`].
pub async fn provision_with<C>(
    client: &C,
    config: &ProvisionConfig,
    sink: &dyn OutputSink,
    cancel: CancellationToken,
) -> Result<()>
where
    C: SaltClient + ?Sized,
{
    let ctx = PollContext::new(config.timeout(), config.interval(), cancel);
    let minion = config.minion_id.as_str();

    ctx.guard("logging in", client.login()).await?;

    sink.output(&format!(
        "Waiting for minion {minion} to register with master"
    ));
    wait_for_registration(client, minion, &ctx).await?;

    sink.output(&format!("Executing {} on minion {minion}", config.function));
    match run_and_verify(client, minion, &config.function, &ctx).await? {
        Verdict::Success => {
            info!(minion, function = %config.function, "run succeeded");
            Ok(())
        }
        Verdict::Failure { reasons } => Err(ConvergeError::StateFailure {
            minion: minion.to_string(),
            function: config.function.clone(),
            reasons,
        }),
    }
}
