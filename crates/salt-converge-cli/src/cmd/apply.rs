use crate::output::{outcome_label, print_json};
use crate::settings::{resolve, ProvisionArgs};
use anyhow::anyhow;
use salt_converge::{provision, ConvergeError, ProvisionConfig, WarnLevel};
use std::path::Path;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: Option<&Path>, args: ProvisionArgs, json: bool) -> anyhow::Result<()> {
    let config = resolve(config_path, args)?;
    for w in config
        .validate()
        .iter()
        .filter(|w| w.level == WarnLevel::Warning)
    {
        tracing::warn!("{}", w.message);
    }

    let rt = tokio::runtime::Runtime::new()?;
    let cancel = CancellationToken::new();

    let result = rt.block_on(async {
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; cancelling provisioning run");
                on_interrupt.cancel();
            }
        });

        // In JSON mode stdout carries only the final document.
        let sink = |line: &str| {
            if !json {
                println!("{line}");
            }
        };
        provision(&config, &sink, cancel.clone()).await
    });

    report(&config, result, json)
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

fn report(
    config: &ProvisionConfig,
    result: Result<(), ConvergeError>,
    json: bool,
) -> anyhow::Result<()> {
    let minion = &config.minion_id;

    match result {
        Ok(()) => {
            if json {
                print_json(&serde_json::json!({
                    "minion_id": minion,
                    "function": config.function,
                    "status": "success",
                }))?;
            } else {
                println!("{} completed successfully on minion {minion}", config.function);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let reasons = match &e {
                    ConvergeError::StateFailure { reasons, .. } => reasons.clone(),
                    _ => Vec::new(),
                };
                print_json(&serde_json::json!({
                    "minion_id": minion,
                    "function": config.function,
                    "status": outcome_label(&e),
                    "error": e.to_string(),
                    "reasons": reasons,
                }))?;
            }
            Err(anyhow!(e).context(format!("provisioning minion {minion} failed")))
        }
    }
}
