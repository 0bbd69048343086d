use crate::output::print_json;
use crate::settings::{resolve, ProvisionArgs};
use salt_converge::WarnLevel;
use std::path::Path;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_path: Option<&Path>, args: ProvisionArgs, json: bool) -> anyhow::Result<()> {
    let config = resolve(config_path, args)?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "minion_id": config.minion_id,
            "mode": config.mode,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
