use salt_converge::ConvergeError;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Short machine-readable status for a failed run.
pub fn outcome_label(err: &ConvergeError) -> &'static str {
    match err {
        ConvergeError::StateFailure { .. } => "failed",
        ConvergeError::Timeout { .. } => "timeout",
        ConvergeError::Cancelled => "cancelled",
        ConvergeError::Auth(_) => "auth_error",
        ConvergeError::ResultShape { .. } => "bad_result",
        ConvergeError::Config(_) => "invalid_config",
        _ => "error",
    }
}
