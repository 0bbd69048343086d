use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvergeError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("minion not found: {0}")]
    MinionNotFound(String),

    #[error("minion {0} is not available")]
    AgentUnavailable(String),

    #[error("timed out after {}s while {phase}", waited.as_secs())]
    Timeout { phase: String, waited: Duration },

    #[error("cancelled")]
    Cancelled,

    #[error("job submission failed: {0}")]
    JobSubmission(String),

    #[error("unexpected result shape for minion {minion}: {detail}")]
    ResultShape { minion: String, detail: String },

    #[error(
        "{function} failed on {minion}:\n  {}",
        reasons.join("\n  ")
    )]
    StateFailure {
        minion: String,
        function: String,
        reasons: Vec<String>,
    },

    #[error("salt-api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ConvergeError {
    /// Conditions the polling loops absorb and retry until the deadline.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConvergeError::AgentUnavailable(_) | ConvergeError::MinionNotFound(_)
        )
    }

    /// `true` when the run completed but one or more state units failed.
    pub fn is_state_failure(&self) -> bool {
        matches!(self, ConvergeError::StateFailure { .. })
    }

    pub(crate) fn shape(minion: &str, detail: impl Into<String>) -> Self {
        ConvergeError::ResultShape {
            minion: minion.to_string(),
            detail: detail.into(),
        }
    }
}
