use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::types::ClientMode;
use crate::{ConvergeError, Result};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProvisionConfig
// ---------------------------------------------------------------------------

/// Everything one provisioning run needs.
///
/// Every field may be omitted from the YAML file so the CLI can fill it from
/// flags; [`ProvisionConfig::validate`] reports what is still missing.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Base URL of salt-api, e.g. `https://salt.example.com:8000`.
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// External auth backend (`pam`, `ldap`, `auto`, ...).
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub minion_id: String,
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub mode: ClientMode,
    /// Execution function applied to the minion.
    #[serde(default = "default_function")]
    pub function: String,
}

fn default_timeout_minutes() -> u64 {
    30
}

fn default_interval_secs() -> u64 {
    10
}

fn default_function() -> String {
    "state.highstate".to_string()
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            username: String::new(),
            password: String::new(),
            backend: String::new(),
            minion_id: String::new(),
            timeout_minutes: default_timeout_minutes(),
            interval_secs: default_interval_secs(),
            mode: ClientMode::default(),
            function: default_function(),
        }
    }
}

impl fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("backend", &self.backend)
            .field("minion_id", &self.minion_id)
            .field("timeout_minutes", &self.timeout_minutes)
            .field("interval_secs", &self.interval_secs)
            .field("mode", &self.mode)
            .field("function", &self.function)
            .finish()
    }
}

impl ProvisionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: ProvisionConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. address must be an http(s) URL
        if self.address.trim().is_empty() {
            warnings.push(ConfigWarning::error("address is required"));
        } else {
            match Url::parse(&self.address) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => warnings.push(ConfigWarning::error(format!(
                    "address scheme '{}' is not http or https",
                    url.scheme()
                ))),
                Err(e) => warnings.push(ConfigWarning::error(format!(
                    "address '{}' is not a valid URL: {e}",
                    self.address
                ))),
            }
        }

        // 2. credentials and target
        for (name, value) in [
            ("username", &self.username),
            ("password", &self.password),
            ("backend", &self.backend),
            ("minion_id", &self.minion_id),
            ("function", &self.function),
        ] {
            if value.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!("{name} is required")));
            }
        }

        // 3. timing
        if self.timeout_minutes == 0 {
            warnings.push(ConfigWarning::error("timeout_minutes must be positive"));
        }
        if self.interval_secs == 0 {
            warnings.push(ConfigWarning::error("interval_secs must be positive"));
        }
        if self.timeout_minutes > 0 && self.interval() > self.timeout() {
            warnings.push(ConfigWarning::warning(format!(
                "interval_secs ({}) exceeds the timeout; the master will be polled only once",
                self.interval_secs
            )));
        }

        warnings
    }

    /// Fail with every validation error at once; warnings are ignored.
    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConvergeError::Config(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
