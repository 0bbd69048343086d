use anyhow::Context;
use salt_converge::{ClientMode, ProvisionConfig};
use std::path::Path;

/// Provisioning flags shared by `apply` and `validate`.
///
/// Each flag is optional so it can fill in or override the config file.
#[derive(clap::Args, Debug, Default)]
pub struct ProvisionArgs {
    /// salt-api base URL, e.g. https://salt.example.com:8000
    #[arg(long, env = "SALT_API_URL")]
    pub address: Option<String>,

    #[arg(long, env = "SALT_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "SALT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// External auth backend (pam, ldap, auto, ...)
    #[arg(long, env = "SALT_EAUTH")]
    pub backend: Option<String>,

    /// Id of the minion to provision
    #[arg(long)]
    pub minion_id: Option<String>,

    /// Give up after this many minutes (default: 30)
    #[arg(long)]
    pub timeout_minutes: Option<u64>,

    /// Seconds between polls of the master (default: 10)
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Submission mode: async polls jobs.lookup_jid, sync blocks on the call
    #[arg(long)]
    pub mode: Option<ClientMode>,

    /// State function to run (default: state.highstate)
    #[arg(long)]
    pub function: Option<String>,
}

impl ProvisionArgs {
    fn apply(self, cfg: &mut ProvisionConfig) {
        if let Some(v) = self.address {
            cfg.address = v;
        }
        if let Some(v) = self.username {
            cfg.username = v;
        }
        if let Some(v) = self.password {
            cfg.password = v;
        }
        if let Some(v) = self.backend {
            cfg.backend = v;
        }
        if let Some(v) = self.minion_id {
            cfg.minion_id = v;
        }
        if let Some(v) = self.timeout_minutes {
            cfg.timeout_minutes = v;
        }
        if let Some(v) = self.interval_secs {
            cfg.interval_secs = v;
        }
        if let Some(v) = self.mode {
            cfg.mode = v;
        }
        if let Some(v) = self.function {
            cfg.function = v;
        }
    }
}

/// Load the config file (if any) and layer the flags on top.
pub fn resolve(config_path: Option<&Path>, args: ProvisionArgs) -> anyhow::Result<ProvisionConfig> {
    let mut cfg = match config_path {
        Some(path) => ProvisionConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ProvisionConfig::default(),
    };
    args.apply(&mut cfg);
    Ok(cfg)
}
