mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use settings::ProvisionArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "salt-converge",
    about = "Wait for a Salt minion to register, run highstate on it, and verify the result",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML file with provisioning settings (flags override its values)
    #[arg(long, short = 'c', global = true, env = "SALT_CONVERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log progress of every poll
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the minion: wait for it, apply its states, verify the result
    Apply {
        #[command(flatten)]
        args: ProvisionArgs,
    },

    /// Validate the settings without contacting the master
    Validate {
        #[command(flatten)]
        args: ProvisionArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Apply { args } => cmd::apply::run(config_path, args, cli.json),
        Commands::Validate { args } => cmd::validate::run(config_path, args, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
