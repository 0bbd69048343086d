//! `salt-converge`: drive one Salt minion to its declared state.
//!
//! Given a salt-api endpoint and a minion id, this crate waits for the minion
//! to register with the master, runs `state.highstate` (or another state
//! function) on it, and reduces the irregular return payload to a single
//! pass/fail verdict with one diagnostic line per failed state.
//!
//! # Architecture
//!
//! ```text
//! ProvisionConfig ── validate()
//!     │
//!     ▼
//! provision_with      ← one PollContext: deadline + interval + CancellationToken
//!     │
//!     ├─ SaltClient::login
//!     ├─ wait_for_registration   ← poll minion grains until non-empty
//!     └─ run_and_verify          ← submit job; poll jobs.lookup_jid (async)
//!            │                      or take the immediate return (sync)
//!            ▼
//!        classify                ← EntryShape decode → Verdict
//! ```
//!
//! `SaltClient` is the seam to the master. [`SaltApi`] implements it over
//! rest_cherrypy; tests substitute a scripted in-memory client.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use salt_converge::{provision, ProvisionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ProvisionConfig::load("provision.yaml".as_ref())?;
//! let sink = |line: &str| println!("{line}");
//! provision(&config, &sink, CancellationToken::new()).await?;
//! ```

pub mod api;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poll;
pub mod provision;
pub mod types;
pub mod waiter;

#[cfg(test)]
mod tests;

pub use api::SaltApi;
pub use classify::{classify, StateOutcome};
pub use client::SaltClient;
pub use config::{ConfigWarning, ProvisionConfig, WarnLevel};
pub use error::ConvergeError;
pub use orchestrator::run_and_verify;
pub use poll::{PollContext, PollState};
pub use provision::{provision, provision_with, OutputSink};
pub use types::{ClientMode, JobHandle, MinionInfo, MinionJob, Submission, Verdict};
pub use waiter::wait_for_registration;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ConvergeError>;
