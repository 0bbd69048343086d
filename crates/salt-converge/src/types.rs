use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── salt-api envelope ────────────────────────────────────────────────────

/// Every rest_cherrypy response wraps its payload in a `return` list.
#[derive(Debug, Clone, Deserialize)]
pub struct SaltResponse<T> {
    #[serde(rename = "return")]
    pub ret: Vec<T>,
}

impl<T> SaltResponse<T> {
    pub fn into_first(self) -> Option<T> {
        self.ret.into_iter().next()
    }
}

/// `return[0]` of a successful `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginToken {
    pub token: String,
    #[serde(default)]
    pub expire: f64,
    #[serde(default)]
    pub eauth: String,
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub eauth: &'a str,
}

// ─── Minions ──────────────────────────────────────────────────────────────

/// The master's view of one minion.
#[derive(Debug, Clone, PartialEq)]
pub struct MinionInfo {
    pub id: String,
    /// Grains reported by the minion. `None` when the master knows the key but
    /// the minion has not connected.
    pub grains: Option<Map<String, Value>>,
}

impl MinionInfo {
    pub fn offline(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            grains: None,
        }
    }

    pub fn with_grains(id: impl Into<String>, grains: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            grains: Some(grains),
        }
    }

    /// A minion counts as registered once it has reported non-empty grains.
    pub fn is_registered(&self) -> bool {
        self.grains.as_ref().is_some_and(|g| !g.is_empty())
    }
}

// ─── Jobs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    List,
}

/// A job aimed at exactly one minion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinionJob {
    #[serde(rename = "tgt")]
    pub target: String,
    #[serde(rename = "tgt_type")]
    pub target_type: TargetType,
    #[serde(rename = "fun")]
    pub function: String,
}

impl MinionJob {
    pub fn new(minion: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            target: minion.into(),
            target_type: TargetType::List,
            function: function.into(),
        }
    }
}

/// `return[0]` of `POST /minions`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobHandle {
    #[serde(default)]
    pub jid: String,
    #[serde(default)]
    pub minions: Vec<String>,
}

/// What the master hands back when a job is submitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Job accepted; its result must be looked up by jid.
    Async(JobHandle),
    /// The call blocked until the minion answered; this is the raw payload.
    Sync(Value),
}

/// Which submission path the client takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    #[default]
    Async,
    Sync,
}

impl std::fmt::Display for ClientMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientMode::Async => f.write_str("async"),
            ClientMode::Sync => f.write_str("sync"),
        }
    }
}

impl std::str::FromStr for ClientMode {
    type Err = crate::ConvergeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "async" => Ok(ClientMode::Async),
            "sync" => Ok(ClientMode::Sync),
            other => Err(crate::ConvergeError::Config(format!(
                "unknown mode '{other}' (expected async or sync)"
            ))),
        }
    }
}

// ─── Verdict ──────────────────────────────────────────────────────────────

/// Outcome of a configuration run that reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// One `"<unit> failed on <minion>: <comment>"` line per failed unit.
    Failure { reasons: Vec<String> },
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}
