//! Reduce a highstate return payload to a [`Verdict`].
//!
//! Salt reports highstate results in several shapes depending on the client
//! and on how far the job has progressed. The payload is always keyed by
//! minion id; the entry for our minion is decoded into one [`EntryShape`]
//! and only then reduced. Anything outside the recognised shapes is a
//! [`ConvergeError::ResultShape`], never a panic and never a retry.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use tracing::warn;

use crate::poll::Tick;
use crate::types::Verdict;
use crate::{ConvergeError, Result};

/// Keys that only appear on a job-level record, never on a state unit map.
const JOB_METADATA_KEYS: &[&str] = &["retcode", "success", "jid", "fun", "fun_args", "out"];

// ─── EntryShape ───────────────────────────────────────────────────────────

/// The recognised forms of a single minion's entry.
#[derive(Debug, PartialEq)]
enum EntryShape<'a> {
    /// `{"<unit>": {"result": .., "comment": ..}, ..}`
    Units(&'a Map<String, Value>),
    /// `{"ret": {..units..}, "retcode": 0, "success": true}`
    Wrapped {
        units: &'a Map<String, Value>,
        retcode: Option<i64>,
        success: Option<bool>,
    },
    /// `false`: the minion did not return.
    Offline,
    /// Present but not a result yet.
    Pending(&'static str),
}

fn decode_entry<'a>(minion: &str, entry: &'a Value) -> Result<EntryShape<'a>> {
    match entry {
        Value::Null => Ok(EntryShape::Pending("entry is null")),
        Value::Bool(false) => Ok(EntryShape::Offline),
        Value::Object(map) => decode_record(minion, map),
        // Legacy synchronous shape: a one-element list holding the record.
        Value::Array(items) => match items.as_slice() {
            [Value::Object(map)] => decode_record(minion, map),
            _ => Err(ConvergeError::shape(
                minion,
                format!("expected a list with one result record, got {}", describe(entry)),
            )),
        },
        Value::String(s) => Err(ConvergeError::shape(
            minion,
            format!("minion returned a message instead of state results: {s}"),
        )),
        other => Err(ConvergeError::shape(
            minion,
            format!("unexpected entry {}", describe(other)),
        )),
    }
}

fn decode_record<'a>(minion: &str, map: &'a Map<String, Value>) -> Result<EntryShape<'a>> {
    if let Some(ret) = map.get("ret") {
        let units = match ret {
            Value::Null => return Ok(EntryShape::Pending("ret is null")),
            Value::Object(units) => units,
            Value::Array(items) => match items.as_slice() {
                [Value::Object(units)] => units,
                _ => {
                    return Err(ConvergeError::shape(
                        minion,
                        format!("`ret` is {}", describe(ret)),
                    ))
                }
            },
            other => {
                return Err(ConvergeError::shape(
                    minion,
                    format!("`ret` is {}", describe(other)),
                ))
            }
        };
        return Ok(EntryShape::Wrapped {
            units,
            retcode: map.get("retcode").and_then(Value::as_i64),
            success: map.get("success").and_then(Value::as_bool),
        });
    }

    if map.values().all(Value::is_object) {
        return Ok(EntryShape::Units(map));
    }

    if JOB_METADATA_KEYS.iter().any(|k| map.contains_key(*k)) {
        return Ok(EntryShape::Pending("job record without `ret`"));
    }

    Err(ConvergeError::shape(
        minion,
        "entry is a mapping but its values are not state results",
    ))
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => format!("a boolean ({b})"),
        Value::Number(n) => format!("a number ({n})"),
        Value::String(_) => "a string".into(),
        Value::Array(items) => format!("a list of {} items", items.len()),
        Value::Object(_) => "a mapping".into(),
    }
}

// ─── StateOutcome ─────────────────────────────────────────────────────────

/// One state unit's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StateOutcome {
    pub name: String,
    /// `None` when `result` is missing, null or not a boolean.
    pub succeeded: Option<bool>,
    pub comment: String,
    /// Salt's execution order, when reported.
    pub run_num: Option<u64>,
}

impl StateOutcome {
    fn parse(minion: &str, name: &str, value: &Value) -> Result<Self> {
        let Value::Object(record) = value else {
            return Err(ConvergeError::shape(
                minion,
                format!("state unit `{name}` is {}", describe(value)),
            ));
        };
        Ok(Self {
            name: name.to_string(),
            succeeded: record.get("result").and_then(Value::as_bool),
            comment: render_comment(record.get("comment")),
            run_num: record.get("__run_num__").and_then(Value::as_u64),
        })
    }

    /// Missing or null `result` counts as a failure.
    pub fn is_failed(&self) -> bool {
        self.succeeded != Some(true)
    }

    fn diagnostic(&self, minion: &str) -> String {
        format!("{} failed on {}: {}", self.name, minion, self.comment)
    }

    fn run_order(&self, other: &Self) -> Ordering {
        let key = |o: &Self| o.run_num.unwrap_or(u64::MAX);
        key(self)
            .cmp(&key(other))
            .then_with(|| self.name.cmp(&other.name))
    }
}

fn render_comment(comment: Option<&Value>) -> String {
    match comment {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .map(|l| match l {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

/// Parse every unit of a result mapping, in execution order.
pub fn state_outcomes(minion: &str, units: &Map<String, Value>) -> Result<Vec<StateOutcome>> {
    let mut outcomes = units
        .iter()
        .map(|(name, value)| StateOutcome::parse(minion, name, value))
        .collect::<Result<Vec<_>>>()?;
    outcomes.sort_by(StateOutcome::run_order);
    Ok(outcomes)
}

// ─── Reduction ────────────────────────────────────────────────────────────

fn reduce(minion: &str, shape: EntryShape<'_>) -> Result<Tick<Verdict>> {
    let (units, retcode, success) = match shape {
        EntryShape::Pending(why) => return Ok(Tick::Pending(why.to_string())),
        EntryShape::Offline => return Err(ConvergeError::AgentUnavailable(minion.to_string())),
        EntryShape::Units(units) => (units, None, None),
        EntryShape::Wrapped {
            units,
            retcode,
            success,
        } => (units, retcode, success),
    };

    if units.is_empty() {
        return Err(ConvergeError::shape(minion, "minion reported no state units"));
    }

    let reasons: Vec<String> = state_outcomes(minion, units)?
        .iter()
        .filter(|o| o.is_failed())
        .map(|o| o.diagnostic(minion))
        .collect();

    if reasons.is_empty() {
        if retcode.is_some_and(|c| c != 0) || success == Some(false) {
            warn!(
                minion,
                ?retcode,
                ?success,
                "job reported failure but every state unit succeeded"
            );
        }
        Ok(Tick::Ready(Verdict::Success))
    } else {
        Ok(Tick::Ready(Verdict::Failure { reasons }))
    }
}

/// The payload as a mapping keyed by minion id. A one-element list holding
/// that mapping (the raw `return` envelope) is accepted as well.
fn minion_map<'a>(minion: &str, payload: &'a Value) -> Result<&'a Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        Value::Array(items) => match items.as_slice() {
            [Value::Object(map)] => Ok(map),
            _ => Err(ConvergeError::shape(
                minion,
                format!("payload is {}, expected one mapping keyed by minion id", describe(payload)),
            )),
        },
        other => Err(ConvergeError::shape(
            minion,
            format!("payload is {}, expected a mapping keyed by minion id", describe(other)),
        )),
    }
}

/// Classify a finished result payload.
///
/// Entries for other minions are ignored. A payload with no entry for
/// `minion`, or whose entry is not a finished result, is a shape error. A
/// `false` entry means the minion did not answer and yields
/// [`ConvergeError::AgentUnavailable`].
pub fn classify(minion: &str, payload: &Value) -> Result<Verdict> {
    let entry = minion_map(minion, payload)?
        .get(minion)
        .ok_or_else(|| ConvergeError::shape(minion, "no result reported for minion"))?;

    match reduce(minion, decode_entry(minion, entry)?)? {
        Tick::Ready(verdict) => Ok(verdict),
        Tick::Pending(why) => Err(ConvergeError::shape(
            minion,
            format!("result is not complete ({why})"),
        )),
    }
}

/// Like [`classify`], but for a payload fetched while the job may still be
/// running: a missing or incomplete entry, or a minion that has not
/// answered yet, is [`Tick::Pending`].
pub(crate) fn poll_verdict(minion: &str, payload: &Value) -> Result<Tick<Verdict>> {
    let Some(entry) = minion_map(minion, payload)?.get(minion) else {
        return Ok(Tick::Pending("minion has not reported yet".into()));
    };

    match reduce(minion, decode_entry(minion, entry)?) {
        Err(ConvergeError::AgentUnavailable(_)) => {
            Ok(Tick::Pending("minion did not return".into()))
        }
        other => other,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
