//! Action protocol: the single JSON object the model proposes each step.
//!
//! Replies are free text. The parser pulls the span between the first `{`
//! and the last `}` and decodes it, so prose around the payload is tolerated.
//! Field validation is left to the executor; the parser only classifies the
//! `action` discriminator and reads the string fields.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Kind of step the model asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Run,
    Read,
    Write,
    Done,
    /// Anything else, keeping the raw value for feedback.
    Unknown(String),
}

impl ActionKind {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(name)) => match name.as_str() {
                "run" => Self::Run,
                "read" => Self::Read,
                "write" => Self::Write,
                "done" => Self::Done,
                other => Self::Unknown(other.to_string()),
            },
            Some(other) => Self::Unknown(other.to_string()),
            None => Self::Unknown("null".to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Run => "run",
            Self::Read => "read",
            Self::Write => "write",
            Self::Done => "done",
            Self::Unknown(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed result of one assistant turn.
///
/// Only the fields relevant to `action` are meaningful. Missing or
/// non-string fields read as empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionProposal {
    pub action: ActionKind,
    pub command: String,
    pub path: String,
    pub content: String,
    pub rationale: String,
}

impl ActionProposal {
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            command: String::new(),
            path: String::new(),
            content: String::new(),
            rationale: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Return the slice from the first `{` to the last `}`, inclusive.
///
/// Known failure modes, all surfacing later as invalid JSON:
/// - two separate objects produce one span covering both;
/// - a stray `{` in the prose before the payload moves the start too early;
/// - a stray `}` in the prose after the payload moves the end too late.
///
/// Returns `None` when either brace is missing or the last `}` precedes the
/// first `{`.
pub fn extract_json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse a model reply into an [`ActionProposal`].
pub fn parse_action(raw: &str) -> Result<ActionProposal, ParseError> {
    let span = extract_json_span(raw).ok_or(ParseError::NoObject)?;
    let fields: Map<String, Value> = serde_json::from_str(span)?;

    Ok(ActionProposal {
        action: ActionKind::from_value(fields.get("action")),
        command: string_field(&fields, "command"),
        path: string_field(&fields, "path"),
        content: string_field(&fields, "content"),
        rationale: string_field(&fields, "rationale"),
    })
}

fn string_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
