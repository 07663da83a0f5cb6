//! Core type definitions for the Relay pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::{RelayError, Result};

/// Digest of a remote resource's bytes.
///
/// Two equal fingerprints mean (with overwhelming probability) equal content.
/// A missing resource has no fingerprint at all and is represented as
/// `Option::<Fingerprint>::None` by callers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a byte buffer
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, enough for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A controller program to run, plus any extra parameters the completion
/// service attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Program file name (e.g. `forward.urp`) or absolute program path
    pub program: String,

    /// Everything else the completion service put in the object
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Action {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            params: Map::new(),
        }
    }

    /// Build an action from a JSON object.
    ///
    /// Returns `None` when the value is not an object or has no string
    /// `program` field.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };
        let program = match map.remove("program")? {
            Value::String(program) if !program.trim().is_empty() => program,
            _ => return None,
        };
        Some(Self {
            program,
            params: map,
        })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)
    }
}

/// Free-text instruction pulled out of the watched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction(String);

impl Instruction {
    /// Extract the instruction from watched file content.
    ///
    /// The content must be a JSON object with a non-empty string `text` field.
    pub fn from_content(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                RelayError::Schema("no \"text\" instruction found in resource".to_string())
            })?;
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal result of running one action on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Program loaded, played and ran to completion
    Completed,
    /// Controller could not find or load the program
    SkippedNotFound,
    /// Program loaded but refused to start
    SkippedPlayFailed,
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::SkippedNotFound => write!(f, "skipped (not found)"),
            Self::SkippedPlayFailed => write!(f, "skipped (play failed)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_equality_tracks_content() {
        let a = Fingerprint::of(b"{\"text\":\"go\"}");
        let b = Fingerprint::of(b"{\"text\":\"go\"}");
        let c = Fingerprint::of(b"{\"text\":\"stop\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn test_action_keeps_extra_params() {
        let action = Action::from_value(json!({"program": "wave.urp", "speed": 0.5})).unwrap();
        assert_eq!(action.program, "wave.urp");
        assert_eq!(action.params.get("speed"), Some(&json!(0.5)));

        let round: Value = serde_json::to_value(&action).unwrap();
        assert_eq!(round, json!({"program": "wave.urp", "speed": 0.5}));
    }

    #[test]
    fn test_action_requires_program() {
        assert!(Action::from_value(json!({"speed": 1})).is_none());
        assert!(Action::from_value(json!({"program": 3})).is_none());
        assert!(Action::from_value(json!({"program": "  "})).is_none());
        assert!(Action::from_value(json!("forward.urp")).is_none());
    }

    #[test]
    fn test_instruction_from_content() {
        let instruction = Instruction::from_content(r#"{"text": "move forward"}"#).unwrap();
        assert_eq!(instruction.as_str(), "move forward");
    }

    #[test]
    fn test_instruction_rejects_bad_content() {
        assert!(matches!(
            Instruction::from_content("not json"),
            Err(RelayError::Serialization(_))
        ));
        assert!(matches!(
            Instruction::from_content(r#"{"note": "hi"}"#),
            Err(RelayError::Schema(_))
        ));
        assert!(matches!(
            Instruction::from_content(r#"{"text": ""}"#),
            Err(RelayError::Schema(_))
        ));
        assert!(matches!(
            Instruction::from_content(r#"["text"]"#),
            Err(RelayError::Schema(_))
        ));
    }
}
