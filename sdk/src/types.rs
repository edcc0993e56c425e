//! Conversation and roadmap types

use crate::errors::NegotiationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier grouping the turns of one conversation thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wrap an existing identifier. Empty or blank ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, NegotiationError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(NegotiationError::Input(
                "correlation id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Thread for editing one specific roadmap
    pub fn for_roadmap(roadmap_id: i64) -> Self {
        Self(format!("roadmap:{}", roadmap_id))
    }

    /// Thread for a user's general assistant conversation
    pub fn for_user(user_id: impl fmt::Display) -> Self {
        Self(format!("user:{}", user_id))
    }

    /// Fresh thread that is never reused
    pub fn new_thread() -> Self {
        Self(format!("thread:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = NegotiationError;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author of a history entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Author::User),
            "assistant" => Some(Author::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Position within the conversation, assigned by the store
    pub turn_index: i64,

    pub author: Author,

    pub text: String,

    /// Unix timestamp (seconds)
    pub created_at: i64,
}

/// A step as the model proposes it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepDraft {
    pub name: String,
    pub description: String,
}

impl StepDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Name, description and ordered steps of a roadmap, without identity or status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoadmapSnapshot {
    pub name: String,
    pub description: String,
    pub steps: Vec<StepDraft>,
}

/// Outcome of one validated model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationResult {
    /// The model needs more input from the user
    Asking { question: String },

    /// The model committed to a new roadmap
    Finalizing { roadmap: RoadmapSnapshot },
}

impl NegotiationResult {
    pub fn is_asking(&self) -> bool {
        matches!(self, NegotiationResult::Asking { .. })
    }
}

/// Caller-facing reply of a negotiation turn
///
/// Serializes as `{"isAsking": bool, "roadmap": object|null, "question": string|null}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationReply {
    pub is_asking: bool,
    pub roadmap: Option<RoadmapSnapshot>,
    pub question: Option<String>,
}

impl From<NegotiationResult> for NegotiationReply {
    fn from(result: NegotiationResult) -> Self {
        match result {
            NegotiationResult::Asking { question } => Self {
                is_asking: true,
                roadmap: None,
                question: Some(question),
            },
            NegotiationResult::Finalizing { roadmap } => Self {
                is_asking: false,
                roadmap: Some(roadmap),
                question: None,
            },
        }
    }
}

/// Durable roadmap as held by the roadmap store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedRoadmap {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,

    /// Ordered by `position`
    pub steps: Vec<PersistedStep>,
}

impl PersistedRoadmap {
    /// Project onto the shape exchanged with the model
    pub fn snapshot(&self) -> RoadmapSnapshot {
        RoadmapSnapshot {
            name: self.name.clone(),
            description: self.description.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| StepDraft::new(s.name.clone(), s.description.clone()))
                .collect(),
        }
    }
}

/// Durable roadmap step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedStep {
    pub id: i64,
    pub roadmap_id: i64,
    pub position: i64,
    pub name: String,
    pub description: String,
    pub completed: bool,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_rejects_blank() {
        assert!(CorrelationId::new("").is_err());
        assert!(CorrelationId::new("   ").is_err());
        assert_eq!(CorrelationId::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn test_correlation_id_deserialize_validates() {
        assert!(serde_json::from_str::<CorrelationId>("\"   \"").is_err());
        assert!(serde_json::from_str::<CorrelationId>("\"\"").is_err());

        let cid: CorrelationId = serde_json::from_str("\"user:1\"").unwrap();
        assert_eq!(cid.as_str(), "user:1");
        assert_eq!(serde_json::to_value(&cid).unwrap(), "user:1");
    }

    #[test]
    fn test_correlation_id_constructors() {
        assert_eq!(CorrelationId::for_roadmap(42).as_str(), "roadmap:42");
        assert_eq!(CorrelationId::for_user("u-7").as_str(), "user:u-7");

        let a = CorrelationId::new_thread();
        let b = CorrelationId::new_thread();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("thread:"));
    }

    #[test]
    fn test_reply_wire_shape() {
        let reply = NegotiationReply::from(NegotiationResult::Asking {
            question: "Remove step 2?".to_string(),
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["isAsking"], true);
        assert!(json["roadmap"].is_null());
        assert_eq!(json["question"], "Remove step 2?");

        let reply = NegotiationReply::from(NegotiationResult::Finalizing {
            roadmap: RoadmapSnapshot {
                name: "Move".to_string(),
                description: String::new(),
                steps: vec![StepDraft::new("Pack", "boxes")],
            },
        });
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["isAsking"], false);
        assert_eq!(json["roadmap"]["steps"][0]["name"], "Pack");
        assert!(json["question"].is_null());
    }

    #[test]
    fn test_snapshot_drops_step_metadata() {
        let roadmap = PersistedRoadmap {
            id: 1,
            name: "Move".to_string(),
            description: "d".to_string(),
            created_at: 0,
            updated_at: 0,
            steps: vec![PersistedStep {
                id: 10,
                roadmap_id: 1,
                position: 0,
                name: "Pack".to_string(),
                description: "boxes".to_string(),
                completed: true,
                completed_at: Some(5),
                created_at: 0,
            }],
        };

        let snapshot = roadmap.snapshot();
        assert_eq!(snapshot.steps, vec![StepDraft::new("Pack", "boxes")]);
    }
}
