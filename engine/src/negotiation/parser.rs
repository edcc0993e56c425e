//! Model output decoding and validation
//!
//! Models wrap their JSON in prose more often than one would like. Decoding
//! tries the trimmed text first and then, once, the slice from the first `{`
//! to the last `}`. Whatever decodes is then checked field by field; the
//! first offending field is reported by its path (`roadmap.steps[1].name`).

use sdk::errors::NegotiationError;
use sdk::types::{NegotiationResult, RoadmapSnapshot, StepDraft};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Why a model answer was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    /// No JSON object could be decoded, even from the braced slice
    #[error("Malformed model output: {0}")]
    Malformed(String),

    /// A JSON object decoded but broke the output contract
    #[error("Contract violation at '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },
}

impl ContractError {
    fn violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ContractError::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ContractError> for NegotiationError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Malformed(msg) => NegotiationError::Parse(msg),
            ContractError::SchemaViolation { field, reason } => {
                NegotiationError::SchemaViolation { field, reason }
            }
        }
    }
}

/// Decode and validate one raw model answer
pub fn parse(raw: &str) -> Result<NegotiationResult, ContractError> {
    let object = decode(raw)?;
    validate(&object)
}

fn decode(raw: &str) -> Result<Map<String, Value>, ContractError> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(object);
    }

    let slice = braced_slice(raw).ok_or_else(|| {
        ContractError::Malformed(format!("no JSON object in {} chars of output", raw.len()))
    })?;

    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Object(object)) => {
            warn!(
                "Recovered JSON object from surrounding text ({} of {} chars)",
                slice.len(),
                raw.len()
            );
            Ok(object)
        }
        Ok(_) => Err(ContractError::Malformed(
            "braced text is not a JSON object".to_string(),
        )),
        Err(e) => Err(ContractError::Malformed(e.to_string())),
    }
}

/// Text between the first `{` and the last `}`, both included
fn braced_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

fn validate(object: &Map<String, Value>) -> Result<NegotiationResult, ContractError> {
    let is_asking = match object.get("isAsking") {
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(ContractError::violation("isAsking", "must be a boolean")),
        None => return Err(ContractError::violation("isAsking", "is missing")),
    };

    let roadmap = nullable(object, "roadmap");
    let question = nullable(object, "question");

    if is_asking {
        let question = match question {
            Some(Value::String(q)) if !q.trim().is_empty() => q.clone(),
            Some(Value::String(_)) => {
                return Err(ContractError::violation("question", "must not be empty"))
            }
            Some(_) => return Err(ContractError::violation("question", "must be a string")),
            None => {
                return Err(ContractError::violation(
                    "question",
                    "is required when isAsking is true",
                ))
            }
        };
        if roadmap.is_some() {
            return Err(ContractError::violation(
                "roadmap",
                "must be null when isAsking is true",
            ));
        }
        debug!("Model is asking a clarifying question");
        Ok(NegotiationResult::Asking { question })
    } else {
        let roadmap = match roadmap {
            Some(Value::Object(r)) => validate_roadmap(r)?,
            Some(_) => return Err(ContractError::violation("roadmap", "must be an object")),
            None => {
                return Err(ContractError::violation(
                    "roadmap",
                    "is required when isAsking is false",
                ))
            }
        };
        if question.is_some() {
            return Err(ContractError::violation(
                "question",
                "must be null when isAsking is false",
            ));
        }
        debug!("Model finalized a roadmap with {} steps", roadmap.steps.len());
        Ok(NegotiationResult::Finalizing { roadmap })
    }
}

/// A missing key and an explicit `null` mean the same thing
fn nullable<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

fn validate_roadmap(roadmap: &Map<String, Value>) -> Result<RoadmapSnapshot, ContractError> {
    let name = required_name(roadmap, "roadmap.name")?;
    let description = required_string(roadmap, "description", "roadmap.description")?;

    let steps = match roadmap.get("steps") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| validate_step(i, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(ContractError::violation(
                "roadmap.steps",
                "must be an array",
            ))
        }
        None => return Err(ContractError::violation("roadmap.steps", "is missing")),
    };

    Ok(RoadmapSnapshot {
        name,
        description,
        steps,
    })
}

fn validate_step(index: usize, item: &Value) -> Result<StepDraft, ContractError> {
    let path = format!("roadmap.steps[{}]", index);
    let step = item
        .as_object()
        .ok_or_else(|| ContractError::violation(path.clone(), "must be an object"))?;

    let name = required_name(step, &format!("{}.name", path))?;
    let description = required_string(step, "description", &format!("{}.description", path))?;

    Ok(StepDraft { name, description })
}

fn required_name(object: &Map<String, Value>, path: &str) -> Result<String, ContractError> {
    let name = required_string(object, "name", path)?;
    if name.trim().is_empty() {
        return Err(ContractError::violation(path, "must not be empty"));
    }
    Ok(name)
}

fn required_string(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<String, ContractError> {
    match object.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ContractError::violation(path, "must be a string")),
        None => Err(ContractError::violation(path, "is missing")),
    }
}
