//! Output contract sent to the generative service
//!
//! The schema mirrors what `negotiation::parser` validates: an object with a
//! boolean `isAsking`, a nullable `roadmap` and a nullable `question`. JSON
//! schema cannot express "exactly one of roadmap/question depending on
//! isAsking", so that rule lives in the instructions and in the parser.

use serde_json::{json, Value};

/// Named JSON schema descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

/// Schema of a negotiation turn answer
pub fn negotiation_schema() -> OutputSchema {
    let step = json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "description": { "type": "string" }
        },
        "required": ["name", "description"],
        "additionalProperties": false
    });

    let roadmap = json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "description": { "type": "string" },
            "steps": { "type": "array", "items": step }
        },
        "required": ["name", "description", "steps"],
        "additionalProperties": false
    });

    OutputSchema {
        name: "roadmap_negotiation".to_string(),
        schema: json!({
            "type": "object",
            "properties": {
                "isAsking": { "type": "boolean" },
                "roadmap": { "anyOf": [roadmap, { "type": "null" }] },
                "question": { "type": ["string", "null"] }
            },
            "required": ["isAsking", "roadmap", "question"],
            "additionalProperties": false
        }),
    }
}
