//! Waymark SDK
//!
//! Shared types and the error taxonomy of the Waymark negotiation engine.
//! This crate is used by the engine and by whatever API layer fronts it.

/// Error types and handling
pub mod errors;

/// Conversation and roadmap types
pub mod types;

// Re-export commonly used types
pub use errors::{ErrorClass, NegotiationError, WaymarkErrorExt};
pub use types::{
    Author, CorrelationId, HistoryEntry, NegotiationReply, NegotiationResult, PersistedRoadmap,
    PersistedStep, RoadmapSnapshot, StepDraft,
};
