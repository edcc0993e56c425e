//! Error types and handling
//!
//! This module provides the error taxonomy surfaced by the negotiation engine.
//! All errors implement the `WaymarkErrorExt` trait which provides user-friendly
//! hints, recoverability information and a coarse [`ErrorClass`] that an outer
//! API layer can map onto its own status codes.
//!
//! # Security
//!
//! Diagnostic text carried by `Service` errors is scrubbed by the engine before
//! it gets here; hints never echo the carried text back.

use thiserror::Error;

/// Trait for Waymark error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait WaymarkErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and does not contain
    /// secrets, raw model output or internal implementation details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around by the caller.
    /// Non-recoverable errors require an operator to change configuration.
    fn is_recoverable(&self) -> bool;

    /// Returns the coarse class of the error
    fn class(&self) -> ErrorClass;
}

/// Who has to act on an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Ask the user to rephrase or retry
    Retry,

    /// The request itself is wrong
    FixRequest,

    /// The system is misconfigured
    Misconfigured,

    /// Underlying storage failed
    Internal,
}

/// Negotiation error type
///
/// `Input`, `Credential` and `NotFound` are raised before any call to the
/// generative service. `Service`, `Parse` and `SchemaViolation` can only happen
/// after it. None of them are retried inside the engine.
///
/// # Examples
///
/// ```
/// use sdk::errors::{ErrorClass, NegotiationError, WaymarkErrorExt};
///
/// let error = NegotiationError::schema_violation("question", "must be a non-empty string");
/// assert_eq!(error.class(), ErrorClass::Retry);
/// assert!(error.is_recoverable());
///
/// let fatal_error = NegotiationError::Credential("OPENAI_API_KEY is not set".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum NegotiationError {
    // Request errors
    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Roadmap {0} not found")]
    NotFound(i64),

    // Configuration errors
    #[error("Credential unavailable: {0}")]
    Credential(String),

    // Generative service errors
    #[error("Generative service error: {0}")]
    Service(String),

    #[error("Response is not valid JSON: {0}")]
    Parse(String),

    #[error("Response violates the output contract at '{field}': {reason}")]
    SchemaViolation { field: String, reason: String },

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl NegotiationError {
    /// Build a `SchemaViolation` for the given field path
    pub fn schema_violation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Offending field for `SchemaViolation`, `None` otherwise
    pub fn offending_field(&self) -> Option<&str> {
        match self {
            Self::SchemaViolation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Short, stable identifier of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input_error",
            Self::NotFound(_) => "not_found",
            Self::Credential(_) => "credential_error",
            Self::Service(_) => "service_error",
            Self::Parse(_) => "parse_error",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl WaymarkErrorExt for NegotiationError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Input(_) => "Provide a non-empty message, roadmap and conversation",
            Self::NotFound(_) => "The roadmap does not exist. Check the roadmap id",
            Self::Credential(_) => {
                "The assistant is not configured. Set the generative service API key"
            }
            Self::Service(_) => "The assistant is unavailable right now. Try again",
            Self::Parse(_) | Self::SchemaViolation { .. } => {
                "The assistant gave an unexpected answer. Try rephrasing your request"
            }
            Self::Storage(_) => "Saving the conversation failed. Try again later",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Credential(_))
    }

    fn class(&self) -> ErrorClass {
        match self {
            Self::Parse(_) | Self::SchemaViolation { .. } | Self::Service(_) => ErrorClass::Retry,
            Self::Input(_) | Self::NotFound(_) => ErrorClass::FixRequest,
            Self::Credential(_) => ErrorClass::Misconfigured,
            Self::Storage(_) => ErrorClass::Internal,
        }
    }
}
