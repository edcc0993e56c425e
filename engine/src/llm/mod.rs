//! Generative Service Gateway Layer
//!
//! This module provides a common interface for sending a negotiation prompt to a
//! generative text service (OpenAI or a local Ollama). The `ModelGateway` trait
//! only moves text: it returns whatever the model wrote and classifies transport
//! and service failures. Checking that text against the output contract is the
//! job of `negotiation::parser`.

use async_trait::async_trait;
use sdk::errors::NegotiationError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod ollama;
pub mod openai;
pub mod schema;

pub use schema::OutputSchema;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur while talking to the generative service
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Malformed service response: {0}")]
    MalformedEnvelope(String),
}

impl From<LLMError> for NegotiationError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::MissingCredential(msg) => NegotiationError::Credential(msg),
            other => NegotiationError::Service(other.to_string()),
        }
    }
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message
    User,

    /// Assistant message
    Assistant,

    /// System message
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Everything a gateway sends for one turn, apart from the model id it owns
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Ordered conversation: instructions, history, then the new utterance
    pub messages: Vec<Message>,

    /// JSON schema the answer must follow
    pub schema: OutputSchema,
}

/// Gateway trait that all generative services must implement
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Returns the name of the provider (e.g., "openai", "ollama")
    fn name(&self) -> &str;

    /// Fixed model identifier sent with every request
    fn model(&self) -> &str;

    /// Returns true if this is a local provider that needs no credential
    fn is_local(&self) -> bool;

    /// Fails with `LLMError::MissingCredential` when the gateway cannot authenticate.
    ///
    /// Called before any network traffic. Default implementation accepts.
    fn check_credentials(&self) -> Result<()> {
        Ok(())
    }

    /// Send the request and return the raw text the model produced
    async fn query(&self, request: &GenerationRequest) -> Result<String>;
}

/// Map a transport failure from `reqwest` onto the gateway taxonomy
pub(crate) fn classify_transport_error(
    provider: &str,
    base_url: &str,
    e: reqwest::Error,
) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else if e.is_connect() {
        LLMError::ProviderUnavailable(format!("Cannot connect to {} at {}", provider, base_url))
    } else {
        LLMError::NetworkError(e.to_string())
    }
}

/// Map a non-success HTTP status onto the gateway taxonomy
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> LLMError {
    let body = crate::secrets::scrub_secrets(body);
    match status.as_u16() {
        401 | 403 => LLMError::AuthenticationFailed(body),
        429 => LLMError::RateLimitExceeded,
        400..=499 => LLMError::InvalidRequest(format!("{}: {}", status, body)),
        _ => LLMError::ProviderUnavailable(format!("{}: {}", status, body)),
    }
}
