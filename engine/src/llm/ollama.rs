//! Ollama Gateway
//!
//! Sends negotiation prompts to a local Ollama server, typically at
//! http://localhost:11434. Ollama needs no credential and accepts a JSON schema
//! in the `format` field to constrain the answer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    classify_status, classify_transport_error, GenerationRequest, LLMError, Message,
    ModelGateway, Result,
};

/// Ollama gateway configuration
#[derive(Debug, Clone)]
pub struct OllamaGateway {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llama3.1:8b")
    model: String,

    /// HTTP client for API requests
    client: Client,
}

impl OllamaGateway {
    /// Create a new Ollama gateway
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Model name to use (e.g., "llama3.1:8b")
    /// * `timeout` - Upper bound for one request
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            client,
        })
    }

    /// Convert our Message format to Ollama's format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ModelGateway for OllamaGateway {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn query(&self, request: &GenerationRequest) -> Result<String> {
        let ollama_messages = self.convert_messages(&request.messages);

        tracing::debug!(
            "Ollama request: model={}, messages={}, total_chars={}",
            self.model,
            ollama_messages.len(),
            ollama_messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>()
        );

        let body = OllamaRequest {
            model: self.model.clone(),
            messages: ollama_messages,
            stream: false,
            format: request.schema.schema.clone(),
        };

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport_error("Ollama", &self.base_url, e))?;

        tracing::info!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            LLMError::MalformedEnvelope(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(ollama_response.message.content)
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    format: serde_json::Value,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
