use super::{
    classify_status, classify_transport_error, GenerationRequest, LLMError, ModelGateway,
};
use crate::config::OpenAIConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Chat completions gateway using OpenAI structured outputs
pub struct OpenAIGateway {
    config: OpenAIConfig,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl OpenAIGateway {
    pub fn new(
        config: OpenAIConfig,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> super::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn payload(&self, request: &GenerationRequest) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        json!({
            "model": self.config.model,
            "messages": api_messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema.name,
                    "strict": true,
                    "schema": request.schema.schema,
                }
            }
        })
    }
}

#[async_trait]
impl ModelGateway for OpenAIGateway {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_local(&self) -> bool {
        false
    }

    fn check_credentials(&self) -> super::Result<()> {
        match &self.api_key {
            Some(_) => Ok(()),
            None => Err(LLMError::MissingCredential(format!(
                "no OpenAI API key in ${} or the system keychain",
                self.config.api_key_env
            ))),
        }
    }

    async fn query(&self, request: &GenerationRequest) -> super::Result<String> {
        self.check_credentials()?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| LLMError::MissingCredential(self.config.api_key_env.clone()))?;

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        tracing::debug!(
            "OpenAI request: model={}, messages={}",
            self.config.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.unsecure()))
            .header("Content-Type", "application/json")
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| classify_transport_error("OpenAI", &self.config.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LLMError::MalformedEnvelope(e.to_string()))?;

        let message = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| LLMError::MalformedEnvelope("No message in response".to_string()))?;

        // A refusal is still model text; the parser decides what it is worth
        message
            .get("content")
            .and_then(|c| c.as_str())
            .or_else(|| message.get("refusal").and_then(|r| r.as_str()))
            .map(str::to_string)
            .ok_or_else(|| LLMError::MalformedEnvelope("Empty content".to_string()))
    }
}
