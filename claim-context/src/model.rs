use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::ClaimConfig;
use crate::error::{ClaimError, Result};
use crate::message::Message;

/// The chat/vision invocation capability: send an ordered list of messages,
/// get back whatever the backend answered.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse>;
}

/// The shapes a backend answer can take. [`crate::normalize`] turns any of
/// them into plain text.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    /// A decoded completion with a list of candidates.
    Completion(Completion),
    /// A backend that hands out the answer text directly.
    Text(String),
    /// An undecoded JSON body.
    Json(Value),
    /// Anything else, already rendered as a string.
    Other(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChoiceMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl fmt::Display for ModelResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion(completion) => match serde_json::to_string(completion) {
                Ok(rendered) => f.write_str(&rendered),
                Err(_) => write!(f, "{completion:?}"),
            },
            Self::Text(text) | Self::Other(text) => f.write_str(text),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    config: ClaimConfig,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(config: &ClaimConfig, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            config: config.clone(),
            model: model.into(),
        }
    }

    pub fn chat(config: &ClaimConfig) -> Self {
        Self::new(config, config.chat_model.clone())
    }

    pub fn vision(config: &ClaimConfig) -> Self {
        Self::new(config, config.vision_model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn payload(&self, messages: &[Message]) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(max_tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        payload
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn invoke(&self, messages: &[Message]) -> Result<ModelResponse> {
        // Checked before any network I/O so a missing key reads as a
        // configuration problem.
        let api_key = self.config.api_key()?;

        debug!(
            model = %self.model,
            messages = messages.len(),
            "Calling chat completions endpoint"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.payload(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClaimError::Model(format!(
                "LLM API request failed (status {status}): {body}"
            )));
        }

        let body: Value = response.json().await?;
        info!(model = %self.model, "Chat completion received");
        Ok(ModelResponse::Json(body))
    }
}
