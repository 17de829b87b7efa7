//! Text-completion collaborator
//!
//! Used twice by the bot orchestrator: keyword rewriting and the final
//! recommendation call. The model is an opaque text-in/text-out function
//! with a timeout; upstream failures surface as `UpstreamUnavailable` with
//! the details kept in the log.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::shared::{CoreError, Result};

/// Opaque text-completion model
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions implementation
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                warn!("failed to build completion http client: {e}");
                CoreError::UpstreamUnavailable("text completion unavailable")
            })?;
        Ok(Self {
            http,
            api_key,
            model,
            endpoint: OPENAI_CHAT_URL.to_string(),
        })
    }

    /// Point the client somewhere else, used by tests with a local server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl TextCompletion for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("completion request failed: {e}");
                CoreError::UpstreamUnavailable("text completion failed")
            })?;

        if !response.status().is_success() {
            warn!("completion returned status {}", response.status());
            return Err(CoreError::UpstreamUnavailable("text completion failed"));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            warn!("completion returned malformed body: {e}");
            CoreError::UpstreamUnavailable("text completion failed")
        })?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                warn!("completion returned no choices");
                CoreError::UpstreamUnavailable("text completion failed")
            })
    }
}
