use crate::message::Message;
use anyhow::{Context, Result};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything the model backend needs for one turn-based round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// Tool schemas in the chat projection.
    pub tools: Vec<Value>,
    /// Ask the backend to keep the completion for later inspection.
    pub store: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Message,
}

/// A generic client for interacting with an LLM.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Sends the full history and returns the assistant's reply, which may
    /// carry tool calls.
    async fn complete(&self, request: ChatRequest) -> Result<Message>;
}

/// An implementation of `LLMClient` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn complete(&self, request: ChatRequest) -> Result<Message> {
        let response: ChatCompletion = self
            .client
            .chat()
            .create_byot(&request)
            .await
            .context("Chat completion request failed")?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .context("No response choice from LLM")?;
        Ok(choice.message)
    }
}
