//! Chat completion provider abstraction.
//!
//! Used by the question-answering feature and by optional similarity
//! preprocessing (running a session's text-transformation instruction).
//! The core clustering pipeline itself never requires a completion
//! provider.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::CompletionConfig;

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;

    /// Generate a completion for `prompt` with the given model.
    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(config: &CompletionConfig) -> Result<Box<dyn ChatCompletionProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiChatProvider::new(config))),
        "disabled" => Ok(Box::new(DisabledChatProvider)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

/// A no-op completion provider that always returns errors.
pub struct DisabledChatProvider;

#[async_trait]
impl ChatCompletionProvider for DisabledChatProvider {
    fn default_model(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _model: &str) -> Result<String> {
        bail!("Completion provider is disabled")
    }
}

/// Completion provider using the OpenAI chat API.
///
/// Calls `POST /v1/chat/completions`. Requires the `OPENAI_API_KEY`
/// environment variable.
pub struct OpenAiChatProvider {
    model: String,
    timeout: Duration,
}

impl OpenAiChatProvider {
    pub fn new(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl ChatCompletionProvider for OpenAiChatProvider {
    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI chat request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "OpenAI chat request failed (HTTP {}): {}",
                status,
                text.chars().take(300).collect::<String>()
            );
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("failed to parse OpenAI chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("OpenAI chat response contained no choices"))
    }
}
