//! Chat-completion client
//!
//! Used for shortening long advanced-search queries and for abstract summaries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::{http_client, transport_error};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;

const SERVICE: &str = "completion";

/// A single system + user exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Prompt reducing a long natural-language query to search keywords
pub fn shorten_query_prompt(query: &str) -> Prompt {
    Prompt {
        system: "You turn long research questions into a short search query. \
                 Reply with at most five keywords separated by spaces, in the language of the question, \
                 with no punctuation or explanation."
            .to_string(),
        user: query.to_string(),
        max_tokens: 32,
    }
}

/// Prompt producing a short Portuguese summary of an abstract
pub fn abstract_summary_prompt(abstract_text: &str) -> Prompt {
    Prompt {
        system: "Você é um assistente útil que gera resumos concisos e informativos de resumos \
                 acadêmicos em português. Se limite a 250 caracteres sempre."
            .to_string(),
        user: format!(
            "Por favor, forneça um resumo conciso em português do seguinte resumo de artigo acadêmico, \
             destacando os pontos principais e as principais conclusões:\n\n{}",
            abstract_text
        ),
        max_tokens: 300,
    }
}

/// Trait for chat completions
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run a prompt and return the trimmed reply text
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// OpenAI-compatible chat-completions client
pub struct OpenAiCompletion {
    config: LlmConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
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
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompletion {
    /// Create a new completion client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = http_client(config.timeout_secs, None)?;
        Ok(Self { config, client })
    }

    async fn call(&self, prompt: &Prompt) -> Result<String> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| AppError::Configuration {
            message: "llm.api_key is not set".to_string(),
        })?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            max_tokens: prompt.max_tokens,
            temperature: 0.2,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(SERVICE, format!("API error {}: {}", status, body)));
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::ExternalFormat {
            message: format!("Failed to parse completion response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AppError::ExternalFormat {
                message: "Completion response contained no text".to_string(),
            })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let start = Instant::now();
        let result = self.call(prompt).await;
        metrics::record_external(SERVICE, result.is_ok(), start.elapsed());

        match &result {
            Ok(text) => debug!(model = %self.config.model, chars = text.len(), "Completion received"),
            Err(e) => warn!(model = %self.config.model, error = %e, "Completion failed"),
        }
        result
    }
}

/// Deterministic completion for local development (`llm.api_key = "mock"`)
///
/// Replies with the first words of the user message, capped near the prompt's budget.
pub struct MockCompletion;

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let words = prompt.max_tokens.clamp(1, 40) as usize;
        let body = prompt.user.rsplit("\n\n").next().unwrap_or(&prompt.user);
        Ok(body.split_whitespace().take(words).collect::<Vec<_>>().join(" "))
    }
}
