//! OpenAI-compatible chat completion client.
//!
//! Works unmodified against OpenAI, Azure OpenAI, and any self-hosted
//! endpoint that speaks the `/chat/completions` wire format (including
//! Ollama's OpenAI-compatibility layer), which covers both values of
//! `LlmProvider`. A failed call never propagates — it degrades to an
//! `LlmCallOutcome` with `success: false`, since the calling agent is
//! itself a step that must never abort the pipeline on its own.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub struct LlmClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone)]
pub struct LlmCallOutcome {
    pub content: String,
    pub success: bool,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn chat(&self, model: &str, system_prompt: &str, user_prompt: &str, temperature: f64) -> LlmCallOutcome {
        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            messages.push(ChatMessage { role: "system".into(), content: system_prompt.into() });
        }
        messages.push(ChatMessage { role: "user".into(), content: user_prompt.into() });

        let request = ChatRequest { model: model.into(), messages, temperature };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(model, "llm request failed: {e}");
                return LlmCallOutcome { content: format!("LLM request failed: {e}"), success: false };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model, %status, "llm returned non-success status: {body}");
            return LlmCallOutcome { content: format!("LLM error {status}: {body}"), success: false };
        }

        let parsed: ChatResponse = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(model, "failed to parse llm response: {e}");
                return LlmCallOutcome { content: format!("Failed to parse LLM response: {e}"), success: false };
            }
        };

        match parsed.choices.into_iter().next() {
            Some(choice) => LlmCallOutcome { content: choice.message.content, success: true },
            None => LlmCallOutcome { content: "LLM response had no choices".into(), success: false },
        }
    }
}
