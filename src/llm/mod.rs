//! Generative text service integration.
//!
//! Analyzers and services talk to the model through [`TextGenerator`] so the
//! backend can be swapped (Ollama, OpenAI-compatible APIs) or scripted in tests.

mod client;
mod config;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};

/// Shared handle to a text generator.
pub type SharedGenerator = Arc<dyn TextGenerator>;

/// Errors that can occur during LLM operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// Failed to connect to LLM service
    #[error("Connection error: {0}")]
    Connection(String),
    /// API returned an error
    #[error("API error: {0}")]
    Api(String),
    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),
    /// Provider kept returning 429
    #[error("Rate limited by LLM provider")]
    RateLimited,
    /// LLM is disabled
    #[error("LLM is disabled")]
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single completion call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the configured temperature.
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON object response.
    pub json_output: bool,
}

impl CompletionRequest {
    /// System instruction plus one user message.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: None,
            json_output: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Chat-style text completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Run a JSON completion and deserialize the reply.
pub async fn complete_json<T: DeserializeOwned>(
    generator: &dyn TextGenerator,
    request: CompletionRequest,
) -> Result<T, LlmError> {
    let raw = generator.complete(request.json()).await?;
    let body = strip_code_fences(&raw);
    serde_json::from_str(body).map_err(|e| LlmError::Parse(format!("{}: {}", e, truncate(body, 200))))
}

/// Strip markdown code fences some models wrap around JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generator for tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with the first scripted response whose needle appears in the
    /// request text; errors when nothing matches.
    #[derive(Default)]
    pub struct ScriptedGenerator {
        rules: Vec<(String, String)>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        /// A generator that fails every request.
        pub fn failing() -> Arc<Self> {
            Arc::new(Self::new())
        }

        pub fn on(mut self, needle: &str, response: &str) -> Self {
            self.rules.push((needle.to_string(), response.to_string()));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text: String = request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.rules
                .iter()
                .find(|(needle, _)| text.contains(needle.as_str()))
                .map(|(_, response)| response.clone())
                .ok_or_else(|| LlmError::Connection("no scripted response".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedGenerator;
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_complete_json_parses_fenced_reply() {
        let generator = ScriptedGenerator::new().on("numbers", "```json\n[1, 2, 3]\n```");
        let values: Vec<i32> =
            complete_json(&generator, CompletionRequest::new("sys", "give me numbers"))
                .await
                .unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_complete_json_reports_garbage() {
        let generator = ScriptedGenerator::new().on("numbers", "sure! here you go");
        let result: Result<Vec<i32>, _> =
            complete_json(&generator, CompletionRequest::new("sys", "numbers")).await;
        assert!(matches!(result, Err(LlmError::Parse(_))));
    }

    #[tokio::test]
    async fn test_scripted_generator_fails_without_match() {
        let generator = ScriptedGenerator::failing();
        assert!(generator
            .complete(CompletionRequest::new("a", "b"))
            .await
            .is_err());
        assert_eq!(generator.calls(), 1);
    }
}
