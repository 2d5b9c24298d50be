//! HTTP client for Ollama and OpenAI-compatible chat APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{LlmConfig, LlmProvider};
use super::{ChatMessage, CompletionRequest, LlmError, TextGenerator};
use crate::rate_limit::{backoff_delay, parse_retry_after};

/// LLM client for chat completions.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

/// Ollama chat request format.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

/// OpenAI-compatible chat request format.
#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn call_ollama(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = OllamaChatRequest {
            model: &self.config.model,
            messages: &request.messages,
            stream: false,
            format: request.json_output.then_some("json"),
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/chat", self.config.endpoint);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let parsed: OllamaChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(parsed.message.content)
    }

    async fn call_openai(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            LlmError::Api("API key not set. Set LLM_API_KEY, OPENAI_API_KEY or GROQ_API_KEY".to_string())
        })?;

        let body = OpenAiChatRequest {
            model: &self.config.model,
            messages: &request.messages,
            max_tokens: self.config.max_tokens,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };
        let url = format!("{}/v1/chat/completions", self.config.endpoint);

        // Retry loop with exponential backoff on 429
        let mut attempt = 0;
        loop {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| LlmError::Connection(e.to_string()))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.config.max_retries {
                    return Err(LlmError::RateLimited);
                }
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok());
                let wait = parse_retry_after(retry_after).unwrap_or_else(|| backoff_delay(attempt, 1000));
                warn!(
                    "{} rate limited (attempt {}), waiting {:?}",
                    self.config.provider_name(),
                    attempt + 1,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
            }

            let parsed: OpenAiChatResponse = resp
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;

            if let Some(error) = parsed.error {
                return Err(LlmError::Api(error.message));
            }

            return parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| LlmError::Parse("Response had no choices".to_string()));
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        debug!(
            "Requesting completion from {} ({} messages, json: {})",
            self.config.provider_name(),
            request.messages.len(),
            request.json_output
        );

        let text = match self.config.provider {
            LlmProvider::Ollama => self.call_ollama(&request).await?,
            LlmProvider::OpenAI => self.call_openai(&request).await?,
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::Parse("Empty completion".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_port_config() -> LlmConfig {
        let mut config = LlmConfig::base_default().with_endpoint("http://127.0.0.1:9");
        config.timeout_secs = 2;
        config
    }

    #[tokio::test]
    async fn test_disabled_client_refuses() {
        let mut config = closed_port_config();
        config.enabled = false;
        let client = LlmClient::new(config).unwrap();
        let result = client.complete(CompletionRequest::new("s", "u")).await;
        assert!(matches!(result, Err(LlmError::Disabled)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let client = LlmClient::new(closed_port_config()).unwrap();
        let result = client.complete(CompletionRequest::new("s", "u")).await;
        assert!(matches!(result, Err(LlmError::Connection(_))));
    }

    #[tokio::test]
    async fn test_openai_requires_key() {
        let mut config = closed_port_config();
        config.provider = LlmProvider::OpenAI;
        config.api_key = None;
        let client = LlmClient::new(config).unwrap();
        let result = client.complete(CompletionRequest::new("s", "u")).await;
        assert!(matches!(result, Err(LlmError::Api(_))));
    }

    #[test]
    fn test_openai_request_shape() {
        let messages = vec![ChatMessage::user("hi")];
        let body = OpenAiChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.2,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["response_format"]["type"], "json_object");
    }
}
