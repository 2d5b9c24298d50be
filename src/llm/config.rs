//! Generative text service configuration.

use serde::{Deserialize, Serialize};

/// Wire format spoken by the completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat API
    OpenAI,
}

/// Hosted service with known endpoint, model and key variable.
struct HostedPreset {
    name: &'static str,
    label: &'static str,
    endpoint: &'static str,
    model: &'static str,
    key_var: &'static str,
}

/// Checked in order when auto-detecting from API keys.
const HOSTED: &[HostedPreset] = &[
    HostedPreset {
        name: "groq",
        label: "Groq",
        endpoint: "https://api.groq.com/openai",
        model: "llama-3.1-8b-instant",
        key_var: "GROQ_API_KEY",
    },
    HostedPreset {
        name: "openai",
        label: "OpenAI",
        endpoint: "https://api.openai.com",
        model: "gpt-4o-mini",
        key_var: "OPENAI_API_KEY",
    },
    HostedPreset {
        name: "together",
        label: "Together",
        endpoint: "https://api.together.xyz",
        model: "meta-llama/Meta-Llama-3.1-8B-Instruct-Turbo",
        key_var: "TOGETHER_API_KEY",
    },
];

fn hosted(name: &str) -> Option<&'static HostedPreset> {
    HOSTED.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

impl LlmProvider {
    /// Accepts the wire format or a hosted service name.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("ollama") {
            Some(Self::Ollama)
        } else {
            hosted(s).map(|_| Self::OpenAI)
        }
    }
}

/// Completion service settings. Generative features degrade to local
/// fallbacks when disabled or unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    /// Overridable per request.
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Retries on 429 before giving up.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

impl LlmConfig {
    /// Local Ollama defaults, ignoring the environment.
    pub(crate) fn base_default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::Ollama,
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            model: "llama3.1:8b".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
        }
    }

    fn use_hosted(&mut self, preset: &HostedPreset) {
        self.provider = LlmProvider::OpenAI;
        self.endpoint = preset.endpoint.to_string();
        self.model = preset.model.to_string();
        if self.api_key.is_none() {
            self.api_key = std::env::var(preset.key_var).ok();
        }
    }

    /// Apply environment variable overrides.
    ///
    /// - `LLM_ENABLED`: "true"/"1" or anything else for off
    /// - `LLM_PROVIDER`: "ollama", "openai", "groq" or "together"
    /// - `LLM_API_KEY`, `LLM_ENDPOINT`, `LLM_MODEL`, `LLM_MAX_TOKENS`,
    ///   `LLM_TEMPERATURE`
    ///
    /// Without `LLM_PROVIDER` the first hosted key found (`GROQ_API_KEY`,
    /// `OPENAI_API_KEY`, `TOGETHER_API_KEY`) selects its service. Explicit
    /// endpoint and model variables always win over presets.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.api_key = Some(key);
        }

        match std::env::var("LLM_PROVIDER") {
            Ok(name) => {
                if let Some(preset) = hosted(&name) {
                    self.use_hosted(preset);
                } else if let Some(provider) = LlmProvider::parse(&name) {
                    self.provider = provider;
                }
            }
            Err(_) if self.api_key.is_none() => {
                if let Some(preset) = HOSTED
                    .iter()
                    .find(|p| std::env::var(p.key_var).is_ok())
                {
                    self.use_hosted(preset);
                }
            }
            Err(_) => {}
        }

        if let Ok(endpoint) = std::env::var("LLM_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.model = model;
        }
        if let Some(n) = env_parse("LLM_MAX_TOKENS") {
            self.max_tokens = n;
        }
        if let Some(t) = env_parse("LLM_TEMPERATURE") {
            self.temperature = t;
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Service name for log output.
    pub fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::Ollama => "Ollama",
            LlmProvider::OpenAI => HOSTED
                .iter()
                .find(|p| self.endpoint.contains(p.name))
                .map(|p| p.label)
                .unwrap_or("OpenAI-compatible"),
        }
    }
}
