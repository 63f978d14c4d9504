use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Generation parameters shared by every provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            model: default_model(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> usize {
    2000
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Configuration injected into the question generator and evaluation
/// engine at construction. There is no ambient global client state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    #[serde(default)]
    pub common: CommonConfig,
    /// Recorded into session metadata as provenance of the generation call.
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,
    /// Upper bound on a single provider call. Elapsing is reported as a
    /// provider error; there is no cancellation once a call is issued.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            common: CommonConfig::default(),
            prompt_version: default_prompt_version(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_prompt_version() -> String {
    "1.0".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

/// Provider credentials. Never serialized, never logged.
#[derive(Clone, Default)]
pub struct ProviderSecret {
    pub api_key: SecretString,
    pub additional_auth: HashMap<String, SecretString>,
}

impl ProviderSecret {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            additional_auth: HashMap::new(),
        }
    }
}
