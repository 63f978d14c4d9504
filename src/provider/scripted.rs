use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::config::CommonConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::llm::{LLMResponse, ProviderLLM};

type Pattern = String;
type Reply = String;

/// Prompt-pattern to canned-reply table.
pub type ScriptBook = DashMap<Pattern, Reply>;

/// Provider that answers from a fixed script. Used in tests and offline
/// runs: a prompt is matched against the registered patterns and the first
/// matching reply is returned verbatim.
pub struct ScriptedProviderLLM {
    name: String,
    script: Arc<ScriptBook>,
}

impl ScriptedProviderLLM {
    pub fn new(name: impl Into<String>, script: Arc<ScriptBook>) -> Self {
        Self {
            name: name.into(),
            script,
        }
    }
}

#[async_trait]
impl ProviderLLM for ScriptedProviderLLM {
    async fn send_message(
        &self,
        prompt: &str,
        config: &CommonConfig,
    ) -> ProviderResult<LLMResponse> {
        let replies: Vec<String> = self
            .script
            .iter()
            .filter(|entry| prompt.contains(entry.key()))
            .map(|entry| entry.value().clone())
            .collect();
        if replies.is_empty() {
            return Err(ProviderError::ApiError(
                "No scripted reply matches prompt".to_string(),
            ));
        }
        debug!(reply = %replies[0], "scripted reply");
        Ok(LLMResponse::new(replies[0].clone(), config.model.clone()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
