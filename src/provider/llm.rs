use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::CommonConfig;
use crate::error::ProviderResult;

/// Port to the external text-generation service.
///
/// A single method: prompt in, raw text out. The response is free text and
/// is not guaranteed to be valid JSON; callers run it through the response
/// parser. One call means one attempt, retries are the caller's problem.
#[mockall::automock]
#[async_trait]
pub trait ProviderLLM: Send + Sync {
    async fn send_message(
        &self,
        prompt: &str,
        config: &CommonConfig,
    ) -> ProviderResult<LLMResponse>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub metadata: ResponseMetadata,
}

impl LLMResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: ResponseMetadata {
                model: model.into(),
                created_at: Utc::now(),
                token_usage: None,
                finish_reason: None,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseMetadata {
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub token_usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// (prompt tokens, completion tokens)
pub type TokenUsage = (usize, usize);
