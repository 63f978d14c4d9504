use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
    Client,
};
use async_trait::async_trait;
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::{CommonConfig, ProviderSecret};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::llm::{LLMResponse, ProviderLLM, ResponseMetadata};

/// Chat-completion backed provider.
pub struct OpenAIChatProviderLLM {
    client: Client<OpenAIConfig>,
    name: String,
}

impl OpenAIChatProviderLLM {
    pub fn new(name: impl Into<String>, secret: &ProviderSecret) -> ProviderResult<Self> {
        let api_key = secret.api_key.expose_secret();
        if api_key.is_empty() {
            return Err(ProviderError::Configuration(
                "API key not specified".to_string(),
            ));
        }

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(org_id) = secret.additional_auth.get("organization_id") {
            openai_config = openai_config.with_org_id(org_id.expose_secret());
        }

        Ok(Self {
            client: Client::with_config(openai_config),
            name: name.into(),
        })
    }

    #[tracing::instrument(skip(self, prompt, config))]
    async fn chat_completion(
        &self,
        prompt: &str,
        config: &CommonConfig,
    ) -> ProviderResult<LLMResponse> {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            },
        )];

        let request = CreateChatCompletionRequest {
            model: config.model.clone(),
            messages,
            temperature: Some(config.temperature),
            max_completion_tokens: Some(config.max_tokens as u32),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| ProviderError::ApiError("No response content".into()))?;

        debug!(model = %config.model, "chat completion finished");

        Ok(LLMResponse {
            content,
            metadata: ResponseMetadata {
                model: config.model.clone(),
                created_at: Utc::now(),
                token_usage: response
                    .usage
                    .map(|u| (u.prompt_tokens as usize, u.completion_tokens as usize)),
                finish_reason: response
                    .choices
                    .first()
                    .map(|c| format!("{:?}", c.finish_reason)),
            },
        })
    }
}

#[async_trait]
impl ProviderLLM for OpenAIChatProviderLLM {
    async fn send_message(
        &self,
        prompt: &str,
        config: &CommonConfig,
    ) -> ProviderResult<LLMResponse> {
        self.chat_completion(prompt, config).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
