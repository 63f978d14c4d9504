use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::InterviewConfig;
use crate::error::{InterviewError, InterviewResult, ProviderError};
use crate::provider::llm::ProviderLLM;
use crate::provider::parser::extract_json;
use crate::session::model::{Difficulty, ExperienceLevel, MAX_QUESTIONS, MIN_QUESTIONS};

/// Pre-validated input for a generation call.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub topic: String,
    pub experience_level: ExperienceLevel,
    pub difficulty: Difficulty,
    pub number_of_questions: usize,
}

#[derive(Debug, Clone)]
pub struct GeneratedQuestions {
    pub questions: Vec<String>,
    pub model: String,
    pub generation_time_ms: u64,
}

/// Builds the generation prompt, calls the provider once, and validates
/// the returned question array.
///
/// Count drift is tolerated: when the provider returns a different number
/// of questions than requested, the call proceeds with what came back (and
/// logs it), as long as the length still fits the 1..=20 session bound.
pub struct QuestionGenerator {
    llm: Arc<dyn ProviderLLM>,
    config: InterviewConfig,
}

impl QuestionGenerator {
    pub fn new(llm: Arc<dyn ProviderLLM>, config: InterviewConfig) -> Self {
        Self { llm, config }
    }

    #[tracing::instrument(skip(self, params), fields(topic = %params.topic))]
    pub async fn generate(&self, params: &GenerationParams) -> InterviewResult<GeneratedQuestions> {
        let prompt = self.build_prompt(params);
        debug!(prompt = %prompt, "generation prompt");

        let started = Instant::now();
        let response = tokio::time::timeout(
            Duration::from_secs(self.config.request_timeout_secs),
            self.llm.send_message(&prompt, &self.config.common),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.request_timeout_secs))??;
        let generation_time_ms = started.elapsed().as_millis() as u64;

        debug!(raw = %response.content, "raw provider response");

        let value = extract_json(&response.content)
            .map_err(|e| InterviewError::InvalidOutput(e.to_string()))?;
        let questions = question_array(value)?;

        if questions.len() != params.number_of_questions {
            warn!(
                requested = params.number_of_questions,
                returned = questions.len(),
                "provider returned a different question count; proceeding with what it returned"
            );
        }
        if questions.len() < MIN_QUESTIONS || questions.len() > MAX_QUESTIONS {
            return Err(InterviewError::InvalidOutput(format!(
                "provider returned {} questions, outside the allowed {}..={} range",
                questions.len(),
                MIN_QUESTIONS,
                MAX_QUESTIONS
            )));
        }

        let model = if response.metadata.model.is_empty() {
            self.config.common.model.clone()
        } else {
            response.metadata.model
        };

        Ok(GeneratedQuestions {
            questions,
            model,
            generation_time_ms,
        })
    }

    fn build_prompt(&self, params: &GenerationParams) -> String {
        format!(
            "You are an expert technical interviewer. Generate {count} interview questions for the following specifications:\n\
             \n\
             Topic: {topic}\n\
             Experience Level: {level}\n\
             Difficulty: {difficulty}\n\
             \n\
             Requirements:\n\
             - Questions should be appropriate for the specified experience level and difficulty.\n\
             - Include a mix of theoretical and practical questions.\n\
             - Questions should be clear and specific.\n\
             \n\
             Please return ONLY a JSON array of strings, where each string is a question. Do not include any other text, formatting, or markdown.\n\
             \n\
             Example format:\n\
             [\"Question 1 here\", \"Question 2 here\", \"Question 3 here\"]",
            count = params.number_of_questions,
            topic = params.topic,
            level = params.experience_level,
            difficulty = params.difficulty,
        )
    }
}

fn question_array(value: Value) -> InterviewResult<Vec<String>> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(InterviewError::InvalidOutput(format!(
                "expected a JSON array of questions, got {}",
                json_kind(&other)
            )))
        }
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(question) => Ok(question),
            other => Err(InterviewError::InvalidOutput(format!(
                "expected every question to be a string, got {}",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
