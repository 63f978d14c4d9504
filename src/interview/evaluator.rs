use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::InterviewConfig;
use crate::error::{InterviewError, InterviewResult, ProviderError};
use crate::provider::llm::ProviderLLM;
use crate::provider::parser::extract_json;
use crate::session::model::{ExperienceLevel, Feedback, QuestionAnswer, QuestionFeedback};

/// Q&A pairs plus context, extracted from a session for evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationInput {
    pub topic: String,
    pub experience_level: ExperienceLevel,
    pub questions: Vec<QuestionAnswer>,
}

/// Keys the provider must return. `detailedFeedback` is allowed to be
/// absent; the rest are required and non-null.
const REQUIRED_KEYS: [&str; 4] = [
    "overallScore",
    "strengths",
    "improvements",
    "questionFeedback",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackPayload {
    overall_score: f64,
    strengths: Vec<String>,
    improvements: Vec<String>,
    #[serde(default)]
    detailed_feedback: String,
    question_feedback: Vec<QuestionFeedback>,
}

/// Builds the evaluation prompt from a session's Q&A pairs, calls the
/// provider once, and shape-validates the feedback object.
///
/// Numeric ranges are NOT re-validated here: `overallScore` and
/// per-question scores are stored as the provider returned them and are
/// advisory until a consumer bounds-checks them. Stateless with respect to
/// the session.
pub struct EvaluationEngine {
    llm: Arc<dyn ProviderLLM>,
    config: InterviewConfig,
}

impl EvaluationEngine {
    pub fn new(llm: Arc<dyn ProviderLLM>, config: InterviewConfig) -> Self {
        Self { llm, config }
    }

    #[tracing::instrument(skip(self, input), fields(topic = %input.topic))]
    pub async fn evaluate(&self, input: &EvaluationInput) -> InterviewResult<Feedback> {
        let prompt = self.build_prompt(input);
        debug!(prompt = %prompt, "evaluation prompt");

        let response = tokio::time::timeout(
            Duration::from_secs(self.config.request_timeout_secs),
            self.llm.send_message(&prompt, &self.config.common),
        )
        .await
        .map_err(|_| ProviderError::Timeout(self.config.request_timeout_secs))??;

        debug!(raw = %response.content, "raw provider response");

        let value = extract_json(&response.content)
            .map_err(|e| InterviewError::InvalidOutput(e.to_string()))?;
        let payload = feedback_payload(value)?;

        Ok(Feedback {
            overall_score: payload.overall_score,
            strengths: payload.strengths,
            improvements: payload.improvements,
            detailed_feedback: payload.detailed_feedback,
            question_feedback: payload.question_feedback,
            generated_at: Utc::now(),
        })
    }

    fn build_prompt(&self, input: &EvaluationInput) -> String {
        let mut pairs = String::new();
        for (index, qa) in input.questions.iter().enumerate() {
            // An unanswered question is rendered explicitly; omitting it
            // would bias the evaluation toward the answered subset.
            let answer = if qa.is_answered() {
                qa.answer.as_str()
            } else {
                "No answer provided"
            };
            let _ = write!(
                pairs,
                "Question {n}: {question}\nAnswer: {answer}\n\n",
                n = index + 1,
                question = qa.question,
            );
        }

        format!(
            "You are an expert technical interviewer evaluating an interview session. Please provide a comprehensive evaluation based on the following:\n\
             \n\
             Topic: {topic}\n\
             Experience Level: {level}\n\
             \n\
             Questions and Answers:\n\
             {pairs}\
             Please provide your evaluation in the following JSON format ONLY. Do not include any other text, formatting, or markdown.\n\
             {{\n\
             \x20 \"overallScore\": <number between 0-100>,\n\
             \x20 \"strengths\": [\"strength1\", \"strength2\"],\n\
             \x20 \"improvements\": [\"improvement1\", \"improvement2\"],\n\
             \x20 \"detailedFeedback\": \"Detailed paragraph explaining the overall performance.\",\n\
             \x20 \"questionFeedback\": [\n\
             \x20   {{\n\
             \x20     \"questionIndex\": 0,\n\
             \x20     \"score\": <number between 0-10>,\n\
             \x20     \"feedback\": \"Specific feedback for this question.\"\n\
             \x20   }}\n\
             \x20 ]\n\
             }}\n\
             \n\
             Evaluation Criteria:\n\
             - Technical accuracy and depth of knowledge.\n\
             - Clarity and structure of the communication.\n\
             - Problem-solving approach.\n\
             - Relevance of the answer to the experience level.",
            topic = input.topic,
            level = input.experience_level,
        )
    }
}

fn feedback_payload(value: Value) -> InterviewResult<FeedbackPayload> {
    let object = value.as_object().ok_or_else(|| {
        InterviewError::InvalidOutput("expected a JSON evaluation object".to_string())
    })?;
    for key in REQUIRED_KEYS {
        if object.get(key).map_or(true, Value::is_null) {
            return Err(InterviewError::InvalidOutput(format!(
                "evaluation is missing required field `{key}`"
            )));
        }
    }
    serde_json::from_value(value).map_err(|e| InterviewError::InvalidOutput(e.to_string()))
}
