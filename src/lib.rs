//! Interview practice sessions driven by an external text-generation
//! provider.
//!
//! A caller requests a set of questions for a topic, level and difficulty,
//! answers them one at a time, then receives a structured AI evaluation.
//! The crate guarantees structural validity of provider output and the
//! integrity of the session state machine under duplicate and concurrent
//! calls; it does not vouch for the semantic quality of AI-produced scores
//! and never retries a failed provider call on its own.

pub mod config;
pub mod error;
pub mod interview;
pub mod models;
pub mod provider;
pub mod session;

// Re-exports
pub use config::{CommonConfig, InterviewConfig, ProviderSecret};
pub use error::{InterviewError, InterviewResult, ProviderError, ProviderResult};
pub use interview::evaluator::{EvaluationEngine, EvaluationInput};
pub use interview::generator::{GeneratedQuestions, GenerationParams, QuestionGenerator};
pub use models::{
    CreateSessionRequest, CreateSessionResponse, SubmitAnswerRequest, SubmitAnswerResponse,
};
pub use provider::llm::{LLMResponse, ProviderLLM};
pub use provider::parser::extract_json;
pub use session::lifecycle::SessionLifecycle;
pub use session::model::{
    Difficulty, ExperienceLevel, Feedback, QuestionAnswer, QuestionFeedback, Session, SessionId,
    SessionStatus, UserId,
};
pub use session::store::{EvaluationClaim, InMemorySessionStore, SessionStore};
