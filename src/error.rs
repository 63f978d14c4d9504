use thiserror::Error;

use crate::session::model::SessionStatus;

/// Transport-level failures from the text-generation provider.
///
/// These are transient: the caller may retry, this crate never does.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Provider request timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Domain errors for the interview-session core.
///
/// Everything here is recoverable at the call boundary. The state-machine
/// violations (`InvalidIndex`, `AlreadyAnswered`, `NotReadyForEvaluation`)
/// are deterministic, never transient. `Provider` means the provider was
/// unreachable; `InvalidOutput` means it answered with garbage. The two are
/// kept distinct so operators can tell them apart.
#[derive(Debug, Clone, Error)]
pub enum InterviewError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Interview session not found")]
    NotFound,

    #[error("Invalid question index {index}: session has {len} questions")]
    InvalidIndex { index: usize, len: usize },

    #[error("Question {index} is already answered")]
    AlreadyAnswered { index: usize },

    #[error("Interview session is not ready for evaluation (status: {status})")]
    NotReadyForEvaluation { status: SessionStatus },

    #[error("AI provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("AI returned a response in an invalid format: {0}")]
    InvalidOutput(String),
}

pub type InterviewResult<T> = Result<T, InterviewError>;
