//! Request/response shapes at the call boundary. Transport mechanics are
//! not this crate's concern; the shapes are.

use serde::{Deserialize, Serialize};

use crate::session::model::{Difficulty, ExperienceLevel, SessionId};

/// Generate a new interview session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub topic: String,

    pub experience_level: ExperienceLevel,

    /// Defaults to medium.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,

    /// Defaults to 5; must be within 1..=20.
    #[serde(default)]
    pub number_of_questions: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub questions: Vec<String>,
    pub topic: String,
    pub experience_level: ExperienceLevel,
    pub difficulty: Difficulty,
    /// The count actually generated, which may differ from the request.
    pub number_of_questions: usize,
}

/// Submit the answer for one question slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub session_id: SessionId,
    pub question_index: usize,
    pub answer: String,
    /// Seconds spent on the question; defaults to 0.
    #[serde(default)]
    pub time_spent: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerResponse {
    pub session_id: SessionId,
    pub question_index: usize,
    pub completion_percentage: u8,
    pub is_completed: bool,
}
