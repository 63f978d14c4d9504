use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InterviewError;

pub type SessionId = String;
pub type UserId = String;

pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 20;
pub const DEFAULT_QUESTION_COUNT: usize = 5;
pub const MAX_TOPIC_CHARS: usize = 200;
pub const MAX_ANSWER_CHARS: usize = 5000;

/// Session status. Ordered: a session only ever moves forward through
/// Created → InProgress → Completed → Evaluated.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SessionStatus {
    Created,
    InProgress,
    Completed,
    Evaluated,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// One question slot. The index within `Session::questions` is the stable
/// identifier used by every operation; slots are never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnswer {
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
    /// Seconds the candidate spent on this question.
    #[serde(default)]
    pub time_spent: u64,
}

impl QuestionAnswer {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: String::new(),
            answered_at: None,
            time_spent: 0,
        }
    }

    pub fn is_answered(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFeedback {
    pub question_index: usize,
    /// Advisory 0-10 score. Stored as returned by the provider, not
    /// bounds-checked here.
    pub score: f64,
    pub feedback: String,
}

/// Evaluation attached to a session exactly once. Immutable thereafter;
/// present if and only if the session is `Evaluated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Advisory 0-100 score, not bounds-checked here.
    pub overall_score: f64,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    #[serde(default)]
    pub detailed_feedback: String,
    pub question_feedback: Vec<QuestionFeedback>,
    pub generated_at: DateTime<Utc>,
}

/// Provenance of the generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub ai_model: String,
    pub prompt_version: String,
    pub generation_time_ms: u64,
}

/// Returned by [`Session::record_answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub completion_percentage: u8,
    pub is_completed: bool,
}

/// One interview-practice instance, owned by exactly one user.
///
/// The question list is fixed at creation. All mutation goes through
/// [`Session::record_answer`] and [`Session::apply_feedback`]; both are
/// pure transitions so the state machine is testable without a store, and
/// stores run them under their own atomicity guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub owner_id: UserId,
    pub topic: String,
    pub experience_level: ExperienceLevel,
    pub difficulty: Difficulty,
    pub number_of_questions: usize,
    pub questions: Vec<QuestionAnswer>,
    pub status: SessionStatus,
    #[serde(default)]
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,
    /// Sum of per-question time, recomputed on completion.
    #[serde(default)]
    pub total_time_spent: u64,
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        owner_id: UserId,
        topic: impl Into<String>,
        experience_level: ExperienceLevel,
        difficulty: Difficulty,
        questions: Vec<String>,
        metadata: SessionMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            topic: topic.into(),
            experience_level,
            difficulty,
            number_of_questions: questions.len(),
            questions: questions.into_iter().map(QuestionAnswer::new).collect(),
            status: SessionStatus::Created,
            feedback: None,
            started_at: None,
            completed_at: None,
            evaluated_at: None,
            total_time_spent: 0,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_answered()).count()
    }

    pub fn all_answered(&self) -> bool {
        self.questions.iter().all(|q| q.is_answered())
    }

    /// Percentage of questions with a non-empty answer. Always derived,
    /// never stored.
    pub fn completion_percentage(&self) -> u8 {
        if self.questions.is_empty() {
            return 0;
        }
        let ratio = self.answered_count() as f64 / self.questions.len() as f64;
        (ratio * 100.0).round() as u8
    }

    /// Mean per-question score rounded to one decimal, `None` until
    /// feedback exists.
    pub fn average_score(&self) -> Option<f64> {
        let feedback = self.feedback.as_ref()?;
        if feedback.question_feedback.is_empty() {
            return None;
        }
        let total: f64 = feedback.question_feedback.iter().map(|qf| qf.score).sum();
        let mean = total / feedback.question_feedback.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    }

    pub fn is_completed(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Completed | SessionStatus::Evaluated
        )
    }

    /// Writes the answer at `index` and advances the status machine.
    ///
    /// The slot must be empty; a non-empty answer is never overwritten.
    /// A first answer moves Created → InProgress (setting `started_at`),
    /// and the last answer moves on to Completed (setting `completed_at`
    /// and recomputing `total_time_spent`). For a one-question session
    /// both transitions happen in this single call. On error the session
    /// is left untouched.
    pub fn record_answer(
        &mut self,
        index: usize,
        answer: &str,
        time_spent: u64,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, InterviewError> {
        let len = self.questions.len();
        let slot = self
            .questions
            .get_mut(index)
            .ok_or(InterviewError::InvalidIndex { index, len })?;
        if slot.is_answered() {
            return Err(InterviewError::AlreadyAnswered { index });
        }

        slot.answer = answer.to_string();
        slot.answered_at = Some(now);
        slot.time_spent = time_spent;

        if self.status == SessionStatus::Created {
            self.status = SessionStatus::InProgress;
            self.started_at = Some(now);
        }

        if self.status == SessionStatus::InProgress && self.all_answered() {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
            self.total_time_spent = self.questions.iter().map(|q| q.time_spent).sum();
        }

        self.updated_at = now;

        Ok(AnswerOutcome {
            completion_percentage: self.completion_percentage(),
            is_completed: self.is_completed(),
        })
    }

    /// Attaches feedback and moves Completed → Evaluated. Rejected in any
    /// other state: feedback is set at most once and `Evaluated` is
    /// terminal.
    pub fn apply_feedback(
        &mut self,
        feedback: Feedback,
        now: DateTime<Utc>,
    ) -> Result<(), InterviewError> {
        if self.status != SessionStatus::Completed {
            return Err(InterviewError::NotReadyForEvaluation {
                status: self.status,
            });
        }
        self.feedback = Some(feedback);
        self.status = SessionStatus::Evaluated;
        self.evaluated_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
