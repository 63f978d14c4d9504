use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::InterviewConfig;
use crate::error::{InterviewError, InterviewResult, ProviderError};
use crate::interview::evaluator::{EvaluationEngine, EvaluationInput};
use crate::interview::generator::{GenerationParams, QuestionGenerator};
use crate::models::{
    CreateSessionRequest, CreateSessionResponse, SubmitAnswerRequest, SubmitAnswerResponse,
};
use crate::session::model::{
    Session, SessionId, SessionMetadata, UserId, DEFAULT_QUESTION_COUNT, MAX_ANSWER_CHARS,
    MAX_QUESTIONS, MAX_TOPIC_CHARS, MIN_QUESTIONS,
};
use crate::session::store::{EvaluationClaim, SessionStore};

/// How often a caller that lost the evaluation race re-checks for the
/// winner's result.
const EVALUATION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns the session lifecycle: creation, answer recording, completion
/// detection and evaluation triggering. All state transitions go through
/// the store's conditional operations, so duplicate or racing calls cannot
/// corrupt a session.
pub struct SessionLifecycle {
    store: Arc<dyn SessionStore>,
    generator: QuestionGenerator,
    evaluator: EvaluationEngine,
    config: InterviewConfig,
}

impl SessionLifecycle {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: QuestionGenerator,
        evaluator: EvaluationEngine,
        config: InterviewConfig,
    ) -> Self {
        Self {
            store,
            generator,
            evaluator,
            config,
        }
    }

    /// Generates questions and persists a new `Created` session.
    ///
    /// Nothing is persisted when generation fails; the error propagates
    /// unchanged.
    #[tracing::instrument(skip(self, request), fields(owner_id = %owner_id))]
    pub async fn create(
        &self,
        owner_id: &UserId,
        request: CreateSessionRequest,
    ) -> InterviewResult<CreateSessionResponse> {
        let topic = request.topic.trim().to_string();
        if topic.is_empty() || topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(InterviewError::Validation(format!(
                "Topic must be between 1 and {MAX_TOPIC_CHARS} characters"
            )));
        }
        let number_of_questions = request
            .number_of_questions
            .unwrap_or(DEFAULT_QUESTION_COUNT);
        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&number_of_questions) {
            return Err(InterviewError::Validation(format!(
                "Number of questions must be between {MIN_QUESTIONS} and {MAX_QUESTIONS}"
            )));
        }
        let difficulty = request.difficulty.unwrap_or_default();

        let generated = self
            .generator
            .generate(&GenerationParams {
                topic: topic.clone(),
                experience_level: request.experience_level,
                difficulty,
                number_of_questions,
            })
            .await?;

        let metadata = SessionMetadata {
            ai_model: generated.model,
            prompt_version: self.config.prompt_version.clone(),
            generation_time_ms: generated.generation_time_ms,
        };
        let session = Session::new(
            owner_id.clone(),
            topic.clone(),
            request.experience_level,
            difficulty,
            generated.questions.clone(),
            metadata,
        );
        let session_id = session.id.clone();
        let number_of_questions = session.number_of_questions;
        self.store.insert(session).await?;

        info!(session_id = %session_id, questions = number_of_questions, "interview session created");

        Ok(CreateSessionResponse {
            session_id,
            questions: generated.questions,
            topic,
            experience_level: request.experience_level,
            difficulty,
            number_of_questions,
        })
    }

    /// Records one answer via the store's conditional write. A duplicate
    /// submission, concurrent or not, fails with `AlreadyAnswered` and
    /// leaves the stored answer untouched.
    #[tracing::instrument(skip(self, request), fields(owner_id = %owner_id, session_id = %request.session_id))]
    pub async fn submit_answer(
        &self,
        owner_id: &UserId,
        request: SubmitAnswerRequest,
    ) -> InterviewResult<SubmitAnswerResponse> {
        let answer = request.answer.trim();
        if answer.is_empty() || answer.chars().count() > MAX_ANSWER_CHARS {
            return Err(InterviewError::Validation(format!(
                "Answer must be between 1 and {MAX_ANSWER_CHARS} characters"
            )));
        }
        let time_spent = request.time_spent.unwrap_or(0);

        let (session, outcome) = self
            .store
            .record_answer(
                &request.session_id,
                owner_id,
                request.question_index,
                answer,
                time_spent,
                Utc::now(),
            )
            .await?;

        debug!(
            status = %session.status,
            completion = outcome.completion_percentage,
            "answer recorded"
        );

        Ok(SubmitAnswerResponse {
            session_id: request.session_id,
            question_index: request.question_index,
            completion_percentage: outcome.completion_percentage,
            is_completed: outcome.is_completed,
        })
    }

    /// Returns the full session with feedback, evaluating it first if it
    /// is completed but not yet evaluated.
    ///
    /// Idempotent: an already-evaluated session returns its stored
    /// feedback and the provider is never called again. Concurrent calls
    /// on a completed session result in at most one provider call; losers
    /// of the claim race wait for the winner's result.
    #[tracing::instrument(skip(self), fields(owner_id = %owner_id, session_id = %session_id))]
    pub async fn summary(
        &self,
        owner_id: &UserId,
        session_id: &SessionId,
    ) -> InterviewResult<Session> {
        match self.store.begin_evaluation(session_id, owner_id).await? {
            EvaluationClaim::AlreadyEvaluated(session) => Ok(session),
            EvaluationClaim::Claimed { session, .. } => {
                self.run_evaluation(owner_id, session).await
            }
            EvaluationClaim::InFlight => {
                debug!("evaluation already in flight; waiting for its result");
                self.wait_for_evaluation(owner_id, session_id).await
            }
        }
    }

    async fn run_evaluation(
        &self,
        owner_id: &UserId,
        session: Session,
    ) -> InterviewResult<Session> {
        let input = EvaluationInput {
            topic: session.topic.clone(),
            experience_level: session.experience_level,
            questions: session.questions.clone(),
        };
        match self.evaluator.evaluate(&input).await {
            Ok(feedback) => {
                let evaluated = self
                    .store
                    .complete_evaluation(&session.id, owner_id, feedback, Utc::now())
                    .await?;
                info!(session_id = %session.id, "interview session evaluated");
                Ok(evaluated)
            }
            Err(e) => {
                // The session stays Completed; release the claim so a
                // later call can try again, and record the error for
                // callers waiting on this attempt.
                error!(session_id = %session.id, error = %e, "evaluation failed");
                self.store
                    .abort_evaluation(&session.id, owner_id, e.clone())
                    .await?;
                Err(e)
            }
        }
    }

    async fn wait_for_evaluation(
        &self,
        owner_id: &UserId,
        session_id: &SessionId,
    ) -> InterviewResult<Session> {
        let deadline =
            Instant::now() + Duration::from_secs(self.config.request_timeout_secs);
        loop {
            sleep(EVALUATION_POLL_INTERVAL).await;
            match self.store.begin_evaluation(session_id, owner_id).await? {
                EvaluationClaim::AlreadyEvaluated(session) => return Ok(session),
                EvaluationClaim::InFlight => {
                    if Instant::now() >= deadline {
                        return Err(InterviewError::Provider(ProviderError::Timeout(
                            self.config.request_timeout_secs,
                        )));
                    }
                }
                EvaluationClaim::Claimed { last_failure, .. } => {
                    // The winner failed and released its claim. Re-invoking
                    // the provider here would break the at-most-one-call
                    // guarantee for the racing calls, so release the claim
                    // and surface the winner's recorded error.
                    let failure = last_failure.unwrap_or(InterviewError::Provider(
                        ProviderError::ApiError(
                            "evaluation failed in a concurrent request".to_string(),
                        ),
                    ));
                    self.store
                        .abort_evaluation(session_id, owner_id, failure.clone())
                        .await?;
                    warn!(error = %failure, "concurrent evaluation attempt failed");
                    return Err(failure);
                }
            }
        }
    }

    /// Point lookup, owner-scoped.
    pub async fn get(&self, owner_id: &UserId, session_id: &SessionId) -> InterviewResult<Session> {
        self.store
            .find(session_id, owner_id)
            .await?
            .ok_or(InterviewError::NotFound)
    }

    /// Owner-initiated delete: unconditional and immediate.
    #[tracing::instrument(skip(self), fields(owner_id = %owner_id, session_id = %session_id))]
    pub async fn delete(
        &self,
        owner_id: &UserId,
        session_id: &SessionId,
    ) -> InterviewResult<()> {
        if self.store.delete(session_id, owner_id).await? {
            info!("interview session deleted");
            Ok(())
        } else {
            Err(InterviewError::NotFound)
        }
    }
}
