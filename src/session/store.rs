use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::error::{InterviewError, InterviewResult};
use crate::session::model::{
    AnswerOutcome, Feedback, Session, SessionId, SessionStatus, UserId,
};

/// Outcome of an attempt to claim the evaluation of a session.
#[derive(Debug, Clone)]
pub enum EvaluationClaim {
    /// This caller owns the evaluation and must finish it with
    /// `complete_evaluation` or release it with `abort_evaluation`.
    /// `last_failure` carries the error a previous holder recorded when it
    /// aborted, so a caller that was waiting on that holder can surface
    /// the real failure instead of a made-up one.
    Claimed {
        session: Session,
        last_failure: Option<InterviewError>,
    },
    /// Feedback already exists; the snapshot carries it.
    AlreadyEvaluated(Session),
    /// Another caller holds the claim. Wait for its result instead of
    /// invoking the provider again.
    InFlight,
}

/// Persistence port for session entities.
///
/// Every lookup is keyed on `(id, owner_id)`: a session is invisible to
/// anyone but its owner. The conditional operations are the whole point of
/// the port: each guard ("answer slot currently empty", "status currently
/// Completed") must be evaluated atomically by the storage layer, never as
/// a read-modify-write in application memory. No writer other than these
/// operations may touch `status`, answers, or `feedback`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> InterviewResult<()>;

    async fn find(&self, id: &SessionId, owner_id: &UserId) -> InterviewResult<Option<Session>>;

    /// Sets the answer at `index` only if the slot is currently empty and
    /// applies the status transitions that follow from the write. A losing
    /// concurrent call gets `AlreadyAnswered`, indistinguishable from the
    /// synchronous check.
    async fn record_answer(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        index: usize,
        answer: &str,
        time_spent: u64,
        now: DateTime<Utc>,
    ) -> InterviewResult<(Session, AnswerOutcome)>;

    /// Atomically claims the right to evaluate a `Completed` session by
    /// setting an in-flight marker. At most one concurrent caller gets
    /// `Claimed`; a session that is not yet completed is rejected with
    /// `NotReadyForEvaluation`.
    async fn begin_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
    ) -> InterviewResult<EvaluationClaim>;

    /// Stores feedback, moves the session to `Evaluated` and clears the
    /// in-flight marker.
    async fn complete_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        feedback: Feedback,
        now: DateTime<Utc>,
    ) -> InterviewResult<Session>;

    /// Releases a claim after a failed evaluation and records why it
    /// failed. The session stays `Completed`, never partially evaluated;
    /// the recorded error is handed to the next claimant and cleared on a
    /// successful `complete_evaluation`.
    async fn abort_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        error: InterviewError,
    ) -> InterviewResult<()>;

    /// Unconditional, immediate delete. Returns whether a session was
    /// removed for this owner.
    async fn delete(&self, id: &SessionId, owner_id: &UserId) -> InterviewResult<bool>;
}

struct StoredSession {
    session: Session,
    evaluation_in_flight: bool,
    last_failure: Option<InterviewError>,
}

/// In-memory store. DashMap entry locks give every conditional operation
/// its compare-and-swap semantics: the guard and the mutation run under
/// the same shard lock.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<SessionId, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, session: Session) -> InterviewResult<()> {
        self.sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                evaluation_in_flight: false,
                last_failure: None,
            },
        );
        Ok(())
    }

    async fn find(&self, id: &SessionId, owner_id: &UserId) -> InterviewResult<Option<Session>> {
        Ok(self
            .sessions
            .get(id)
            .filter(|entry| &entry.session.owner_id == owner_id)
            .map(|entry| entry.session.clone()))
    }

    async fn record_answer(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        index: usize,
        answer: &str,
        time_spent: u64,
        now: DateTime<Utc>,
    ) -> InterviewResult<(Session, AnswerOutcome)> {
        let mut entry = self.sessions.get_mut(id).ok_or(InterviewError::NotFound)?;
        if &entry.session.owner_id != owner_id {
            return Err(InterviewError::NotFound);
        }
        let outcome = entry.session.record_answer(index, answer, time_spent, now)?;
        Ok((entry.session.clone(), outcome))
    }

    async fn begin_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
    ) -> InterviewResult<EvaluationClaim> {
        let mut entry = self.sessions.get_mut(id).ok_or(InterviewError::NotFound)?;
        if &entry.session.owner_id != owner_id {
            return Err(InterviewError::NotFound);
        }
        match entry.session.status {
            SessionStatus::Evaluated => {
                Ok(EvaluationClaim::AlreadyEvaluated(entry.session.clone()))
            }
            SessionStatus::Completed if entry.evaluation_in_flight => Ok(EvaluationClaim::InFlight),
            SessionStatus::Completed => {
                entry.evaluation_in_flight = true;
                Ok(EvaluationClaim::Claimed {
                    session: entry.session.clone(),
                    last_failure: entry.last_failure.clone(),
                })
            }
            status => Err(InterviewError::NotReadyForEvaluation { status }),
        }
    }

    async fn complete_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        feedback: Feedback,
        now: DateTime<Utc>,
    ) -> InterviewResult<Session> {
        let mut entry = self.sessions.get_mut(id).ok_or(InterviewError::NotFound)?;
        if &entry.session.owner_id != owner_id {
            return Err(InterviewError::NotFound);
        }
        entry.session.apply_feedback(feedback, now)?;
        entry.evaluation_in_flight = false;
        entry.last_failure = None;
        Ok(entry.session.clone())
    }

    async fn abort_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        error: InterviewError,
    ) -> InterviewResult<()> {
        let mut entry = self.sessions.get_mut(id).ok_or(InterviewError::NotFound)?;
        if &entry.session.owner_id != owner_id {
            return Err(InterviewError::NotFound);
        }
        entry.evaluation_in_flight = false;
        entry.last_failure = Some(error);
        Ok(())
    }

    async fn delete(&self, id: &SessionId, owner_id: &UserId) -> InterviewResult<bool> {
        Ok(self
            .sessions
            .remove_if(id, |_, entry| &entry.session.owner_id == owner_id)
            .is_some())
    }
}
