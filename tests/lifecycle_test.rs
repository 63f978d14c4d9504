use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use prepdeck::session::model::{AnswerOutcome, SessionMetadata};
use prepdeck::session::store::EvaluationClaim;
use prepdeck::{
    CommonConfig, CreateSessionRequest, Difficulty, EvaluationEngine, ExperienceLevel, Feedback,
    InMemorySessionStore, InterviewConfig, InterviewError, LLMResponse, ProviderError,
    ProviderLLM, ProviderResult, QuestionGenerator, Session, SessionId, SessionLifecycle,
    SessionStatus, SessionStore, SubmitAnswerRequest, UserId,
};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Test provider that answers generation and evaluation prompts from a
/// canned script and counts calls per prompt kind.
struct FakeLLM {
    questions_reply: String,
    evaluation_reply: String,
    evaluation_delay: Duration,
    generation_calls: AtomicUsize,
    evaluation_calls: AtomicUsize,
    /// Replies consumed before `evaluation_reply`, front first.
    evaluation_prelude: std::sync::Mutex<Vec<String>>,
}

impl FakeLLM {
    fn new(questions_reply: &str, evaluation_reply: &str) -> Self {
        Self {
            questions_reply: questions_reply.to_string(),
            evaluation_reply: evaluation_reply.to_string(),
            evaluation_delay: Duration::ZERO,
            generation_calls: AtomicUsize::new(0),
            evaluation_calls: AtomicUsize::new(0),
            evaluation_prelude: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn with_evaluation_delay(mut self, delay: Duration) -> Self {
        self.evaluation_delay = delay;
        self
    }

    fn with_evaluation_prelude(self, replies: Vec<&str>) -> Self {
        *self.evaluation_prelude.lock().unwrap() =
            replies.into_iter().map(String::from).collect();
        self
    }
}

#[async_trait]
impl ProviderLLM for FakeLLM {
    async fn send_message(
        &self,
        prompt: &str,
        config: &CommonConfig,
    ) -> ProviderResult<LLMResponse> {
        if prompt.contains("Generate") {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            Ok(LLMResponse::new(
                self.questions_reply.clone(),
                config.model.clone(),
            ))
        } else {
            self.evaluation_calls.fetch_add(1, Ordering::SeqCst);
            if !self.evaluation_delay.is_zero() {
                tokio::time::sleep(self.evaluation_delay).await;
            }
            let reply = {
                let mut prelude = self.evaluation_prelude.lock().unwrap();
                if prelude.is_empty() {
                    self.evaluation_reply.clone()
                } else {
                    prelude.remove(0)
                }
            };
            Ok(LLMResponse::new(reply, config.model.clone()))
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Store wrapper that counts inserts, to show nothing is persisted when
/// generation fails.
struct CountingStore {
    inner: InMemorySessionStore,
    inserts: AtomicUsize,
}

#[async_trait]
impl SessionStore for CountingStore {
    async fn insert(&self, session: Session) -> Result<(), InterviewError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(session).await
    }

    async fn find(
        &self,
        id: &SessionId,
        owner_id: &UserId,
    ) -> Result<Option<Session>, InterviewError> {
        self.inner.find(id, owner_id).await
    }

    async fn record_answer(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        index: usize,
        answer: &str,
        time_spent: u64,
        now: DateTime<Utc>,
    ) -> Result<(Session, AnswerOutcome), InterviewError> {
        self.inner
            .record_answer(id, owner_id, index, answer, time_spent, now)
            .await
    }

    async fn begin_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
    ) -> Result<EvaluationClaim, InterviewError> {
        self.inner.begin_evaluation(id, owner_id).await
    }

    async fn complete_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        feedback: Feedback,
        now: DateTime<Utc>,
    ) -> Result<Session, InterviewError> {
        self.inner
            .complete_evaluation(id, owner_id, feedback, now)
            .await
    }

    async fn abort_evaluation(
        &self,
        id: &SessionId,
        owner_id: &UserId,
        error: InterviewError,
    ) -> Result<(), InterviewError> {
        self.inner.abort_evaluation(id, owner_id, error).await
    }

    async fn delete(&self, id: &SessionId, owner_id: &UserId) -> Result<bool, InterviewError> {
        self.inner.delete(id, owner_id).await
    }
}

fn valid_evaluation_json() -> String {
    json!({
        "overallScore": 72,
        "strengths": ["clear communication"],
        "improvements": ["deeper examples"],
        "detailedFeedback": "A decent run overall.",
        "questionFeedback": [
            {"questionIndex": 0, "score": 7, "feedback": "fine"}
        ]
    })
    .to_string()
}

fn lifecycle_with(llm: Arc<dyn ProviderLLM>) -> SessionLifecycle {
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    lifecycle_with_store(llm, store)
}

fn lifecycle_with_store(llm: Arc<dyn ProviderLLM>, store: Arc<dyn SessionStore>) -> SessionLifecycle {
    let config = InterviewConfig::default();
    SessionLifecycle::new(
        store,
        QuestionGenerator::new(llm.clone(), config.clone()),
        EvaluationEngine::new(llm, config.clone()),
        config,
    )
}

fn create_request(topic: &str, count: usize) -> CreateSessionRequest {
    CreateSessionRequest {
        topic: topic.to_string(),
        experience_level: ExperienceLevel::Beginner,
        difficulty: Some(Difficulty::Easy),
        number_of_questions: Some(count),
    }
}

fn answer_request(session_id: &str, index: usize, answer: &str, time_spent: u64) -> SubmitAnswerRequest {
    SubmitAnswerRequest {
        session_id: session_id.to_string(),
        question_index: index,
        answer: answer.to_string(),
        time_spent: Some(time_spent),
    }
}

#[tokio::test]
async fn test_create_session_persists_created_state() {
    let llm = Arc::new(FakeLLM::new(
        "[\"Q1\",\"Q2\",\"Q3\"]",
        &valid_evaluation_json(),
    ));
    let lifecycle = lifecycle_with(llm.clone());
    let owner = "user-1".to_string();

    let response = lifecycle
        .create(&owner, create_request("React", 3))
        .await
        .unwrap();

    assert_eq!(response.questions, vec!["Q1", "Q2", "Q3"]);
    assert_eq!(response.topic, "React");
    assert_eq!(response.number_of_questions, 3);

    let session = lifecycle.get(&owner, &response.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Created);
    assert_eq!(session.questions.len(), 3);
    assert!(session.questions.iter().all(|q| q.answer.is_empty()));
    assert_eq!(session.metadata.prompt_version, "1.0");
    assert_eq!(session.metadata.ai_model, "gpt-4o-mini");
}

#[tokio::test]
async fn test_create_fails_on_prose_and_persists_nothing() {
    struct ProseLLM;
    #[async_trait]
    impl ProviderLLM for ProseLLM {
        async fn send_message(
            &self,
            _prompt: &str,
            config: &CommonConfig,
        ) -> ProviderResult<LLMResponse> {
            Ok(LLMResponse::new(
                "I'm sorry, here are some thoughts on React instead.",
                config.model.clone(),
            ))
        }
        fn name(&self) -> &str {
            "prose"
        }
    }

    let store = Arc::new(CountingStore {
        inner: InMemorySessionStore::new(),
        inserts: AtomicUsize::new(0),
    });
    let lifecycle = lifecycle_with_store(Arc::new(ProseLLM), store.clone());

    let err = lifecycle
        .create(&"user-1".to_string(), create_request("React", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::InvalidOutput(_)));
    assert_eq!(store.inserts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_create_validates_input_before_calling_provider() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm.clone());
    let owner = "user-1".to_string();

    let err = lifecycle
        .create(&owner, create_request("   ", 3))
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::Validation(_)));

    let err = lifecycle
        .create(&owner, create_request("React", 21))
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::Validation(_)));

    let err = lifecycle
        .create(&owner, create_request(&"x".repeat(201), 3))
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::Validation(_)));

    assert_eq!(llm.generation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_question_count_drift_uses_returned_length() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\",\"Q2\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let response = lifecycle
        .create(&owner, create_request("React", 5))
        .await
        .unwrap();
    assert_eq!(response.number_of_questions, 2);

    let session = lifecycle.get(&owner, &response.session_id).await.unwrap();
    assert_eq!(session.number_of_questions, 2);
    assert_eq!(session.questions.len(), 2);
}

#[tokio::test]
async fn test_single_question_session_completes_on_first_answer() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    let response = lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "my answer", 42))
        .await
        .unwrap();

    assert_eq!(response.completion_percentage, 100);
    assert!(response.is_completed);

    let session = lifecycle.get(&owner, &created.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.total_time_spent, 42);
    assert!(session.started_at.is_some());
    assert!(session.completed_at.is_some());
}

#[tokio::test]
async fn test_duplicate_submission_keeps_first_answer() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\",\"Q2\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 2))
        .await
        .unwrap();
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "first", 10))
        .await
        .unwrap();
    let err = lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "second", 20))
        .await
        .unwrap_err();

    assert!(matches!(err, InterviewError::AlreadyAnswered { index: 0 }));
    let session = lifecycle.get(&owner, &created.session_id).await.unwrap();
    assert_eq!(session.questions[0].answer, "first");
    assert_eq!(session.questions[0].time_spent, 10);
}

#[tokio::test]
async fn test_empty_answer_rejected() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    let err = lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "   ", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::Validation(_)));

    // The slot stays empty and answerable.
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "real answer", 0))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_invalid_index_rejected() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    let err = lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 5, "answer", 0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InterviewError::InvalidIndex { index: 5, len: 1 }
    ));
}

#[tokio::test]
async fn test_summary_evaluates_completed_session_once() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm.clone());
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "answer", 5))
        .await
        .unwrap();

    let first = lifecycle.summary(&owner, &created.session_id).await.unwrap();
    assert_eq!(first.status, SessionStatus::Evaluated);
    assert!(first.evaluated_at.is_some());
    let feedback = first.feedback.clone().unwrap();
    assert_eq!(feedback.overall_score, 72.0);

    // Idempotent: second call returns the stored feedback, no new
    // provider call.
    let second = lifecycle.summary(&owner, &created.session_id).await.unwrap();
    assert_eq!(second.feedback.unwrap(), feedback);
    assert_eq!(llm.evaluation_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_summary_rejected_before_completion() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\",\"Q2\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm.clone());
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 2))
        .await
        .unwrap();
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "answer", 5))
        .await
        .unwrap();

    let err = lifecycle
        .summary(&owner, &created.session_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InterviewError::NotReadyForEvaluation {
            status: SessionStatus::InProgress
        }
    ));
    assert_eq!(llm.evaluation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_summaries_call_provider_once() {
    let llm = Arc::new(
        FakeLLM::new("[\"Q1\"]", &valid_evaluation_json())
            .with_evaluation_delay(Duration::from_millis(200)),
    );
    let lifecycle = Arc::new(lifecycle_with(llm.clone()));
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "answer", 5))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let lifecycle = lifecycle.clone();
        let owner = owner.clone();
        let session_id = created.session_id.clone();
        handles.push(tokio::spawn(async move {
            lifecycle.summary(&owner, &session_id).await
        }));
    }

    let mut feedbacks = Vec::new();
    for handle in handles {
        feedbacks.push(handle.await.unwrap().unwrap().feedback.unwrap());
    }

    // One provider call, and every caller saw the same feedback object.
    assert_eq!(llm.evaluation_calls.load(Ordering::SeqCst), 1);
    for feedback in &feedbacks[1..] {
        assert_eq!(feedback, &feedbacks[0]);
    }
}

#[tokio::test]
async fn test_concurrent_answers_single_winner() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = Arc::new(lifecycle_with(llm));
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..6 {
        let lifecycle = lifecycle.clone();
        let owner = owner.clone();
        let session_id = created.session_id.clone();
        handles.push(tokio::spawn(async move {
            lifecycle
                .submit_answer(&owner, answer_request(&session_id, 0, &format!("try-{i}"), 1))
                .await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => wins += 1,
            Err(InterviewError::AlreadyAnswered { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn test_waiting_summaries_see_the_winners_real_error() {
    let llm = Arc::new(
        FakeLLM::new("[\"Q1\"]", &valid_evaluation_json())
            .with_evaluation_delay(Duration::from_millis(200))
            .with_evaluation_prelude(vec!["sorry, no JSON today"]),
    );
    let lifecycle = Arc::new(lifecycle_with(llm.clone()));
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "answer", 5))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let lifecycle = lifecycle.clone();
        let owner = owner.clone();
        let session_id = created.session_id.clone();
        handles.push(tokio::spawn(async move {
            lifecycle.summary(&owner, &session_id).await
        }));
    }

    // The winner's parse failure, not a generic transport error, reaches
    // every waiting caller.
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, InterviewError::InvalidOutput(_)));
    }
    assert_eq!(llm.evaluation_calls.load(Ordering::SeqCst), 1);

    // The session is still evaluable afterwards.
    let evaluated = lifecycle.summary(&owner, &created.session_id).await.unwrap();
    assert_eq!(evaluated.status, SessionStatus::Evaluated);
    assert_eq!(llm.evaluation_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_evaluation_leaves_session_completed() {
    let llm = Arc::new(
        FakeLLM::new("[\"Q1\"]", &valid_evaluation_json())
            .with_evaluation_prelude(vec!["sorry, no JSON today"]),
    );
    let lifecycle = lifecycle_with(llm.clone());
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    lifecycle
        .submit_answer(&owner, answer_request(&created.session_id, 0, "answer", 5))
        .await
        .unwrap();

    let err = lifecycle
        .summary(&owner, &created.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::InvalidOutput(_)));

    let session = lifecycle.get(&owner, &created.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.feedback.is_none());

    // The claim was released, so a later call can evaluate successfully.
    let evaluated = lifecycle.summary(&owner, &created.session_id).await.unwrap();
    assert_eq!(evaluated.status, SessionStatus::Evaluated);
    assert_eq!(llm.evaluation_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sessions_are_owner_scoped() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let alice = "alice".to_string();
    let mallory = "mallory".to_string();

    let created = lifecycle
        .create(&alice, create_request("React", 1))
        .await
        .unwrap();

    assert!(matches!(
        lifecycle.get(&mallory, &created.session_id).await,
        Err(InterviewError::NotFound)
    ));
    assert!(matches!(
        lifecycle
            .submit_answer(&mallory, answer_request(&created.session_id, 0, "mine", 0))
            .await,
        Err(InterviewError::NotFound)
    ));
    assert!(matches!(
        lifecycle.summary(&mallory, &created.session_id).await,
        Err(InterviewError::NotFound)
    ));
    assert!(matches!(
        lifecycle.delete(&mallory, &created.session_id).await,
        Err(InterviewError::NotFound)
    ));

    // Alice's session is untouched by all of that.
    let session = lifecycle.get(&alice, &created.session_id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Created);
    assert!(session.questions[0].answer.is_empty());
}

#[tokio::test]
async fn test_delete_is_immediate_and_unconditional() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();

    // Deletable in any state, no soft-delete.
    lifecycle.delete(&owner, &created.session_id).await.unwrap();
    assert!(matches!(
        lifecycle.get(&owner, &created.session_id).await,
        Err(InterviewError::NotFound)
    ));
    assert!(matches!(
        lifecycle.delete(&owner, &created.session_id).await,
        Err(InterviewError::NotFound)
    ));
}

#[tokio::test]
async fn test_provider_transport_error_propagates_from_create() {
    struct DownLLM;
    #[async_trait]
    impl ProviderLLM for DownLLM {
        async fn send_message(
            &self,
            _prompt: &str,
            _config: &CommonConfig,
        ) -> ProviderResult<LLMResponse> {
            Err(ProviderError::ApiError("connection refused".to_string()))
        }
        fn name(&self) -> &str {
            "down"
        }
    }

    let lifecycle = lifecycle_with(Arc::new(DownLLM));
    let err = lifecycle
        .create(&"user-1".to_string(), create_request("React", 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InterviewError::Provider(ProviderError::ApiError(_))
    ));
}

#[tokio::test]
async fn test_metadata_records_generation_provenance() {
    let llm = Arc::new(FakeLLM::new("[\"Q1\"]", &valid_evaluation_json()));
    let lifecycle = lifecycle_with(llm);
    let owner = "user-1".to_string();

    let created = lifecycle
        .create(&owner, create_request("React", 1))
        .await
        .unwrap();
    let session = lifecycle.get(&owner, &created.session_id).await.unwrap();

    let SessionMetadata {
        ai_model,
        prompt_version,
        ..
    } = session.metadata;
    assert_eq!(ai_model, "gpt-4o-mini");
    assert_eq!(prompt_version, "1.0");
}
