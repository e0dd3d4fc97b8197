use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{
    AiContext, GradedAnswer, PendingAnswer, Question, QuizUnit, RetryQueueEntry,
};
use crate::db::types::{AiFailureKind, PendingState, RetryQueueState};

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    /// A uniqueness guard or optimistic check rejected the write.
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("stored data is invalid: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn from_write(err: sqlx::Error, context: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some("23505") => {
                StoreError::Conflict(format!("{context}: {}", db_error.message()))
            }
            _ => StoreError::Database(err),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NewPendingAnswer {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) raw_answer: String,
    pub(crate) suggested_score: Option<i32>,
    pub(crate) suggested_feedback: Option<String>,
    pub(crate) ideal_answer: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct NewGradedAnswer {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) raw_answer: Option<String>,
    pub(crate) score: i32,
    pub(crate) is_correct: bool,
    pub(crate) feedback: String,
}

#[derive(Debug, Clone)]
pub(crate) struct NewRetryEntry {
    pub(crate) id: String,
    pub(crate) pending_answer_id: String,
    pub(crate) question_id: String,
    pub(crate) raw_answer: String,
    pub(crate) failure_kind: AiFailureKind,
    pub(crate) max_attempts: i32,
    pub(crate) last_error: String,
}

/// Everything one quiz attempt writes. Persisted atomically together with the
/// attempt counter moving from `attempt_no - 1` to `attempt_no`.
#[derive(Debug, Clone)]
pub(crate) struct NewAttempt {
    pub(crate) learner_id: String,
    pub(crate) unit_id: String,
    pub(crate) attempt_no: i32,
    pub(crate) pending: Vec<NewPendingAnswer>,
    pub(crate) graded: Vec<NewGradedAnswer>,
    pub(crate) retries: Vec<NewRetryEntry>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub(crate) state: PendingState,
    pub(crate) final_score: i32,
    pub(crate) final_feedback: String,
    pub(crate) reviewer_comment: Option<String>,
    pub(crate) reviewer_id: String,
    pub(crate) resolved_at: PrimitiveDateTime,
}

#[derive(Debug, Clone)]
pub(crate) struct SuggestionUpdate {
    pub(crate) suggested_score: i32,
    pub(crate) suggested_feedback: String,
    pub(crate) ideal_answer: Option<String>,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PendingFilter {
    pub(crate) unit_id: Option<String>,
    pub(crate) learner_id: Option<String>,
    /// Only answers from units assigned to this reviewer.
    pub(crate) reviewer_id: Option<String>,
    pub(crate) state: Option<PendingState>,
    pub(crate) skip: i64,
    pub(crate) limit: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct ReminderQuery {
    pub(crate) created_before: PrimitiveDateTime,
    pub(crate) reminded_before: PrimitiveDateTime,
    pub(crate) reminder_max: i32,
    pub(crate) limit: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct RetryOutcome {
    pub(crate) retry_count: i32,
    pub(crate) attempted_at: PrimitiveDateTime,
    pub(crate) state: RetryQueueState,
    pub(crate) error: Option<String>,
}

#[async_trait]
pub(crate) trait QuizCatalog: Send + Sync {
    async fn find_unit(&self, unit_id: &str) -> Result<Option<QuizUnit>, StoreError>;

    /// Questions of a unit in display order.
    async fn list_questions(&self, unit_id: &str) -> Result<Vec<Question>, StoreError>;

    async fn find_question(&self, question_id: &str) -> Result<Option<Question>, StoreError>;
}

#[async_trait]
pub(crate) trait AnswerStore: Send + Sync {
    async fn attempt_count(&self, learner_id: &str, unit_id: &str) -> Result<i32, StoreError>;

    async fn attempt_has_records(
        &self,
        learner_id: &str,
        question_ids: &[String],
        attempt_no: i32,
    ) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::Conflict`] when any row already exists or the
    /// counter moved underneath us; nothing is written in that case.
    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<(), StoreError>;

    async fn find_pending(&self, id: &str) -> Result<Option<PendingAnswer>, StoreError>;

    /// Applies the resolution only while the answer is still pending. `None` means
    /// another decision won.
    async fn resolve_pending(
        &self,
        id: &str,
        resolution: &Resolution,
    ) -> Result<Option<PendingAnswer>, StoreError>;

    async fn attach_suggestion(
        &self,
        id: &str,
        update: &SuggestionUpdate,
    ) -> Result<bool, StoreError>;

    async fn list_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<(Vec<PendingAnswer>, i64), StoreError>;

    async fn count_pending(&self, learner_id: &str, unit_id: Option<&str>)
        -> Result<i64, StoreError>;

    async fn list_graded(
        &self,
        learner_id: &str,
        unit_id: Option<&str>,
    ) -> Result<Vec<GradedAnswer>, StoreError>;

    async fn list_due_reminders(
        &self,
        query: &ReminderQuery,
    ) -> Result<Vec<PendingAnswer>, StoreError>;

    async fn mark_reminded(
        &self,
        ids: &[String],
        at: PrimitiveDateTime,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait ContextStore: Send + Sync {
    async fn find_context(&self, unit_id: &str) -> Result<Option<AiContext>, StoreError>;

    async fn save_context(&self, context: &AiContext) -> Result<(), StoreError>;
}

#[async_trait]
pub(crate) trait RetryQueueStore: Send + Sync {
    /// Moves up to `limit` queued entries (and entries stuck in processing since
    /// `stale_before`) into processing and returns them.
    async fn claim_due(
        &self,
        limit: i64,
        now: PrimitiveDateTime,
        stale_before: PrimitiveDateTime,
    ) -> Result<Vec<RetryQueueEntry>, StoreError>;

    async fn finish(&self, id: &str, outcome: &RetryOutcome) -> Result<(), StoreError>;

    async fn list_for_pending(
        &self,
        pending_answer_id: &str,
    ) -> Result<Vec<RetryQueueEntry>, StoreError>;
}
