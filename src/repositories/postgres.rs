use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{
    AiContext, GradedAnswer, PendingAnswer, Question, QuizUnit, RetryQueueEntry,
};
use crate::repositories::store::{
    AnswerStore, ContextStore, NewAttempt, PendingFilter, QuizCatalog, ReminderQuery,
    Resolution, RetryOutcome, RetryQueueStore, StoreError, SuggestionUpdate,
};
use crate::repositories::{
    ai_contexts, attempts, graded_answers, pending_answers, questions, retry_queue, units,
};

/// Postgres-backed implementation of every store seam.
#[derive(Clone)]
pub(crate) struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuizCatalog for PgStore {
    async fn find_unit(&self, unit_id: &str) -> Result<Option<QuizUnit>, StoreError> {
        Ok(units::find_by_id(&self.pool, unit_id).await?)
    }

    async fn list_questions(&self, unit_id: &str) -> Result<Vec<Question>, StoreError> {
        questions::list_by_unit(&self.pool, unit_id)
            .await?
            .into_iter()
            .map(|row| {
                let id = row.id.clone();
                Question::try_from(row)
                    .map_err(|err| StoreError::Corrupt(format!("question {id}: {err}")))
            })
            .collect()
    }

    async fn find_question(&self, question_id: &str) -> Result<Option<Question>, StoreError> {
        let Some(row) = questions::find_by_id(&self.pool, question_id).await? else {
            return Ok(None);
        };
        Question::try_from(row)
            .map(Some)
            .map_err(|err| StoreError::Corrupt(format!("question {question_id}: {err}")))
    }
}

#[async_trait]
impl AnswerStore for PgStore {
    async fn attempt_count(&self, learner_id: &str, unit_id: &str) -> Result<i32, StoreError> {
        Ok(attempts::current_count(&self.pool, learner_id, unit_id).await?)
    }

    async fn attempt_has_records(
        &self,
        learner_id: &str,
        question_ids: &[String],
        attempt_no: i32,
    ) -> Result<bool, StoreError> {
        Ok(pending_answers::exists_for_attempt(&self.pool, learner_id, question_ids, attempt_no)
            .await?)
    }

    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let now = attempt.created_at;

        for answer in &attempt.pending {
            pending_answers::insert(
                &mut *tx,
                &attempt.learner_id,
                &attempt.unit_id,
                attempt.attempt_no,
                answer,
                now,
            )
            .await
            .map_err(|err| StoreError::from_write(err, "pending answer"))?;
        }

        for answer in &attempt.graded {
            graded_answers::insert(
                &mut *tx,
                &attempt.learner_id,
                &attempt.unit_id,
                attempt.attempt_no,
                answer,
                now,
            )
            .await
            .map_err(|err| StoreError::from_write(err, "graded answer"))?;
        }

        for entry in &attempt.retries {
            retry_queue::insert(&mut *tx, &attempt.learner_id, &attempt.unit_id, entry, now)
                .await
                .map_err(|err| StoreError::from_write(err, "retry entry"))?;
        }

        let advanced = attempts::advance(
            &mut *tx,
            &attempt.learner_id,
            &attempt.unit_id,
            attempt.attempt_no,
            now,
        )
        .await?;
        if !advanced {
            tx.rollback().await?;
            return Err(StoreError::Conflict(format!(
                "attempt counter is no longer at {}",
                attempt.attempt_no - 1
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_pending(&self, id: &str) -> Result<Option<PendingAnswer>, StoreError> {
        Ok(pending_answers::find_by_id(&self.pool, id).await?)
    }

    async fn resolve_pending(
        &self,
        id: &str,
        resolution: &Resolution,
    ) -> Result<Option<PendingAnswer>, StoreError> {
        Ok(pending_answers::resolve(&self.pool, id, resolution).await?)
    }

    async fn attach_suggestion(
        &self,
        id: &str,
        update: &SuggestionUpdate,
    ) -> Result<bool, StoreError> {
        Ok(pending_answers::attach_suggestion(&self.pool, id, update).await?)
    }

    async fn list_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<(Vec<PendingAnswer>, i64), StoreError> {
        let items = pending_answers::list(&self.pool, filter).await?;
        let total = pending_answers::count(&self.pool, filter).await?;
        Ok((items, total))
    }

    async fn count_pending(
        &self,
        learner_id: &str,
        unit_id: Option<&str>,
    ) -> Result<i64, StoreError> {
        let filter = PendingFilter {
            unit_id: unit_id.map(str::to_string),
            learner_id: Some(learner_id.to_string()),
            state: Some(crate::db::types::PendingState::Pending),
            ..PendingFilter::default()
        };
        Ok(pending_answers::count(&self.pool, &filter).await?)
    }

    async fn list_graded(
        &self,
        learner_id: &str,
        unit_id: Option<&str>,
    ) -> Result<Vec<GradedAnswer>, StoreError> {
        Ok(graded_answers::list_by_learner(&self.pool, learner_id, unit_id).await?)
    }

    async fn list_due_reminders(
        &self,
        query: &ReminderQuery,
    ) -> Result<Vec<PendingAnswer>, StoreError> {
        Ok(pending_answers::list_due_reminders(&self.pool, query).await?)
    }

    async fn mark_reminded(&self, ids: &[String], at: PrimitiveDateTime) -> Result<(), StoreError> {
        Ok(pending_answers::mark_reminded(&self.pool, ids, at).await?)
    }
}

#[async_trait]
impl ContextStore for PgStore {
    async fn find_context(&self, unit_id: &str) -> Result<Option<AiContext>, StoreError> {
        Ok(ai_contexts::find_by_unit(&self.pool, unit_id).await?)
    }

    async fn save_context(&self, context: &AiContext) -> Result<(), StoreError> {
        Ok(ai_contexts::upsert(&self.pool, context).await?)
    }
}

#[async_trait]
impl RetryQueueStore for PgStore {
    async fn claim_due(
        &self,
        limit: i64,
        now: PrimitiveDateTime,
        stale_before: PrimitiveDateTime,
    ) -> Result<Vec<RetryQueueEntry>, StoreError> {
        Ok(retry_queue::claim_due(&self.pool, limit, now, stale_before).await?)
    }

    async fn finish(&self, id: &str, outcome: &RetryOutcome) -> Result<(), StoreError> {
        Ok(retry_queue::finish(&self.pool, id, outcome).await?)
    }

    async fn list_for_pending(
        &self,
        pending_answer_id: &str,
    ) -> Result<Vec<RetryQueueEntry>, StoreError> {
        Ok(retry_queue::list_for_pending(&self.pool, pending_answer_id).await?)
    }
}
