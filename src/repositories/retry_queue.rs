use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::RetryQueueEntry;
use crate::db::types::RetryQueueState;
use crate::repositories::store::{NewRetryEntry, RetryOutcome};

pub(crate) const COLUMNS: &str = "\
    id, pending_answer_id, question_id, unit_id, learner_id, raw_answer, failure_kind, \
    retry_count, max_attempts, last_attempt_at, state, last_error, created_at, updated_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    unit_id: &str,
    entry: &NewRetryEntry,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ai_retry_queue (
            id, pending_answer_id, question_id, unit_id, learner_id, raw_answer, failure_kind,
            retry_count, max_attempts, state, last_error, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,0,$8,$9,$10,$11,$11)",
    )
    .bind(&entry.id)
    .bind(&entry.pending_answer_id)
    .bind(&entry.question_id)
    .bind(unit_id)
    .bind(learner_id)
    .bind(&entry.raw_answer)
    .bind(entry.failure_kind)
    .bind(entry.max_attempts)
    .bind(RetryQueueState::Queued)
    .bind(&entry.last_error)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn claim_due(
    pool: &PgPool,
    limit: i64,
    now: PrimitiveDateTime,
    stale_before: PrimitiveDateTime,
) -> Result<Vec<RetryQueueEntry>, sqlx::Error> {
    sqlx::query_as::<_, RetryQueueEntry>(
        "WITH candidate AS (
            SELECT id
            FROM ai_retry_queue
            WHERE retry_count < max_attempts
              AND (state = $1 OR (state = $2 AND updated_at < $3))
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $4
        )
        UPDATE ai_retry_queue
        SET state = $2,
            updated_at = $5
        FROM candidate
        WHERE ai_retry_queue.id = candidate.id
        RETURNING ai_retry_queue.*",
    )
    .bind(RetryQueueState::Queued)
    .bind(RetryQueueState::Processing)
    .bind(stale_before)
    .bind(limit)
    .bind(now)
    .fetch_all(pool)
    .await
}

pub(crate) async fn finish(
    pool: &PgPool,
    id: &str,
    outcome: &RetryOutcome,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE ai_retry_queue
         SET retry_count = $2,
             last_attempt_at = $3,
             state = $4,
             last_error = COALESCE($5, last_error),
             updated_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(outcome.retry_count)
    .bind(outcome.attempted_at)
    .bind(outcome.state)
    .bind(&outcome.error)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn list_for_pending(
    pool: &PgPool,
    pending_answer_id: &str,
) -> Result<Vec<RetryQueueEntry>, sqlx::Error> {
    sqlx::query_as::<_, RetryQueueEntry>(&format!(
        "SELECT {COLUMNS}
         FROM ai_retry_queue
         WHERE pending_answer_id = $1
         ORDER BY created_at ASC"
    ))
    .bind(pending_answer_id)
    .fetch_all(pool)
    .await
}
