use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::PendingAnswer;
use crate::db::types::PendingState;
use crate::repositories::store::{
    NewPendingAnswer, PendingFilter, ReminderQuery, Resolution, SuggestionUpdate,
};

pub(crate) const COLUMNS: &str = "\
    id, question_id, unit_id, learner_id, attempt_no, raw_answer, suggested_score, \
    suggested_feedback, ideal_answer, state, final_score, final_feedback, reviewer_comment, \
    reviewer_id, validated_at, reminder_count, last_reminder_at, created_at, updated_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    unit_id: &str,
    attempt_no: i32,
    answer: &NewPendingAnswer,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO pending_answers (
            id, question_id, unit_id, learner_id, attempt_no, raw_answer, suggested_score,
            suggested_feedback, ideal_answer, state, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)",
    )
    .bind(&answer.id)
    .bind(&answer.question_id)
    .bind(unit_id)
    .bind(learner_id)
    .bind(attempt_no)
    .bind(&answer.raw_answer)
    .bind(answer.suggested_score)
    .bind(&answer.suggested_feedback)
    .bind(&answer.ideal_answer)
    .bind(PendingState::Pending)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    id: &str,
) -> Result<Option<PendingAnswer>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM pending_answers WHERE id = $1");
    sqlx::query_as::<_, PendingAnswer>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn exists_for_attempt(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    question_ids: &[String],
    attempt_no: i32,
) -> Result<bool, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(false);
    }

    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
            SELECT 1 FROM pending_answers
            WHERE learner_id = $1 AND attempt_no = $2 AND question_id = ANY($3)
            UNION ALL
            SELECT 1 FROM graded_answers
            WHERE learner_id = $1 AND attempt_no = $2 AND question_id = ANY($3)
        )",
    )
    .bind(learner_id)
    .bind(attempt_no)
    .bind(question_ids)
    .fetch_one(executor)
    .await
}

pub(crate) async fn resolve(
    pool: &PgPool,
    id: &str,
    resolution: &Resolution,
) -> Result<Option<PendingAnswer>, sqlx::Error> {
    sqlx::query_as::<_, PendingAnswer>(&format!(
        "UPDATE pending_answers
         SET state = $2,
             final_score = $3,
             final_feedback = $4,
             reviewer_comment = $5,
             reviewer_id = $6,
             validated_at = $7,
             updated_at = $7
         WHERE id = $1
           AND state = $8
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(resolution.state)
    .bind(resolution.final_score)
    .bind(&resolution.final_feedback)
    .bind(&resolution.reviewer_comment)
    .bind(&resolution.reviewer_id)
    .bind(resolution.resolved_at)
    .bind(PendingState::Pending)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn attach_suggestion(
    pool: &PgPool,
    id: &str,
    update: &SuggestionUpdate,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE pending_answers
         SET suggested_score = $2,
             suggested_feedback = $3,
             ideal_answer = $4,
             updated_at = $5
         WHERE id = $1
           AND state = $6",
    )
    .bind(id)
    .bind(update.suggested_score)
    .bind(&update.suggested_feedback)
    .bind(&update.ideal_answer)
    .bind(update.updated_at)
    .bind(PendingState::Pending)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PendingFilter) {
    builder.push(" WHERE TRUE");
    if let Some(unit_id) = &filter.unit_id {
        builder.push(" AND unit_id = ");
        builder.push_bind(unit_id.clone());
    }
    if let Some(learner_id) = &filter.learner_id {
        builder.push(" AND learner_id = ");
        builder.push_bind(learner_id.clone());
    }
    if let Some(state) = filter.state {
        builder.push(" AND state = ");
        builder.push_bind(state);
    }
    if let Some(reviewer_id) = &filter.reviewer_id {
        builder.push(" AND unit_id IN (SELECT id FROM quiz_units WHERE reviewer_id = ");
        builder.push_bind(reviewer_id.clone());
        builder.push(")");
    }
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &PendingFilter,
) -> Result<Vec<PendingAnswer>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM pending_answers"));
    push_filter(&mut builder, filter);

    builder.push(" ORDER BY created_at ASC, id ASC OFFSET ");
    builder.push_bind(filter.skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(filter.limit.clamp(1, 1000));

    builder.build_query_as::<PendingAnswer>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &PendingFilter) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM pending_answers");
    push_filter(&mut builder, filter);

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

pub(crate) async fn list_due_reminders(
    pool: &PgPool,
    query: &ReminderQuery,
) -> Result<Vec<PendingAnswer>, sqlx::Error> {
    sqlx::query_as::<_, PendingAnswer>(&format!(
        "SELECT {COLUMNS}
         FROM pending_answers
         WHERE state = $1
           AND created_at < $2
           AND reminder_count < $3
           AND (last_reminder_at IS NULL OR last_reminder_at < $4)
         ORDER BY created_at ASC
         LIMIT $5"
    ))
    .bind(PendingState::Pending)
    .bind(query.created_before)
    .bind(query.reminder_max)
    .bind(query.reminded_before)
    .bind(query.limit)
    .fetch_all(pool)
    .await
}

pub(crate) async fn mark_reminded(
    pool: &PgPool,
    ids: &[String],
    at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "UPDATE pending_answers
         SET reminder_count = reminder_count + 1,
             last_reminder_at = $2
         WHERE id = ANY($1)
           AND state = $3",
    )
    .bind(ids)
    .bind(at)
    .bind(PendingState::Pending)
    .execute(pool)
    .await?;
    Ok(())
}
