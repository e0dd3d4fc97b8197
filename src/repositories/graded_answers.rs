use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::GradedAnswer;
use crate::repositories::store::NewGradedAnswer;

pub(crate) const COLUMNS: &str = "\
    id, question_id, unit_id, learner_id, attempt_no, raw_answer, score, is_correct, \
    feedback, created_at";

pub(crate) async fn insert(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    unit_id: &str,
    attempt_no: i32,
    answer: &NewGradedAnswer,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO graded_answers (
            id, question_id, unit_id, learner_id, attempt_no, raw_answer, score, is_correct,
            feedback, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)",
    )
    .bind(&answer.id)
    .bind(&answer.question_id)
    .bind(unit_id)
    .bind(learner_id)
    .bind(attempt_no)
    .bind(&answer.raw_answer)
    .bind(answer.score)
    .bind(answer.is_correct)
    .bind(&answer.feedback)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn list_by_learner(
    pool: &PgPool,
    learner_id: &str,
    unit_id: Option<&str>,
) -> Result<Vec<GradedAnswer>, sqlx::Error> {
    sqlx::query_as::<_, GradedAnswer>(&format!(
        "SELECT {COLUMNS}
         FROM graded_answers
         WHERE learner_id = $1
           AND ($2::text IS NULL OR unit_id = $2)
         ORDER BY created_at ASC, id ASC"
    ))
    .bind(learner_id)
    .bind(unit_id)
    .fetch_all(pool)
    .await
}
