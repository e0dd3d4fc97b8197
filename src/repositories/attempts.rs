use sqlx::{PgConnection, PgPool};
use time::PrimitiveDateTime;

pub(crate) async fn current_count(
    pool: &PgPool,
    learner_id: &str,
    unit_id: &str,
) -> Result<i32, sqlx::Error> {
    let count = sqlx::query_scalar::<_, i32>(
        "SELECT attempts_count FROM quiz_attempts WHERE learner_id = $1 AND unit_id = $2",
    )
    .bind(learner_id)
    .bind(unit_id)
    .fetch_optional(pool)
    .await?;

    Ok(count.unwrap_or(0))
}

/// Moves the counter to `attempt_no` only if it currently sits at `attempt_no - 1`.
/// Returns false when a concurrent submission got there first.
pub(crate) async fn advance(
    conn: &mut PgConnection,
    learner_id: &str,
    unit_id: &str,
    attempt_no: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let query = if attempt_no == 1 {
        sqlx::query(
            "INSERT INTO quiz_attempts (learner_id, unit_id, attempts_count, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (learner_id, unit_id) DO UPDATE
                 SET attempts_count = EXCLUDED.attempts_count,
                     updated_at = EXCLUDED.updated_at
                 WHERE quiz_attempts.attempts_count = 0",
        )
    } else {
        sqlx::query(
            "UPDATE quiz_attempts
             SET attempts_count = $3,
                 updated_at = $4
             WHERE learner_id = $1
               AND unit_id = $2
               AND attempts_count = $3 - 1",
        )
    };

    let result =
        query.bind(learner_id).bind(unit_id).bind(attempt_no).bind(now).execute(conn).await?;

    Ok(result.rows_affected() == 1)
}
