use sqlx::PgPool;

use crate::db::models::QuizUnit;

pub(crate) const COLUMNS: &str = "\
    id, course_id, title, max_attempts, pass_threshold, reviewer_id, content_html, \
    document_key, created_at, updated_at";

pub(crate) async fn find_by_id(
    pool: &PgPool,
    unit_id: &str,
) -> Result<Option<QuizUnit>, sqlx::Error> {
    sqlx::query_as::<_, QuizUnit>(&format!("SELECT {COLUMNS} FROM quiz_units WHERE id = $1"))
        .bind(unit_id)
        .fetch_optional(pool)
        .await
}
