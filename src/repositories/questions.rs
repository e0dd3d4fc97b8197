use sqlx::PgPool;

use crate::db::models::QuestionRow;

pub(crate) const COLUMNS: &str = "\
    id, unit_id, question_text, question_type, correction_mode, ai_enabled, keyword_rules, \
    choices, order_index";

pub(crate) async fn list_by_unit(
    pool: &PgPool,
    unit_id: &str,
) -> Result<Vec<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {COLUMNS}
         FROM quiz_questions
         WHERE unit_id = $1
         ORDER BY order_index ASC, id ASC"
    ))
    .bind(unit_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn find_by_id(
    pool: &PgPool,
    question_id: &str,
) -> Result<Option<QuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, QuestionRow>(&format!("SELECT {COLUMNS} FROM quiz_questions WHERE id = $1"))
        .bind(question_id)
        .fetch_optional(pool)
        .await
}
