use sqlx::PgPool;

use crate::db::models::AiContext;

pub(crate) async fn find_by_unit(
    pool: &PgPool,
    unit_id: &str,
) -> Result<Option<AiContext>, sqlx::Error> {
    sqlx::query_as::<_, AiContext>(
        "SELECT unit_id, context_id, file_id, content_fingerprint, expires_at, created_at
         FROM ai_contexts
         WHERE unit_id = $1",
    )
    .bind(unit_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn upsert(pool: &PgPool, context: &AiContext) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO ai_contexts
            (unit_id, context_id, file_id, content_fingerprint, expires_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         ON CONFLICT (unit_id) DO UPDATE
             SET context_id = EXCLUDED.context_id,
                 file_id = EXCLUDED.file_id,
                 content_fingerprint = EXCLUDED.content_fingerprint,
                 expires_at = EXCLUDED.expires_at,
                 created_at = EXCLUDED.created_at",
    )
    .bind(&context.unit_id)
    .bind(&context.context_id)
    .bind(&context.file_id)
    .bind(&context.content_fingerprint)
    .bind(context.expires_at)
    .bind(context.created_at)
    .execute(pool)
    .await?;
    Ok(())
}
