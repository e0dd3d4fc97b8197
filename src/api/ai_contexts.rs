use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::ai_context::AiContextResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/:unit_id/regenerate", post(regenerate_context))
}

/// Re-indexes the unit content with the AI service, ignoring any cached context.
async fn regenerate_context(
    Path(unit_id): Path<String>,
    CurrentUser(reviewer): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AiContextResponse>, ApiError> {
    let unit = state
        .stores()
        .catalog
        .find_unit(&unit_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Quiz unit not found".to_string()))?;
    state.review_service().ensure_unit_reviewer(&unit.id, &reviewer).await?;

    let context = state.context_manager().regenerate(&unit, primitive_now_utc()).await?;
    tracing::info!(
        unit_id = %unit.id,
        reviewer_id = %reviewer,
        context_id = %context.context_id,
        "AI context regenerated on request"
    );

    Ok(Json(context.into()))
}
