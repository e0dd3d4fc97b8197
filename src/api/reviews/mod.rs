mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(handlers::list_pending))
        .route("/validate-batch", post(handlers::validate_batch))
        .route("/:pending_answer_id", get(handlers::get_pending_answer))
        .route("/:pending_answer_id/decision", post(handlers::decide))
}
