mod learner;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(learner::submit_quiz))
        .route("/pending-count", get(learner::pending_count))
        .route("/my-results", get(learner::my_results))
}
