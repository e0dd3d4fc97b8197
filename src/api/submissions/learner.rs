use axum::{
    extract::{Query, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::redis::SubmitClaim;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories::store::PendingFilter;
use crate::schemas::submission::{
    LearnerAnswerResponse, MyResultsQuery, MyResultsResponse, PendingCountQuery,
    PendingCountResponse, SubmitRequest,
};
use crate::services::result_aggregator;
use crate::services::submission_ingest::{Submission, SubmissionError, SubmissionResult};

const RESULTS_LIMIT: i64 = 1000;

/// Grades one attempt while holding its Redis claim. A concurrent request for the same
/// attempt gets the same answer storage would give it: `DuplicateSubmission`.
async fn submit_claimed(
    state: &AppState,
    submission: &Submission,
) -> Result<SubmissionResult, ApiError> {
    let redis = state.redis();
    let (learner, unit, attempt) =
        (&submission.learner_id, &submission.unit_id, submission.attempt_no);
    let ttl = state.settings().grading().submit_claim_ttl_seconds;

    let claim = redis.claim_submission(learner, unit, attempt, ttl).await.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "Submit claim unavailable; relying on storage guard");
        SubmitClaim::Unguarded
    });
    if claim == SubmitClaim::Taken {
        return Err(SubmissionError::DuplicateSubmission.into());
    }

    let result = state.submission_ingestor().submit(submission, primitive_now_utc()).await;

    if claim == SubmitClaim::Held {
        if let Err(err) = redis.release_submission(learner, unit, attempt).await {
            tracing::warn!(error = %err, learner_id = %learner, "Failed to release submit claim");
        }
    }
    Ok(result?)
}

pub(in crate::api::submissions) async fn submit_quiz(
    caller: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmissionResult>, ApiError> {
    payload.validate().map_err(|e| ApiError::validation(e.to_string()))?;
    caller.ensure_is(&payload.learner_id)?;

    let submission = payload.into_submission();
    let result = submit_claimed(&state, &submission).await?;

    tracing::info!(
        learner_id = %submission.learner_id,
        unit_id = %submission.unit_id,
        attempt_no = submission.attempt_no,
        percentage = result.result.percentage,
        pending_count = result.result.pending_count,
        "Quiz submission graded"
    );

    Ok(Json(result))
}

pub(in crate::api::submissions) async fn pending_count(
    CurrentUser(subject): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<PendingCountQuery>,
) -> Result<Json<PendingCountResponse>, ApiError> {
    let pending_count =
        state.stores().answers.count_pending(&subject, params.unit_id.as_deref()).await?;
    Ok(Json(PendingCountResponse { pending_count }))
}

pub(in crate::api::submissions) async fn my_results(
    CurrentUser(subject): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<MyResultsQuery>,
) -> Result<Json<MyResultsResponse>, ApiError> {
    let answers = &state.stores().answers;
    let filter = PendingFilter {
        unit_id: params.unit_id.clone(),
        learner_id: Some(subject.clone()),
        limit: RESULTS_LIMIT,
        ..PendingFilter::default()
    };
    let (pending, _) = answers.list_pending(&filter).await?;
    let graded = answers.list_graded(&subject, params.unit_id.as_deref()).await?;

    let stats = result_aggregator::learner_stats(&pending, &graded);

    let mut items: Vec<LearnerAnswerResponse> = pending
        .into_iter()
        .map(LearnerAnswerResponse::from)
        .chain(graded.into_iter().map(LearnerAnswerResponse::from))
        .filter(|item| params.state.map_or(true, |wanted| item.status == wanted))
        .collect();
    items.sort_by(|a, b| {
        b.attempt_no.cmp(&a.attempt_no).then_with(|| a.question_id.cmp(&b.question_id))
    });

    Ok(Json(MyResultsResponse { items, stats }))
}
