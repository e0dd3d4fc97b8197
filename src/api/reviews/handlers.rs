use axum::{
    extract::{Path, Query, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::pagination::PaginatedResponse;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::PendingState;
use crate::repositories::store::PendingFilter;
use crate::schemas::review::{
    DecisionAction, DecisionRequest, PendingAnswerDetailResponse, PendingAnswerResponse,
    PendingQueueQuery, RetryHistoryResponse, SkippedAnswer, ValidateBatchRequest,
    ValidateBatchResponse,
};
use crate::services::pending_review::{self, ReviewDecision};

fn into_decision(payload: DecisionRequest) -> Result<ReviewDecision, ApiError> {
    let decision = match payload.action {
        DecisionAction::Validate => ReviewDecision::Validate,
        DecisionAction::Reject => ReviewDecision::Reject { comment: payload.comment },
        DecisionAction::Correct => {
            let final_score = payload
                .final_score
                .ok_or_else(|| ApiError::validation("final_score is required to correct"))?;
            ReviewDecision::Correct {
                final_score,
                final_feedback: payload.final_feedback.unwrap_or_default(),
                comment: payload.comment,
            }
        }
    };
    Ok(decision)
}

/// Without `unit_id` the queue spans every unit the caller reviews.
pub(in crate::api::reviews) async fn list_pending(
    CurrentUser(reviewer): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<PendingQueueQuery>,
) -> Result<Json<PaginatedResponse<PendingAnswerResponse>>, ApiError> {
    let reviews = state.review_service();
    if let Some(unit_id) = &params.unit_id {
        reviews.ensure_unit_reviewer(unit_id, &reviewer).await?;
    }

    let page = params.page();
    let filter = PendingFilter {
        unit_id: params.unit_id,
        reviewer_id: Some(reviewer),
        state: Some(PendingState::Pending),
        skip: page.skip(),
        limit: page.limit(),
        ..PendingFilter::default()
    };
    let (answers, total_count) = state.stores().answers.list_pending(&filter).await?;

    let overdue_hours = reviews.reminder_policy().overdue_hours;
    let now = primitive_now_utc();
    let items = answers
        .into_iter()
        .map(|answer| {
            let overdue = pending_review::is_overdue(&answer, now, overdue_hours);
            PendingAnswerResponse::new(answer, overdue)
        })
        .collect();

    Ok(Json(page.wrap(items, total_count)))
}

pub(in crate::api::reviews) async fn get_pending_answer(
    Path(pending_answer_id): Path<String>,
    CurrentUser(reviewer): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<PendingAnswerDetailResponse>, ApiError> {
    let reviews = state.review_service();
    let answer = reviews.find_for_reviewer(&pending_answer_id, &reviewer).await?;

    let question_text = state
        .stores()
        .catalog
        .find_question(&answer.question_id)
        .await?
        .map(|question| question.text);
    let retries = state
        .retry_handler()
        .history(&answer.id)
        .await?
        .into_iter()
        .map(RetryHistoryResponse::from)
        .collect();

    let overdue_hours = reviews.reminder_policy().overdue_hours;
    let overdue = pending_review::is_overdue(&answer, primitive_now_utc(), overdue_hours);

    Ok(Json(PendingAnswerDetailResponse {
        answer: PendingAnswerResponse::new(answer, overdue),
        question_text,
        retries,
    }))
}

pub(in crate::api::reviews) async fn decide(
    Path(pending_answer_id): Path<String>,
    CurrentUser(reviewer): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<PendingAnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::validation(e.to_string()))?;
    let decision = into_decision(payload)?;

    let updated = state
        .review_service()
        .decide(&pending_answer_id, &decision, &reviewer, primitive_now_utc())
        .await?;

    Ok(Json(PendingAnswerResponse::new(updated, false)))
}

pub(in crate::api::reviews) async fn validate_batch(
    CurrentUser(reviewer): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ValidateBatchRequest>,
) -> Result<Json<ValidateBatchResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::validation(e.to_string()))?;

    let outcome = state
        .review_service()
        .validate_many(&payload.pending_answer_ids, &reviewer, primitive_now_utc())
        .await?;

    tracing::info!(
        reviewer_id = %reviewer,
        validated = outcome.validated.len(),
        skipped = outcome.skipped.len(),
        "Batch validation finished"
    );

    Ok(Json(ValidateBatchResponse {
        validated: outcome.validated,
        skipped: outcome
            .skipped
            .into_iter()
            .map(|(id, reason)| SkippedAnswer { id, reason })
            .collect(),
    }))
}
