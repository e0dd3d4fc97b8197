use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::PageParams;
use crate::core::time::format_primitive;
use crate::db::models::{PendingAnswer, RetryQueueEntry};
use crate::db::types::{AiFailureKind, PendingState, RetryQueueState};

#[derive(Debug, Deserialize)]
pub(crate) struct PendingQueueQuery {
    #[serde(default)]
    pub(crate) unit_id: Option<String>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "crate::api::pagination::default_limit")]
    limit: i64,
}

impl PendingQueueQuery {
    pub(crate) fn page(&self) -> PageParams {
        PageParams::new(self.skip, self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DecisionAction {
    Validate,
    Reject,
    Correct,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct DecisionRequest {
    pub(crate) action: DecisionAction,
    #[serde(default)]
    pub(crate) final_score: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub(crate) final_feedback: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub(crate) comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ValidateBatchRequest {
    #[validate(length(min = 1, max = 200, message = "pending_answer_ids must hold 1 to 200 ids"))]
    pub(crate) pending_answer_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SkippedAnswer {
    pub(crate) id: String,
    pub(crate) reason: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValidateBatchResponse {
    pub(crate) validated: Vec<String>,
    pub(crate) skipped: Vec<SkippedAnswer>,
}

/// Reviewer view of a pending answer, suggestion included.
#[derive(Debug, Serialize)]
pub(crate) struct PendingAnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) unit_id: String,
    pub(crate) learner_id: String,
    pub(crate) attempt_no: i32,
    pub(crate) raw_answer: String,
    pub(crate) suggested_score: Option<i32>,
    pub(crate) suggested_feedback: Option<String>,
    pub(crate) ideal_answer: Option<String>,
    pub(crate) state: PendingState,
    pub(crate) final_score: Option<i32>,
    pub(crate) final_feedback: Option<String>,
    pub(crate) reviewer_comment: Option<String>,
    pub(crate) reviewer_id: Option<String>,
    pub(crate) validated_at: Option<String>,
    pub(crate) reminder_count: i32,
    pub(crate) overdue: bool,
    pub(crate) created_at: String,
}

impl PendingAnswerResponse {
    pub(crate) fn new(answer: PendingAnswer, overdue: bool) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            unit_id: answer.unit_id,
            learner_id: answer.learner_id,
            attempt_no: answer.attempt_no,
            raw_answer: answer.raw_answer,
            suggested_score: answer.suggested_score,
            suggested_feedback: answer.suggested_feedback,
            ideal_answer: answer.ideal_answer,
            state: answer.state,
            final_score: answer.final_score,
            final_feedback: answer.final_feedback,
            reviewer_comment: answer.reviewer_comment,
            reviewer_id: answer.reviewer_id,
            validated_at: answer.validated_at.map(format_primitive),
            reminder_count: answer.reminder_count,
            overdue,
            created_at: format_primitive(answer.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RetryHistoryResponse {
    pub(crate) failure_kind: AiFailureKind,
    pub(crate) retry_count: i32,
    pub(crate) max_attempts: i32,
    pub(crate) state: RetryQueueState,
    pub(crate) last_error: Option<String>,
    pub(crate) last_attempt_at: Option<String>,
}

impl From<RetryQueueEntry> for RetryHistoryResponse {
    fn from(entry: RetryQueueEntry) -> Self {
        Self {
            failure_kind: entry.failure_kind,
            retry_count: entry.retry_count,
            max_attempts: entry.max_attempts,
            state: entry.state,
            last_error: entry.last_error,
            last_attempt_at: entry.last_attempt_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingAnswerDetailResponse {
    #[serde(flatten)]
    pub(crate) answer: PendingAnswerResponse,
    pub(crate) question_text: Option<String>,
    pub(crate) retries: Vec<RetryHistoryResponse>,
}
