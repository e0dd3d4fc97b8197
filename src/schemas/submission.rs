use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{GradedAnswer, PendingAnswer};
use crate::db::types::PendingState;
use crate::services::result_aggregator::LearnerStats;
use crate::services::submission_ingest::{AnswerInput, Submission};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct AnswerPayload {
    #[validate(length(min = 1, max = 64, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) choice_id: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20000))]
    pub(crate) text: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitRequest {
    #[validate(length(min = 1, max = 64, message = "learner_id must not be empty"))]
    pub(crate) learner_id: String,
    #[validate(length(min = 1, max = 64, message = "unit_id must not be empty"))]
    pub(crate) unit_id: String,
    #[validate(range(min = 1, message = "attempt_no must be positive"))]
    pub(crate) attempt_no: i32,
    #[validate(length(min = 1, max = 500, message = "answers must not be empty"))]
    #[validate(nested)]
    pub(crate) answers: Vec<AnswerPayload>,
}

impl SubmitRequest {
    pub(crate) fn into_submission(self) -> Submission {
        Submission {
            learner_id: self.learner_id,
            unit_id: self.unit_id,
            attempt_no: self.attempt_no,
            answers: self
                .answers
                .into_iter()
                .map(|answer| AnswerInput {
                    question_id: answer.question_id,
                    choice_id: answer.choice_id,
                    text: answer.text,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PendingCountQuery {
    #[serde(default)]
    pub(crate) unit_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PendingCountResponse {
    pub(crate) pending_count: i64,
}

/// What a learner sees for one answer. `graded` covers answers scored at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ResultStatus {
    Pending,
    Validated,
    Rejected,
    Corrected,
    Graded,
}

impl From<PendingState> for ResultStatus {
    fn from(state: PendingState) -> Self {
        match state {
            PendingState::Pending => ResultStatus::Pending,
            PendingState::Validated => ResultStatus::Validated,
            PendingState::Rejected => ResultStatus::Rejected,
            PendingState::Corrected => ResultStatus::Corrected,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MyResultsQuery {
    #[serde(default)]
    pub(crate) unit_id: Option<String>,
    #[serde(default)]
    pub(crate) state: Option<ResultStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LearnerAnswerResponse {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) unit_id: String,
    pub(crate) attempt_no: i32,
    pub(crate) status: ResultStatus,
    pub(crate) score: Option<i32>,
    pub(crate) feedback: Option<String>,
    pub(crate) submitted_at: String,
    pub(crate) resolved_at: Option<String>,
}

impl From<PendingAnswer> for LearnerAnswerResponse {
    // Suggestions and reviewer notes stay with reviewers until a decision lands.
    fn from(answer: PendingAnswer) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            unit_id: answer.unit_id,
            attempt_no: answer.attempt_no,
            status: answer.state.into(),
            score: answer.final_score,
            feedback: answer.final_feedback,
            submitted_at: format_primitive(answer.created_at),
            resolved_at: answer.validated_at.map(format_primitive),
        }
    }
}

impl From<GradedAnswer> for LearnerAnswerResponse {
    fn from(answer: GradedAnswer) -> Self {
        Self {
            id: answer.id,
            question_id: answer.question_id,
            unit_id: answer.unit_id,
            attempt_no: answer.attempt_no,
            status: ResultStatus::Graded,
            score: Some(answer.score),
            feedback: Some(answer.feedback),
            submitted_at: format_primitive(answer.created_at),
            resolved_at: Some(format_primitive(answer.created_at)),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MyResultsResponse {
    pub(crate) items: Vec<LearnerAnswerResponse>,
    pub(crate) stats: LearnerStats,
}
