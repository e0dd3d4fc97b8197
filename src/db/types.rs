use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    Choice,
    TrueFalse,
    OpenText,
}

impl QuestionType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            QuestionType::Choice => "choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::OpenText => "open_text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "correction_mode", rename_all = "lowercase")]
pub(crate) enum CorrectionMode {
    Automatic,
    Manual,
}

impl CorrectionMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            CorrectionMode::Automatic => "automatic",
            CorrectionMode::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "pending_state", rename_all = "lowercase")]
pub(crate) enum PendingState {
    Pending,
    Validated,
    Rejected,
    Corrected,
}

impl PendingState {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            PendingState::Pending => "pending",
            PendingState::Validated => "validated",
            PendingState::Rejected => "rejected",
            PendingState::Corrected => "corrected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ai_failure_kind", rename_all = "snake_case")]
pub(crate) enum AiFailureKind {
    ContextUnavailable,
    Timeout,
    ServiceError,
}

impl AiFailureKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AiFailureKind::ContextUnavailable => "context_unavailable",
            AiFailureKind::Timeout => "timeout",
            AiFailureKind::ServiceError => "service_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "retry_queue_state", rename_all = "lowercase")]
pub(crate) enum RetryQueueState {
    Queued,
    Processing,
    Done,
    Exhausted,
}
