use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::types::{
    AiFailureKind, CorrectionMode, PendingState, QuestionType, RetryQueueState,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuizUnit {
    pub(crate) id: String,
    pub(crate) course_id: String,
    pub(crate) title: String,
    pub(crate) max_attempts: i32,
    pub(crate) pass_threshold: Option<i32>,
    pub(crate) reviewer_id: Option<String>,
    pub(crate) content_html: Option<String>,
    pub(crate) document_key: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KeywordRule {
    pub(crate) keyword: String,
    pub(crate) weight: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum KeywordCategory {
    Required,
    Bonus,
    Forbidden,
}

impl KeywordRule {
    pub(crate) fn category(&self) -> KeywordCategory {
        if self.weight > 15 {
            KeywordCategory::Required
        } else if self.weight < 0 {
            KeywordCategory::Forbidden
        } else {
            KeywordCategory::Bonus
        }
    }

    fn check(&self) -> Result<(), QuestionDefinitionError> {
        if self.keyword.trim().is_empty() {
            return Err(QuestionDefinitionError::BlankKeyword);
        }
        if self.weight == 0 || self.weight.abs() > 100 {
            return Err(QuestionDefinitionError::KeywordWeight {
                keyword: self.keyword.clone(),
                weight: self.weight,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChoiceOption {
    pub(crate) id: String,
    pub(crate) text: String,
    pub(crate) is_correct: bool,
    #[serde(default)]
    pub(crate) comment: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct QuestionRow {
    pub(crate) id: String,
    pub(crate) unit_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) correction_mode: CorrectionMode,
    pub(crate) ai_enabled: bool,
    pub(crate) keyword_rules: Json<Vec<KeywordRule>>,
    pub(crate) choices: Json<Vec<ChoiceOption>>,
    pub(crate) order_index: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum QuestionDefinitionError {
    #[error("keyword rule has a blank keyword")]
    BlankKeyword,
    #[error("keyword '{keyword}' has weight {weight}; expected non-zero and within [-100, 100]")]
    KeywordWeight { keyword: String, weight: i32 },
    #[error("choice question has no options")]
    NoOptions,
    #[error("true/false question must have exactly two options, found {0}")]
    TrueFalseOptions(usize),
}

/// How a choice question is presented; scoring is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChoiceStyle {
    Choice,
    TrueFalse,
}

/// Review path for an open-text answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextReview {
    Keywords,
    Manual,
    AiAssisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QuestionKind {
    Choice { style: ChoiceStyle, mode: CorrectionMode, options: Vec<ChoiceOption> },
    OpenText { review: TextReview, rules: Vec<KeywordRule> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) unit_id: String,
    pub(crate) text: String,
    pub(crate) order_index: i32,
    pub(crate) kind: QuestionKind,
}

impl Question {
    pub(crate) fn question_type(&self) -> QuestionType {
        match &self.kind {
            QuestionKind::Choice { style: ChoiceStyle::Choice, .. } => QuestionType::Choice,
            QuestionKind::Choice { style: ChoiceStyle::TrueFalse, .. } => QuestionType::TrueFalse,
            QuestionKind::OpenText { .. } => QuestionType::OpenText,
        }
    }

    pub(crate) fn correction_mode(&self) -> CorrectionMode {
        match &self.kind {
            QuestionKind::Choice { mode, .. } => *mode,
            QuestionKind::OpenText { review: TextReview::Keywords, .. } => {
                CorrectionMode::Automatic
            }
            QuestionKind::OpenText { .. } => CorrectionMode::Manual,
        }
    }

    pub(crate) fn is_choice(&self) -> bool {
        matches!(self.kind, QuestionKind::Choice { .. })
    }

    pub(crate) fn keyword_rules(&self) -> &[KeywordRule] {
        match &self.kind {
            QuestionKind::OpenText { rules, .. } => rules,
            QuestionKind::Choice { .. } => &[],
        }
    }

    pub(crate) fn find_option(&self, option_id: &str) -> Option<&ChoiceOption> {
        match &self.kind {
            QuestionKind::Choice { options, .. } => {
                options.iter().find(|option| option.id == option_id)
            }
            QuestionKind::OpenText { .. } => None,
        }
    }
}

impl TryFrom<QuestionRow> for Question {
    type Error = QuestionDefinitionError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let kind = match row.question_type {
            QuestionType::Choice | QuestionType::TrueFalse => {
                let options = row.choices.0;
                let style = if row.question_type == QuestionType::TrueFalse {
                    if options.len() != 2 {
                        return Err(QuestionDefinitionError::TrueFalseOptions(options.len()));
                    }
                    ChoiceStyle::TrueFalse
                } else {
                    ChoiceStyle::Choice
                };
                if options.is_empty() {
                    return Err(QuestionDefinitionError::NoOptions);
                }
                QuestionKind::Choice { style, mode: row.correction_mode, options }
            }
            QuestionType::OpenText => {
                let rules = row.keyword_rules.0;
                for rule in &rules {
                    rule.check()?;
                }
                let review = match (row.correction_mode, row.ai_enabled) {
                    (CorrectionMode::Automatic, _) => TextReview::Keywords,
                    (CorrectionMode::Manual, false) => TextReview::Manual,
                    (CorrectionMode::Manual, true) => TextReview::AiAssisted,
                };
                QuestionKind::OpenText { review, rules }
            }
        };

        Ok(Question {
            id: row.id,
            unit_id: row.unit_id,
            text: row.question_text,
            order_index: row.order_index,
            kind,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PendingAnswer {
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
    pub(crate) validated_at: Option<PrimitiveDateTime>,
    pub(crate) reminder_count: i32,
    pub(crate) last_reminder_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GradedAnswer {
    pub(crate) id: String,
    pub(crate) question_id: String,
    pub(crate) unit_id: String,
    pub(crate) learner_id: String,
    pub(crate) attempt_no: i32,
    pub(crate) raw_answer: Option<String>,
    pub(crate) score: i32,
    pub(crate) is_correct: bool,
    pub(crate) feedback: String,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AiContext {
    pub(crate) unit_id: String,
    pub(crate) context_id: String,
    pub(crate) file_id: String,
    pub(crate) content_fingerprint: String,
    pub(crate) expires_at: PrimitiveDateTime,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct RetryQueueEntry {
    pub(crate) id: String,
    pub(crate) pending_answer_id: String,
    pub(crate) question_id: String,
    pub(crate) unit_id: String,
    pub(crate) learner_id: String,
    pub(crate) raw_answer: String,
    pub(crate) failure_kind: AiFailureKind,
    pub(crate) retry_count: i32,
    pub(crate) max_attempts: i32,
    pub(crate) last_attempt_at: Option<PrimitiveDateTime>,
    pub(crate) state: RetryQueueState,
    pub(crate) last_error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}
