use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use time::{Duration, PrimitiveDateTime};

use crate::core::config::Settings;
use crate::core::time::hours_ago;
use crate::db::models::{PendingAnswer, QuizUnit};
use crate::db::types::PendingState;
use crate::repositories::store::{ReminderQuery, Resolution};
use crate::repositories::{AnswerStore, QuizCatalog, StoreError};
use crate::services::notifications::{NoticeBatch, NoticeItem, NoticeKind, Notifier};
use crate::services::retry_state::RetryState;

const DEFAULT_REJECTION: &str = "Your answer does not meet the expectations.";
const REMINDER_SCAN_LIMIT: i64 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReviewDecision {
    /// Accept the stored suggestion as final.
    Validate,
    Reject { comment: Option<String> },
    Correct { final_score: i32, final_feedback: String, comment: Option<String> },
}

impl ReviewDecision {
    fn action(&self) -> &'static str {
        match self {
            ReviewDecision::Validate => "validate",
            ReviewDecision::Reject { .. } => "reject",
            ReviewDecision::Correct { .. } => "correct",
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ReviewError {
    #[error("pending answer {0} not found")]
    NotFound(String),
    #[error("quiz unit {0} not found")]
    UnitNotFound(String),
    #[error("not the reviewer of unit {0}")]
    NotUnitReviewer(String),
    #[error("answer was already {}", .state.as_str())]
    AlreadyProcessed { state: PendingState },
    #[error("final score {0} is outside [0, 100]")]
    InvalidScore(i32),
    #[error("answer has no suggested score to validate")]
    NothingToValidate,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) fn rejection_feedback(comment: Option<&str>) -> String {
    let detail =
        comment.map(str::trim).filter(|comment| !comment.is_empty()).unwrap_or(DEFAULT_REJECTION);
    format!("Incorrect answer. {detail}")
}

/// Pure state transition from `pending` to a terminal state.
pub(crate) fn transition(
    answer: &PendingAnswer,
    decision: &ReviewDecision,
    reviewer_id: &str,
    now: PrimitiveDateTime,
) -> Result<Resolution, ReviewError> {
    if answer.state != PendingState::Pending {
        return Err(ReviewError::AlreadyProcessed { state: answer.state });
    }

    let (state, final_score, final_feedback, reviewer_comment) = match decision {
        ReviewDecision::Validate => {
            let score = answer.suggested_score.ok_or(ReviewError::NothingToValidate)?;
            let feedback = answer.suggested_feedback.clone().unwrap_or_default();
            (PendingState::Validated, score, feedback, None)
        }
        ReviewDecision::Reject { comment } => {
            let comment = comment.clone().filter(|comment| !comment.trim().is_empty());
            (PendingState::Rejected, 0, rejection_feedback(comment.as_deref()), comment)
        }
        ReviewDecision::Correct { final_score, final_feedback, comment } => {
            if !(0..=100).contains(final_score) {
                return Err(ReviewError::InvalidScore(*final_score));
            }
            let comment = comment.clone().filter(|comment| !comment.trim().is_empty());
            (PendingState::Corrected, *final_score, final_feedback.clone(), comment)
        }
    };

    Ok(Resolution {
        state,
        final_score,
        final_feedback,
        reviewer_comment,
        reviewer_id: reviewer_id.to_string(),
        resolved_at: now,
    })
}

pub(crate) fn is_overdue(
    answer: &PendingAnswer,
    now: PrimitiveDateTime,
    overdue_hours: u64,
) -> bool {
    answer.state == PendingState::Pending
        && now - answer.created_at > Duration::hours(overdue_hours as i64)
}

fn learner_notice(answer: &PendingAnswer) -> NoticeItem {
    let score = answer.final_score.unwrap_or(0);
    NoticeItem {
        kind: NoticeKind::Reviewed,
        unit_id: answer.unit_id.clone(),
        question_id: answer.question_id.clone(),
        pending_answer_id: Some(answer.id.clone()),
        message: format!("Your answer was {}: {score}/100", answer.state.as_str()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BatchValidation {
    pub(crate) validated: Vec<String>,
    pub(crate) skipped: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReminderPolicy {
    pub(crate) overdue_hours: u64,
    pub(crate) reminder_max: u32,
    pub(crate) reminder_interval_hours: u64,
}

impl ReminderPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            overdue_hours: settings.grading().pending_overdue_hours,
            reminder_max: settings.grading().reminder_max,
            reminder_interval_hours: settings.grading().reminder_interval_hours,
        }
    }
}

/// Reviewer decisions on pending answers and the reminders that chase them.
pub(crate) struct PendingReviewService {
    catalog: Arc<dyn QuizCatalog>,
    answers: Arc<dyn AnswerStore>,
    notifier: Arc<dyn Notifier>,
    reminders: ReminderPolicy,
}

impl PendingReviewService {
    pub(crate) fn new(
        catalog: Arc<dyn QuizCatalog>,
        answers: Arc<dyn AnswerStore>,
        notifier: Arc<dyn Notifier>,
        reminders: ReminderPolicy,
    ) -> Self {
        Self { catalog, answers, notifier, reminders }
    }

    pub(crate) fn reminder_policy(&self) -> ReminderPolicy {
        self.reminders
    }

    /// Only the reviewer assigned to a unit may see or decide its pending answers.
    pub(crate) async fn ensure_unit_reviewer(
        &self,
        unit_id: &str,
        reviewer_id: &str,
    ) -> Result<(), ReviewError> {
        let unit = self
            .catalog
            .find_unit(unit_id)
            .await?
            .ok_or_else(|| ReviewError::UnitNotFound(unit_id.to_string()))?;
        if unit.reviewer_id.as_deref() != Some(reviewer_id) {
            tracing::warn!(unit_id, reviewer_id, "Review access denied");
            return Err(ReviewError::NotUnitReviewer(unit_id.to_string()));
        }
        Ok(())
    }

    /// Loads a pending answer for its unit's reviewer.
    pub(crate) async fn find_for_reviewer(
        &self,
        id: &str,
        reviewer_id: &str,
    ) -> Result<PendingAnswer, ReviewError> {
        let answer = self
            .answers
            .find_pending(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound(id.to_string()))?;
        self.ensure_unit_reviewer(&answer.unit_id, reviewer_id).await?;
        Ok(answer)
    }

    /// Applies one decision and notifies the learner.
    pub(crate) async fn decide(
        &self,
        id: &str,
        decision: &ReviewDecision,
        reviewer_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<PendingAnswer, ReviewError> {
        let updated = self.apply(id, decision, reviewer_id, now).await?;

        let mut notices = NoticeBatch::new();
        notices.push(&updated.learner_id, learner_notice(&updated));
        notices.flush(self.notifier.as_ref());

        Ok(updated)
    }

    async fn apply(
        &self,
        id: &str,
        decision: &ReviewDecision,
        reviewer_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<PendingAnswer, ReviewError> {
        let answer = self.find_for_reviewer(id, reviewer_id).await?;
        let resolution = transition(&answer, decision, reviewer_id, now)?;

        let Some(updated) = self.answers.resolve_pending(id, &resolution).await? else {
            // Another reviewer got there first.
            let state = self
                .answers
                .find_pending(id)
                .await?
                .map(|current| current.state)
                .unwrap_or(resolution.state);
            return Err(ReviewError::AlreadyProcessed { state });
        };

        metrics::counter!("review_decisions_total", "action" => decision.action()).increment(1);
        tracing::info!(
            pending_answer_id = %id,
            reviewer_id,
            state = updated.state.as_str(),
            final_score = updated.final_score,
            "Pending answer resolved"
        );
        Ok(updated)
    }

    /// Validates every listed answer that still has a suggestion and belongs to a unit
    /// the caller reviews. Learners get one notice each, however many of their answers
    /// were validated.
    pub(crate) async fn validate_many(
        &self,
        ids: &[String],
        reviewer_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<BatchValidation, ReviewError> {
        let mut result = BatchValidation::default();
        let mut notices = NoticeBatch::new();

        for id in ids {
            match self.apply(id, &ReviewDecision::Validate, reviewer_id, now).await {
                Ok(updated) => {
                    notices.push(&updated.learner_id, learner_notice(&updated));
                    result.validated.push(id.clone());
                }
                Err(ReviewError::Store(err)) => return Err(ReviewError::Store(err)),
                Err(err) => result.skipped.push((id.clone(), err.to_string())),
            }
        }

        notices.flush(self.notifier.as_ref());
        Ok(result)
    }

    /// Sends one reminder per reviewer listing their overdue answers. Each answer is
    /// reminded at most `reminder_max` times, `reminder_interval_hours` apart.
    pub(crate) async fn remind_overdue(
        &self,
        now: PrimitiveDateTime,
    ) -> Result<usize, StoreError> {
        let policy = self.reminders;
        let query = ReminderQuery {
            created_before: hours_ago(now, policy.overdue_hours),
            reminded_before: hours_ago(now, policy.reminder_interval_hours),
            reminder_max: i32::try_from(policy.reminder_max).unwrap_or(i32::MAX),
            limit: REMINDER_SCAN_LIMIT,
        };
        let gap = Duration::hours(policy.reminder_interval_hours as i64);
        let due: Vec<PendingAnswer> = self
            .answers
            .list_due_reminders(&query)
            .await?
            .into_iter()
            .filter(|answer| {
                let reminders = RetryState::from_stored(
                    answer.reminder_count,
                    answer.last_reminder_at,
                    query.reminder_max,
                );
                reminders.is_due(now, gap)
            })
            .collect();
        if due.is_empty() {
            return Ok(0);
        }

        let mut units: HashMap<String, Option<QuizUnit>> = HashMap::new();
        let mut notices = NoticeBatch::new();
        let mut reminded = Vec::with_capacity(due.len());

        for answer in &due {
            if !units.contains_key(&answer.unit_id) {
                let unit = self.catalog.find_unit(&answer.unit_id).await?;
                units.insert(answer.unit_id.clone(), unit);
            }
            let reviewer = units.get(&answer.unit_id).and_then(Option::as_ref);
            let Some(reviewer_id) = reviewer.and_then(|unit| unit.reviewer_id.as_deref()) else {
                tracing::warn!(unit_id = %answer.unit_id, "Overdue answer has no reviewer");
                continue;
            };

            let hours = (now - answer.created_at).whole_hours();
            notices.push(
                reviewer_id,
                NoticeItem {
                    kind: NoticeKind::Overdue,
                    unit_id: answer.unit_id.clone(),
                    question_id: answer.question_id.clone(),
                    pending_answer_id: Some(answer.id.clone()),
                    message: format!(
                        "Awaiting review for {hours}h (reminder {} of {})",
                        answer.reminder_count + 1,
                        policy.reminder_max
                    ),
                },
            );
            reminded.push(answer.id.clone());
        }

        let sent = notices.flush(self.notifier.as_ref());
        self.answers.mark_reminded(&reminded, now).await?;
        tracing::info!(reviewers = sent, answers = reminded.len(), "Overdue reminders sent");
        Ok(sent)
    }
}
