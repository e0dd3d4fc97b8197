use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::db::models::{Question, QuestionKind, QuizUnit};
use crate::repositories::store::{NewAttempt, NewGradedAnswer, NewPendingAnswer};
use crate::repositories::{AnswerStore, QuizCatalog, StoreError};
use crate::services::notifications::{NoticeBatch, NoticeItem, NoticeKind, Notifier};
use crate::services::question_corrector::{CorrectionOutcome, QuestionCorrector, RawAnswer};
use crate::services::result_aggregator::{self, QuizResult};
use crate::services::retry_fallback::FallbackLog;

#[derive(Debug, Error)]
pub(crate) enum SubmissionError {
    #[error("{0}")]
    Validation(String),
    #[error("this attempt has already been submitted")]
    DuplicateSubmission,
    #[error("maximum number of attempts ({max}) reached")]
    MaxAttemptsReached { max: i32 },
    #[error("quiz unit {0} not found")]
    UnitNotFound(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SubmissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => SubmissionError::DuplicateSubmission,
            other => SubmissionError::Store(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnswerInput {
    pub(crate) question_id: String,
    pub(crate) choice_id: Option<String>,
    pub(crate) text: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Submission {
    pub(crate) learner_id: String,
    pub(crate) unit_id: String,
    pub(crate) attempt_no: i32,
    pub(crate) answers: Vec<AnswerInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuestionResult {
    pub(crate) question_id: String,
    pub(crate) graded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) is_correct: Option<bool>,
    pub(crate) feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SubmissionResult {
    #[serde(flatten)]
    pub(crate) result: QuizResult,
    pub(crate) attempt_no: i32,
    pub(crate) max_attempts: i32,
    pub(crate) per_question: Vec<QuestionResult>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SubmissionPolicy {
    pub(crate) quiz_pass_threshold: u32,
    pub(crate) ai_retry_max_attempts: u32,
}

impl SubmissionPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            quiz_pass_threshold: settings.grading().quiz_pass_threshold,
            ai_retry_max_attempts: settings.grading().ai_retry_max_attempts,
        }
    }

    fn pass_threshold(&self, unit: &QuizUnit) -> u32 {
        unit.pass_threshold
            .map(|threshold| threshold.clamp(0, 100) as u32)
            .unwrap_or(self.quiz_pass_threshold)
    }
}

/// Maps answers onto the unit's questions. Unanswered questions are skipped.
fn collect_answers(
    questions: &[Question],
    answers: &[AnswerInput],
) -> Result<HashMap<String, RawAnswer>, SubmissionError> {
    let by_id: HashMap<&str, &Question> =
        questions.iter().map(|question| (question.id.as_str(), question)).collect();
    let mut seen = HashSet::new();
    let mut collected = HashMap::new();

    for answer in answers {
        let Some(question) = by_id.get(answer.question_id.as_str()) else {
            return Err(SubmissionError::Validation(format!(
                "question {} does not belong to this unit",
                answer.question_id
            )));
        };
        if !seen.insert(answer.question_id.as_str()) {
            return Err(SubmissionError::Validation(format!(
                "question {} is answered more than once",
                answer.question_id
            )));
        }

        let raw = match (&question.kind, &answer.choice_id, &answer.text) {
            (_, Some(_), Some(_)) => {
                return Err(SubmissionError::Validation(format!(
                    "question {} takes either choice_id or text, not both",
                    answer.question_id
                )));
            }
            (_, None, None) => RawAnswer::Skipped,
            (QuestionKind::Choice { .. }, Some(choice_id), None) => {
                if question.find_option(choice_id).is_none() {
                    return Err(SubmissionError::Validation(format!(
                        "choice {choice_id} is not an option of question {}",
                        answer.question_id
                    )));
                }
                RawAnswer::Choice(choice_id.clone())
            }
            (QuestionKind::OpenText { .. }, None, Some(text)) => RawAnswer::Text(text.clone()),
            (QuestionKind::Choice { .. }, None, Some(_)) => {
                return Err(SubmissionError::Validation(format!(
                    "question {} expects a choice_id",
                    answer.question_id
                )));
            }
            (QuestionKind::OpenText { .. }, Some(_), None) => {
                return Err(SubmissionError::Validation(format!(
                    "question {} expects a text answer",
                    answer.question_id
                )));
            }
        };
        collected.insert(answer.question_id.clone(), raw);
    }

    Ok(collected)
}

/// Accepts one quiz attempt: checks it, corrects every question and persists the
/// outcome set atomically.
pub(crate) struct SubmissionIngestor {
    catalog: Arc<dyn QuizCatalog>,
    answers: Arc<dyn AnswerStore>,
    corrector: QuestionCorrector,
    notifier: Arc<dyn Notifier>,
    policy: SubmissionPolicy,
}

impl SubmissionIngestor {
    pub(crate) fn new(
        catalog: Arc<dyn QuizCatalog>,
        answers: Arc<dyn AnswerStore>,
        corrector: QuestionCorrector,
        notifier: Arc<dyn Notifier>,
        policy: SubmissionPolicy,
    ) -> Self {
        Self { catalog, answers, corrector, notifier, policy }
    }

    pub(crate) async fn submit(
        &self,
        submission: &Submission,
        now: PrimitiveDateTime,
    ) -> Result<SubmissionResult, SubmissionError> {
        let result = self.ingest(submission, now).await;
        let status = match &result {
            Ok(_) => "accepted",
            Err(SubmissionError::DuplicateSubmission) => "duplicate",
            Err(SubmissionError::MaxAttemptsReached { .. }) => "max_attempts",
            Err(SubmissionError::Validation(_)) | Err(SubmissionError::UnitNotFound(_)) => {
                "invalid"
            }
            Err(SubmissionError::Store(_)) => "error",
        };
        metrics::counter!("submissions_total", "status" => status).increment(1);
        result
    }

    async fn ingest(
        &self,
        submission: &Submission,
        now: PrimitiveDateTime,
    ) -> Result<SubmissionResult, SubmissionError> {
        if submission.attempt_no < 1 {
            return Err(SubmissionError::Validation("attempt_no must be at least 1".into()));
        }

        let unit = self
            .catalog
            .find_unit(&submission.unit_id)
            .await?
            .ok_or_else(|| SubmissionError::UnitNotFound(submission.unit_id.clone()))?;
        let questions = self.catalog.list_questions(&unit.id).await?;
        if questions.is_empty() {
            return Err(SubmissionError::Validation("quiz unit has no questions".into()));
        }
        let mut raw_answers = collect_answers(&questions, &submission.answers)?;

        if unit.max_attempts > 0 && submission.attempt_no > unit.max_attempts {
            return Err(SubmissionError::MaxAttemptsReached { max: unit.max_attempts });
        }

        let recorded = self.answers.attempt_count(&submission.learner_id, &unit.id).await?;
        if submission.attempt_no <= recorded {
            return Err(SubmissionError::DuplicateSubmission);
        }
        if submission.attempt_no > recorded + 1 {
            return Err(SubmissionError::Validation(format!(
                "attempt {} is out of sequence; next attempt is {}",
                submission.attempt_no,
                recorded + 1
            )));
        }
        let question_ids: Vec<String> =
            questions.iter().map(|question| question.id.clone()).collect();
        if self
            .answers
            .attempt_has_records(&submission.learner_id, &question_ids, submission.attempt_no)
            .await?
        {
            return Err(SubmissionError::DuplicateSubmission);
        }

        let mut fallback = FallbackLog::new(self.policy.ai_retry_max_attempts);
        let mut outcomes = Vec::with_capacity(questions.len());
        let mut per_question = Vec::with_capacity(questions.len());
        let mut pending = Vec::new();
        let mut graded = Vec::new();
        let mut pending_ids = HashMap::new();
        let mut notices = NoticeBatch::new();

        for question in &questions {
            let raw = raw_answers.remove(&question.id).unwrap_or(RawAnswer::Skipped);
            let outcome = self.corrector.correct(&unit, question, &raw, &mut fallback, now).await;

            match &outcome {
                CorrectionOutcome::Graded { score, is_correct, feedback } => {
                    graded.push(NewGradedAnswer {
                        id: Uuid::new_v4().to_string(),
                        question_id: question.id.clone(),
                        raw_answer: raw.stored(),
                        score: *score,
                        is_correct: *is_correct,
                        feedback: feedback.clone(),
                    });
                }
                CorrectionOutcome::Pending { suggestion, .. } => {
                    let id = Uuid::new_v4().to_string();
                    pending_ids.insert(question.id.clone(), id.clone());
                    match unit.reviewer_id.as_deref() {
                        Some(reviewer_id) => notices.push(
                            reviewer_id,
                            NoticeItem {
                                kind: NoticeKind::PendingReview,
                                unit_id: unit.id.clone(),
                                question_id: question.id.clone(),
                                pending_answer_id: Some(id.clone()),
                                message: format!(
                                    "Learner {} attempt {} awaits review",
                                    submission.learner_id, submission.attempt_no
                                ),
                            },
                        ),
                        None => tracing::warn!(
                            unit_id = %unit.id,
                            question_id = %question.id,
                            "Pending answer has no reviewer to notify"
                        ),
                    }
                    pending.push(NewPendingAnswer {
                        id,
                        question_id: question.id.clone(),
                        raw_answer: raw.stored().unwrap_or_default(),
                        suggested_score: suggestion.as_ref().map(|s| s.score),
                        suggested_feedback: suggestion.as_ref().map(|s| s.feedback.clone()),
                        ideal_answer: suggestion.as_ref().and_then(|s| s.ideal_answer.clone()),
                    });
                }
            }

            per_question.push(QuestionResult {
                question_id: question.id.clone(),
                graded: outcome.is_graded(),
                score: outcome.score(),
                is_correct: outcome.is_correct(),
                feedback: outcome.feedback().to_string(),
            });
            outcomes.push(outcome);
        }

        let retries =
            fallback.into_entries(&pending_ids, unit.reviewer_id.as_deref(), &mut notices);
        let attempt = NewAttempt {
            learner_id: submission.learner_id.clone(),
            unit_id: unit.id.clone(),
            attempt_no: submission.attempt_no,
            pending,
            graded,
            retries,
            created_at: now,
        };
        // A conflict here means a concurrent submission of the same attempt won.
        self.answers.record_attempt(&attempt).await?;

        notices.flush(self.notifier.as_ref());

        let result = result_aggregator::aggregate(&outcomes, self.policy.pass_threshold(&unit));
        tracing::info!(
            learner_id = %submission.learner_id,
            unit_id = %unit.id,
            attempt_no = submission.attempt_no,
            percentage = result.percentage,
            pending_count = result.pending_count,
            "Submission recorded"
        );

        Ok(SubmissionResult {
            result,
            attempt_no: submission.attempt_no,
            max_attempts: unit.max_attempts,
            per_question,
        })
    }
}
