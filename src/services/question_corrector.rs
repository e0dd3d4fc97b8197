use time::PrimitiveDateTime;

use crate::core::config::Settings;
use crate::db::models::{ChoiceOption, KeywordRule, Question, QuestionKind, QuizUnit, TextReview};
use crate::db::types::CorrectionMode;
use crate::services::ai_correction::{AiAssistedCorrector, AiSuggestion, CorrectionFailure};
use crate::services::keyword_scoring;
use crate::services::retry_fallback::FallbackLog;

const NO_ANSWER: &str = "No answer provided.";
const INVALID_ANSWER: &str = "Invalid answer.";
const MANUAL_CHOICE_PENDING: &str =
    "Your answer has been recorded and will be validated by your instructor.";
const MANUAL_TEXT_PENDING: &str = "Your answer will be reviewed by an instructor.";
const AI_PENDING: &str = "Your answer has been analysed and is awaiting validation by your \
                          instructor. You will be notified of the result.";
const AI_FALLBACK_PENDING: &str = "Your answer will be corrected manually by your instructor.";

/// A learner's answer to one question as submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawAnswer {
    Skipped,
    Choice(String),
    Text(String),
}

impl RawAnswer {
    /// Value persisted alongside the outcome.
    pub(crate) fn stored(&self) -> Option<String> {
        match self {
            RawAnswer::Skipped => None,
            RawAnswer::Choice(id) => Some(id.clone()),
            RawAnswer::Text(text) => Some(text.clone()),
        }
    }
}

/// Reviewer-only proposal attached to a pending answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Suggestion {
    pub(crate) score: i32,
    pub(crate) feedback: String,
    pub(crate) ideal_answer: Option<String>,
}

impl From<AiSuggestion> for Suggestion {
    fn from(value: AiSuggestion) -> Self {
        Self { score: value.score, feedback: value.feedback, ideal_answer: value.ideal_answer }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CorrectionOutcome {
    Graded { score: i32, is_correct: bool, feedback: String },
    /// Hidden from the learner until a reviewer decides.
    Pending { suggestion: Option<Suggestion>, feedback: String },
}

impl CorrectionOutcome {
    fn graded(score: i32, is_correct: bool, feedback: impl Into<String>) -> Self {
        CorrectionOutcome::Graded { score, is_correct, feedback: feedback.into() }
    }

    fn pending(suggestion: Option<Suggestion>, feedback: impl Into<String>) -> Self {
        CorrectionOutcome::Pending { suggestion, feedback: feedback.into() }
    }

    pub(crate) fn is_graded(&self) -> bool {
        matches!(self, CorrectionOutcome::Graded { .. })
    }

    pub(crate) fn pending_record_required(&self) -> bool {
        matches!(self, CorrectionOutcome::Pending { .. })
    }

    pub(crate) fn score(&self) -> Option<i32> {
        match self {
            CorrectionOutcome::Graded { score, .. } => Some(*score),
            CorrectionOutcome::Pending { .. } => None,
        }
    }

    pub(crate) fn is_correct(&self) -> Option<bool> {
        match self {
            CorrectionOutcome::Graded { is_correct, .. } => Some(*is_correct),
            CorrectionOutcome::Pending { .. } => None,
        }
    }

    pub(crate) fn feedback(&self) -> &str {
        match self {
            CorrectionOutcome::Graded { feedback, .. }
            | CorrectionOutcome::Pending { feedback, .. } => feedback,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CorrectionOutcome::Graded { is_correct: true, .. } => "correct",
            CorrectionOutcome::Graded { is_correct: false, .. } => "incorrect",
            CorrectionOutcome::Pending { .. } => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GradingPolicy {
    pub(crate) keyword_correct_threshold: u32,
    pub(crate) min_text_answer_chars: usize,
}

impl GradingPolicy {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            keyword_correct_threshold: settings.grading().keyword_correct_threshold,
            min_text_answer_chars: settings.grading().min_text_answer_chars,
        }
    }
}

pub(crate) fn correct_choice_automatic(
    options: &[ChoiceOption],
    raw: &RawAnswer,
) -> CorrectionOutcome {
    let selected = match raw {
        RawAnswer::Skipped => return CorrectionOutcome::graded(0, false, "No answer selected."),
        RawAnswer::Choice(id) => options.iter().find(|option| &option.id == id),
        RawAnswer::Text(_) => None,
    };
    let Some(option) = selected else {
        return CorrectionOutcome::graded(0, false, INVALID_ANSWER);
    };

    let feedback = option
        .comment
        .clone()
        .filter(|comment| !comment.trim().is_empty())
        .unwrap_or_else(|| {
            if option.is_correct { "Correct answer!" } else { "Wrong answer." }.to_string()
        });
    CorrectionOutcome::graded(if option.is_correct { 100 } else { 0 }, option.is_correct, feedback)
}

/// Correctness stays hidden; the exact-match verdict is only a reviewer suggestion.
pub(crate) fn correct_choice_manual(
    options: &[ChoiceOption],
    raw: &RawAnswer,
) -> CorrectionOutcome {
    let selected = match raw {
        RawAnswer::Skipped => return CorrectionOutcome::graded(0, false, "No answer selected."),
        RawAnswer::Choice(id) => options.iter().find(|option| &option.id == id),
        RawAnswer::Text(_) => None,
    };
    let Some(option) = selected else {
        return CorrectionOutcome::graded(0, false, INVALID_ANSWER);
    };

    let verdict = if option.is_correct { "matches" } else { "does not match" };
    let suggestion = Suggestion {
        score: if option.is_correct { 100 } else { 0 },
        feedback: format!("Selected option \"{}\" {verdict} the marked answer.", option.text),
        ideal_answer: None,
    };
    CorrectionOutcome::pending(Some(suggestion), MANUAL_CHOICE_PENDING)
}

pub(crate) fn correct_text_keywords(
    rules: &[KeywordRule],
    text: &str,
    policy: &GradingPolicy,
) -> CorrectionOutcome {
    let result = keyword_scoring::score_answer(text, rules, policy.keyword_correct_threshold);
    CorrectionOutcome::graded(result.score, result.is_correct, result.feedback())
}

pub(crate) fn correct_text_manual() -> CorrectionOutcome {
    CorrectionOutcome::pending(None, MANUAL_TEXT_PENDING)
}

/// Either branch stays pending; a failure never becomes a negative verdict.
pub(crate) fn correct_text_ai(
    result: Result<AiSuggestion, &CorrectionFailure>,
) -> CorrectionOutcome {
    match result {
        Ok(suggestion) => CorrectionOutcome::pending(Some(suggestion.into()), AI_PENDING),
        Err(_) => CorrectionOutcome::pending(None, AI_FALLBACK_PENDING),
    }
}

/// Text answers that fail basic checks are graded before any mode applies.
fn precheck_text<'a>(
    raw: &'a RawAnswer,
    policy: &GradingPolicy,
) -> Result<&'a str, CorrectionOutcome> {
    match raw {
        RawAnswer::Skipped => Err(CorrectionOutcome::graded(0, false, NO_ANSWER)),
        RawAnswer::Choice(_) => Err(CorrectionOutcome::graded(0, false, INVALID_ANSWER)),
        RawAnswer::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(CorrectionOutcome::graded(0, false, NO_ANSWER));
            }
            if trimmed.chars().count() < policy.min_text_answer_chars {
                return Err(CorrectionOutcome::graded(
                    0,
                    false,
                    format!(
                        "Answer too short (minimum {} characters).",
                        policy.min_text_answer_chars
                    ),
                ));
            }
            Ok(trimmed)
        }
    }
}

/// Single entry point for correcting one answer, dispatched on question kind and mode.
#[derive(Clone)]
pub(crate) struct QuestionCorrector {
    policy: GradingPolicy,
    ai: AiAssistedCorrector,
}

impl QuestionCorrector {
    pub(crate) fn new(policy: GradingPolicy, ai: AiAssistedCorrector) -> Self {
        Self { policy, ai }
    }

    pub(crate) async fn correct(
        &self,
        unit: &QuizUnit,
        question: &Question,
        raw: &RawAnswer,
        fallback: &mut FallbackLog,
        now: PrimitiveDateTime,
    ) -> CorrectionOutcome {
        let outcome = match &question.kind {
            QuestionKind::Choice { mode, options, .. } => match mode {
                CorrectionMode::Automatic => correct_choice_automatic(options, raw),
                CorrectionMode::Manual => correct_choice_manual(options, raw),
            },
            QuestionKind::OpenText { review, rules } => match precheck_text(raw, &self.policy) {
                Err(outcome) => outcome,
                Ok(text) => match review {
                    TextReview::Keywords => correct_text_keywords(rules, text, &self.policy),
                    TextReview::Manual => correct_text_manual(),
                    TextReview::AiAssisted => {
                        match self.ai.correct(unit, question, text, now).await {
                            Ok(suggestion) => correct_text_ai(Ok(suggestion)),
                            Err(failure) => {
                                fallback.record(question, text, &failure);
                                correct_text_ai(Err(&failure))
                            }
                        }
                    }
                },
            },
        };

        metrics::counter!(
            "answers_corrected_total",
            "kind" => question.question_type().as_str(),
            "mode" => question.correction_mode().as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);

        outcome
    }
}
