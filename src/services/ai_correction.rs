use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::{Question, QuizUnit};
use crate::db::types::AiFailureKind;
use crate::services::ai_context::{AiContextManager, ContextError};
use crate::services::ai_service::{AiServiceApi, AiServiceError, OpenCorrectionRequest};

/// A semantic grading proposed by the AI service. Never authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AiSuggestion {
    pub(crate) score: i32,
    pub(crate) feedback: String,
    pub(crate) ideal_answer: Option<String>,
}

/// Why no suggestion could be produced. None of these is a verdict on the answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CorrectionFailure {
    #[error("AI context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("AI correction timed out")]
    Timeout,
    #[error("AI service error: {0}")]
    ServiceError(String),
}

impl CorrectionFailure {
    pub(crate) fn kind(&self) -> AiFailureKind {
        match self {
            CorrectionFailure::ContextUnavailable(_) => AiFailureKind::ContextUnavailable,
            CorrectionFailure::Timeout => AiFailureKind::Timeout,
            CorrectionFailure::ServiceError(_) => AiFailureKind::ServiceError,
        }
    }
}

impl From<ContextError> for CorrectionFailure {
    fn from(err: ContextError) -> Self {
        CorrectionFailure::ContextUnavailable(err.to_string())
    }
}

impl From<AiServiceError> for CorrectionFailure {
    fn from(err: AiServiceError) -> Self {
        match err {
            AiServiceError::Timeout => CorrectionFailure::Timeout,
            other => CorrectionFailure::ServiceError(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AiAssistedCorrector {
    contexts: AiContextManager,
    ai: Arc<dyn AiServiceApi>,
}

impl AiAssistedCorrector {
    pub(crate) fn new(contexts: AiContextManager, ai: Arc<dyn AiServiceApi>) -> Self {
        Self { contexts, ai }
    }

    pub(crate) fn contexts(&self) -> &AiContextManager {
        &self.contexts
    }

    pub(crate) async fn correct(
        &self,
        unit: &QuizUnit,
        question: &Question,
        answer: &str,
        now: PrimitiveDateTime,
    ) -> Result<AiSuggestion, CorrectionFailure> {
        let timer = Instant::now();
        let result = self.request(unit, question, answer, now).await;

        let status = match &result {
            Ok(_) => "ok",
            Err(CorrectionFailure::ContextUnavailable(_)) => "context_unavailable",
            Err(CorrectionFailure::Timeout) => "timeout",
            Err(CorrectionFailure::ServiceError(_)) => "service_error",
        };
        metrics::counter!("ai_corrections_total", "status" => status).increment(1);
        metrics::histogram!("ai_correction_duration_seconds")
            .record(timer.elapsed().as_secs_f64());

        match &result {
            Ok(suggestion) => tracing::info!(
                unit_id = %unit.id,
                question_id = %question.id,
                score = suggestion.score,
                "AI correction succeeded"
            ),
            Err(err) => tracing::warn!(
                unit_id = %unit.id,
                question_id = %question.id,
                error = %err,
                "AI correction failed"
            ),
        }

        result
    }

    async fn request(
        &self,
        unit: &QuizUnit,
        question: &Question,
        answer: &str,
        now: PrimitiveDateTime,
    ) -> Result<AiSuggestion, CorrectionFailure> {
        let context = self.contexts.ensure_context(unit, now).await?;

        let (include, exclude): (Vec<_>, Vec<_>) =
            question.keyword_rules().iter().partition(|rule| rule.weight > 0);
        let request = OpenCorrectionRequest {
            context_id: context.context_id,
            question_text: question.text.clone(),
            user_answer: answer.to_string(),
            include: include.into_iter().map(|rule| rule.keyword.clone()).collect(),
            exclude: exclude
                .into_iter()
                .filter(|rule| rule.weight < 0)
                .map(|rule| rule.keyword.clone())
                .collect(),
        };

        let correction = self.ai.correct_open(&request).await?;
        if !correction.score.is_finite() || !(0.0..=100.0).contains(&correction.score) {
            return Err(CorrectionFailure::ServiceError(format!(
                "score {} outside [0, 100]",
                correction.score
            )));
        }

        let ideal_answer =
            correction.ideal_answer.filter(|ideal| !ideal.trim().is_empty());
        Ok(AiSuggestion {
            score: correction.score.round() as i32,
            feedback: correction.feedback,
            ideal_answer,
        })
    }
}
