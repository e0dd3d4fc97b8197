use std::collections::HashMap;

use serde::Serialize;

use crate::db::models::{GradedAnswer, PendingAnswer};
use crate::db::types::PendingState;
use crate::services::question_corrector::CorrectionOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum QuizStatus {
    Pending,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuizResult {
    pub(crate) percentage: f64,
    pub(crate) passed: bool,
    pub(crate) pending_count: usize,
    pub(crate) graded_count: usize,
    pub(crate) status: QuizStatus,
}

/// Percentage over graded questions only. Any pending question blocks a pass.
pub(crate) fn aggregate(outcomes: &[CorrectionOutcome], pass_threshold: u32) -> QuizResult {
    let graded: Vec<i32> = outcomes.iter().filter_map(CorrectionOutcome::score).collect();
    let graded_count = graded.len();
    let pending_count = outcomes.iter().filter(|outcome| outcome.pending_record_required()).count();

    let total: i64 = graded.iter().map(|score| i64::from(*score)).sum();
    let percentage = if graded_count > 0 {
        round2(100.0 * total as f64 / (100.0 * graded_count as f64))
    } else {
        0.0
    };

    // Scores are already percentages, so the exact mean clears the bar when
    // total >= threshold * count. The rounded figure is for display only.
    let clears = graded_count > 0 && total >= i64::from(pass_threshold) * graded_count as i64;
    let passed = pending_count == 0 && (clears || pass_threshold == 0);
    let status = if pending_count > 0 {
        QuizStatus::Pending
    } else if passed {
        QuizStatus::Passed
    } else {
        QuizStatus::Failed
    };

    QuizResult { percentage, passed, pending_count, graded_count, status }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct LearnerStats {
    pub(crate) total_answers: usize,
    pub(crate) pending: usize,
    pub(crate) corrected: usize,
    pub(crate) average_score: Option<f64>,
}

/// Summary over a learner's answers. The average uses the latest final score of
/// each question; answers still awaiting review do not count.
pub(crate) fn learner_stats(pending: &[PendingAnswer], graded: &[GradedAnswer]) -> LearnerStats {
    let waiting = pending.iter().filter(|answer| answer.state == PendingState::Pending).count();

    let mut latest: HashMap<&str, (i32, i32)> = HashMap::new();
    let finals = pending
        .iter()
        .filter_map(|answer| {
            answer.final_score.map(|score| (answer.question_id.as_str(), answer.attempt_no, score))
        })
        .chain(graded.iter().map(|answer| {
            (answer.question_id.as_str(), answer.attempt_no, answer.score)
        }));
    for (question_id, attempt_no, score) in finals {
        let entry = latest.entry(question_id).or_insert((attempt_no, score));
        if attempt_no > entry.0 {
            *entry = (attempt_no, score);
        }
    }

    let average_score = if latest.is_empty() {
        None
    } else {
        let sum: i64 = latest.values().map(|(_, score)| i64::from(*score)).sum();
        Some(round2(sum as f64 / latest.len() as f64))
    };

    LearnerStats {
        total_answers: pending.len() + graded.len(),
        pending: waiting,
        corrected: pending.len() - waiting,
        average_score,
    }
}
