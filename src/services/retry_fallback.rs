use std::collections::HashMap;
use std::sync::Arc;

use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::db::models::{Question, RetryQueueEntry};
use crate::db::types::{PendingState, RetryQueueState};
use crate::repositories::store::{NewRetryEntry, RetryOutcome, SuggestionUpdate};
use crate::repositories::{AnswerStore, QuizCatalog, RetryQueueStore, StoreError};
use crate::services::ai_correction::{AiAssistedCorrector, CorrectionFailure};
use crate::services::notifications::{NoticeBatch, NoticeItem, NoticeKind, Notifier};
use crate::services::retry_state::RetryState;

/// Entries stuck in processing longer than this are claimed again.
const STALE_PROCESSING_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FallbackRecord {
    pub(crate) question_id: String,
    pub(crate) unit_id: String,
    pub(crate) raw_answer: String,
    pub(crate) failure: CorrectionFailure,
}

/// AI failures seen while grading one submission. Turned into retry-queue rows
/// written in the same transaction as the pending answers they belong to.
#[derive(Debug)]
pub(crate) struct FallbackLog {
    records: Vec<FallbackRecord>,
    max_attempts: u32,
}

impl FallbackLog {
    pub(crate) fn new(max_attempts: u32) -> Self {
        Self { records: Vec::new(), max_attempts }
    }

    pub(crate) fn record(
        &mut self,
        question: &Question,
        raw_answer: &str,
        failure: &CorrectionFailure,
    ) {
        metrics::counter!("retry_queue_items_total", "status" => "queued").increment(1);
        tracing::warn!(
            unit_id = %question.unit_id,
            question_id = %question.id,
            failure = failure.kind().as_str(),
            "AI correction deferred to retry queue"
        );
        self.records.push(FallbackRecord {
            question_id: question.id.clone(),
            unit_id: question.unit_id.clone(),
            raw_answer: raw_answer.to_string(),
            failure: failure.clone(),
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn records(&self) -> &[FallbackRecord] {
        &self.records
    }

    /// Builds queue rows linked to the pending answer created for each question and
    /// adds a diagnostic for the reviewer.
    pub(crate) fn into_entries(
        self,
        pending_ids: &HashMap<String, String>,
        reviewer_id: Option<&str>,
        notices: &mut NoticeBatch,
    ) -> Vec<NewRetryEntry> {
        let max_attempts = self.max_attempts;
        let mut entries = Vec::with_capacity(self.records.len());

        for record in self.records {
            let Some(pending_id) = pending_ids.get(&record.question_id) else {
                tracing::error!(
                    question_id = %record.question_id,
                    "AI failure recorded for a question without a pending answer"
                );
                continue;
            };

            if let Some(reviewer_id) = reviewer_id {
                notices.push(
                    reviewer_id,
                    NoticeItem {
                        kind: NoticeKind::AiFailure,
                        unit_id: record.unit_id.clone(),
                        question_id: record.question_id.clone(),
                        pending_answer_id: Some(pending_id.clone()),
                        message: format!(
                            "AI correction failed ({}); queued for retry, attempt 0 of {}",
                            record.failure.kind().as_str(),
                            max_attempts
                        ),
                    },
                );
            }

            entries.push(NewRetryEntry {
                id: Uuid::new_v4().to_string(),
                pending_answer_id: pending_id.clone(),
                question_id: record.question_id,
                raw_answer: record.raw_answer,
                failure_kind: record.failure.kind(),
                max_attempts: i32::try_from(max_attempts).unwrap_or(i32::MAX),
                last_error: record.failure.to_string(),
            });
        }

        entries
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RetrySweep {
    pub(crate) claimed: usize,
    pub(crate) resolved: usize,
    pub(crate) requeued: usize,
    pub(crate) exhausted: usize,
    pub(crate) skipped: usize,
}

enum EntryResult {
    Resolved,
    Requeued,
    Exhausted,
    Skipped,
}

/// Drains the AI retry queue outside the request path.
pub(crate) struct RetryFallbackHandler {
    catalog: Arc<dyn QuizCatalog>,
    answers: Arc<dyn AnswerStore>,
    queue: Arc<dyn RetryQueueStore>,
    corrector: AiAssistedCorrector,
    notifier: Arc<dyn Notifier>,
    batch_size: i64,
}

impl RetryFallbackHandler {
    pub(crate) fn new(
        catalog: Arc<dyn QuizCatalog>,
        answers: Arc<dyn AnswerStore>,
        queue: Arc<dyn RetryQueueStore>,
        corrector: AiAssistedCorrector,
        notifier: Arc<dyn Notifier>,
        batch_size: u32,
    ) -> Self {
        Self { catalog, answers, queue, corrector, notifier, batch_size: i64::from(batch_size) }
    }

    pub(crate) async fn process_queue(
        &self,
        now: PrimitiveDateTime,
    ) -> Result<RetrySweep, StoreError> {
        let stale_before = now - Duration::minutes(STALE_PROCESSING_MINUTES);
        let entries = self.queue.claim_due(self.batch_size, now, stale_before).await?;

        let mut sweep = RetrySweep { claimed: entries.len(), ..RetrySweep::default() };
        if entries.is_empty() {
            return Ok(sweep);
        }

        let mut notices = NoticeBatch::new();
        for entry in &entries {
            match self.retry_entry(entry, now, &mut notices).await {
                Ok(EntryResult::Resolved) => sweep.resolved += 1,
                Ok(EntryResult::Requeued) => sweep.requeued += 1,
                Ok(EntryResult::Exhausted) => sweep.exhausted += 1,
                Ok(EntryResult::Skipped) => sweep.skipped += 1,
                Err(err) => {
                    // Left in processing; reclaimed once stale.
                    tracing::error!(entry_id = %entry.id, error = %err, "Retry entry failed");
                }
            }
        }
        notices.flush(self.notifier.as_ref());

        tracing::info!(
            claimed = sweep.claimed,
            resolved = sweep.resolved,
            requeued = sweep.requeued,
            exhausted = sweep.exhausted,
            skipped = sweep.skipped,
            "AI retry sweep finished"
        );
        Ok(sweep)
    }

    async fn retry_entry(
        &self,
        entry: &RetryQueueEntry,
        now: PrimitiveDateTime,
        notices: &mut NoticeBatch,
    ) -> Result<EntryResult, StoreError> {
        let still_pending = self
            .answers
            .find_pending(&entry.pending_answer_id)
            .await?
            .is_some_and(|answer| answer.state == PendingState::Pending);
        if !still_pending {
            let unchanged = RetryState::from_stored(
                entry.retry_count,
                entry.last_attempt_at,
                entry.max_attempts,
            );
            let note = Some("answer already reviewed".to_string());
            self.finish(entry, unchanged, now, RetryQueueState::Done, note).await?;
            metrics::counter!("retry_queue_items_total", "status" => "skipped").increment(1);
            return Ok(EntryResult::Skipped);
        }

        let unit = self.catalog.find_unit(&entry.unit_id).await?;
        let question = self.catalog.find_question(&entry.question_id).await?;
        let state =
            RetryState::from_stored(entry.retry_count, entry.last_attempt_at, entry.max_attempts)
                .record_attempt(now);

        let (Some(unit), Some(question)) = (unit, question) else {
            let note = Some("unit or question no longer exists".to_string());
            self.finish(entry, state, now, RetryQueueState::Exhausted, note).await?;
            metrics::counter!("retry_queue_items_total", "status" => "exhausted").increment(1);
            return Ok(EntryResult::Exhausted);
        };

        match self.corrector.correct(&unit, &question, &entry.raw_answer, now).await {
            Ok(suggestion) => {
                let update = SuggestionUpdate {
                    suggested_score: suggestion.score,
                    suggested_feedback: suggestion.feedback,
                    ideal_answer: suggestion.ideal_answer,
                    updated_at: now,
                };
                self.answers.attach_suggestion(&entry.pending_answer_id, &update).await?;
                self.finish(entry, state, now, RetryQueueState::Done, None).await?;
                metrics::counter!("retry_queue_items_total", "status" => "resolved").increment(1);
                Ok(EntryResult::Resolved)
            }
            Err(failure) if state.is_exhausted() => {
                let note = Some(failure.to_string());
                self.finish(entry, state, now, RetryQueueState::Exhausted, note).await?;
                metrics::counter!("retry_queue_items_total", "status" => "exhausted").increment(1);
                match unit.reviewer_id.as_deref() {
                    Some(reviewer_id) => notices.push(
                        reviewer_id,
                        NoticeItem {
                            kind: NoticeKind::RetryExhausted,
                            unit_id: unit.id.clone(),
                            question_id: question.id.clone(),
                            pending_answer_id: Some(entry.pending_answer_id.clone()),
                            message: format!(
                                "AI correction failed after {} of {} attempts ({}); \
                                 manual correction required",
                                state.count,
                                state.max_attempts,
                                failure.kind().as_str()
                            ),
                        },
                    ),
                    None => tracing::warn!(
                        unit_id = %unit.id,
                        "No reviewer assigned for exhausted retry"
                    ),
                }
                Ok(EntryResult::Exhausted)
            }
            Err(failure) => {
                let note = Some(failure.to_string());
                self.finish(entry, state, now, RetryQueueState::Queued, note).await?;
                metrics::counter!("retry_queue_items_total", "status" => "requeued").increment(1);
                Ok(EntryResult::Requeued)
            }
        }
    }

    async fn finish(
        &self,
        entry: &RetryQueueEntry,
        state: RetryState,
        now: PrimitiveDateTime,
        queue_state: RetryQueueState,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let outcome = RetryOutcome {
            retry_count: state.count_i32(),
            attempted_at: now,
            state: queue_state,
            error,
        };
        self.queue.finish(&entry.id, &outcome).await
    }

    /// Attempt counters for one pending answer, shown to reviewers.
    pub(crate) async fn history(
        &self,
        pending_answer_id: &str,
    ) -> Result<Vec<RetryQueueEntry>, StoreError> {
        self.queue.list_for_pending(pending_answer_id).await
    }
}
