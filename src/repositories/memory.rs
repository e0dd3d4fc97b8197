use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::models::{
    AiContext, GradedAnswer, PendingAnswer, Question, QuizUnit, RetryQueueEntry,
};
use crate::db::types::{PendingState, RetryQueueState};
use crate::repositories::store::{
    AnswerStore, ContextStore, NewAttempt, PendingFilter, QuizCatalog, ReminderQuery,
    Resolution, RetryOutcome, RetryQueueStore, StoreError, SuggestionUpdate,
};

#[derive(Default)]
struct Tables {
    units: HashMap<String, QuizUnit>,
    questions: Vec<Question>,
    attempts: HashMap<(String, String), i32>,
    pending: Vec<PendingAnswer>,
    graded: Vec<GradedAnswer>,
    contexts: HashMap<String, AiContext>,
    retries: Vec<RetryQueueEntry>,
}

/// In-process store with the same conflict semantics as the Postgres one.
#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn insert_unit(&self, unit: QuizUnit) {
        self.lock().units.insert(unit.id.clone(), unit);
    }

    pub(crate) fn insert_question(&self, question: Question) {
        self.lock().questions.push(question);
    }

    pub(crate) fn insert_context(&self, context: AiContext) {
        self.lock().contexts.insert(context.unit_id.clone(), context);
    }

    pub(crate) fn pending_answers(&self) -> Vec<PendingAnswer> {
        self.lock().pending.clone()
    }

    pub(crate) fn graded_answers(&self) -> Vec<GradedAnswer> {
        self.lock().graded.clone()
    }

    pub(crate) fn retry_entries(&self) -> Vec<RetryQueueEntry> {
        self.lock().retries.clone()
    }

    pub(crate) fn context(&self, unit_id: &str) -> Option<AiContext> {
        self.lock().contexts.get(unit_id).cloned()
    }

    pub(crate) fn attempts(&self, learner_id: &str, unit_id: &str) -> i32 {
        self.lock()
            .attempts
            .get(&(learner_id.to_string(), unit_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn backdate_pending(&self, id: &str, created_at: PrimitiveDateTime) {
        if let Some(answer) = self.lock().pending.iter_mut().find(|answer| answer.id == id) {
            answer.created_at = created_at;
        }
    }
}

fn matches_filter(tables: &Tables, answer: &PendingAnswer, filter: &PendingFilter) -> bool {
    let reviewed_by = |reviewer: &String| {
        tables
            .units
            .get(&answer.unit_id)
            .is_some_and(|unit| unit.reviewer_id.as_ref() == Some(reviewer))
    };
    filter.unit_id.as_ref().map_or(true, |unit| &answer.unit_id == unit)
        && filter.learner_id.as_ref().map_or(true, |learner| &answer.learner_id == learner)
        && filter.state.map_or(true, |state| answer.state == state)
        && filter.reviewer_id.as_ref().map_or(true, reviewed_by)
}

#[async_trait]
impl QuizCatalog for MemoryStore {
    async fn find_unit(&self, unit_id: &str) -> Result<Option<QuizUnit>, StoreError> {
        Ok(self.lock().units.get(unit_id).cloned())
    }

    async fn list_questions(&self, unit_id: &str) -> Result<Vec<Question>, StoreError> {
        let mut questions: Vec<Question> = self
            .lock()
            .questions
            .iter()
            .filter(|question| question.unit_id == unit_id)
            .cloned()
            .collect();
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn find_question(&self, question_id: &str) -> Result<Option<Question>, StoreError> {
        Ok(self.lock().questions.iter().find(|question| question.id == question_id).cloned())
    }
}

#[async_trait]
impl AnswerStore for MemoryStore {
    async fn attempt_count(&self, learner_id: &str, unit_id: &str) -> Result<i32, StoreError> {
        Ok(self.attempts(learner_id, unit_id))
    }

    async fn attempt_has_records(
        &self,
        learner_id: &str,
        question_ids: &[String],
        attempt_no: i32,
    ) -> Result<bool, StoreError> {
        let tables = self.lock();
        let hit = |question_id: &String, learner: &String, attempt: i32| {
            learner == learner_id && attempt == attempt_no && question_ids.contains(question_id)
        };
        Ok(tables
            .pending
            .iter()
            .any(|answer| hit(&answer.question_id, &answer.learner_id, answer.attempt_no))
            || tables
                .graded
                .iter()
                .any(|answer| hit(&answer.question_id, &answer.learner_id, answer.attempt_no)))
    }

    async fn record_attempt(&self, attempt: &NewAttempt) -> Result<(), StoreError> {
        let mut tables = self.lock();

        let taken = |question_id: &str, tables: &Tables| {
            tables.pending.iter().any(|answer| {
                answer.question_id == question_id
                    && answer.learner_id == attempt.learner_id
                    && answer.attempt_no == attempt.attempt_no
            }) || tables.graded.iter().any(|answer| {
                answer.question_id == question_id
                    && answer.learner_id == attempt.learner_id
                    && answer.attempt_no == attempt.attempt_no
            })
        };
        let question_ids = attempt
            .pending
            .iter()
            .map(|answer| answer.question_id.as_str())
            .chain(attempt.graded.iter().map(|answer| answer.question_id.as_str()));
        for question_id in question_ids {
            if taken(question_id, &*tables) {
                return Err(StoreError::Conflict(format!(
                    "answer for question {question_id} already recorded"
                )));
            }
        }

        let key = (attempt.learner_id.clone(), attempt.unit_id.clone());
        let current = tables.attempts.get(&key).copied().unwrap_or(0);
        if current != attempt.attempt_no - 1 {
            return Err(StoreError::Conflict(format!(
                "attempt counter is no longer at {}",
                attempt.attempt_no - 1
            )));
        }
        tables.attempts.insert(key, attempt.attempt_no);

        let now = attempt.created_at;
        for answer in &attempt.pending {
            tables.pending.push(PendingAnswer {
                id: answer.id.clone(),
                question_id: answer.question_id.clone(),
                unit_id: attempt.unit_id.clone(),
                learner_id: attempt.learner_id.clone(),
                attempt_no: attempt.attempt_no,
                raw_answer: answer.raw_answer.clone(),
                suggested_score: answer.suggested_score,
                suggested_feedback: answer.suggested_feedback.clone(),
                ideal_answer: answer.ideal_answer.clone(),
                state: PendingState::Pending,
                final_score: None,
                final_feedback: None,
                reviewer_comment: None,
                reviewer_id: None,
                validated_at: None,
                reminder_count: 0,
                last_reminder_at: None,
                created_at: now,
                updated_at: now,
            });
        }
        for answer in &attempt.graded {
            tables.graded.push(GradedAnswer {
                id: answer.id.clone(),
                question_id: answer.question_id.clone(),
                unit_id: attempt.unit_id.clone(),
                learner_id: attempt.learner_id.clone(),
                attempt_no: attempt.attempt_no,
                raw_answer: answer.raw_answer.clone(),
                score: answer.score,
                is_correct: answer.is_correct,
                feedback: answer.feedback.clone(),
                created_at: now,
            });
        }
        for entry in &attempt.retries {
            tables.retries.push(RetryQueueEntry {
                id: entry.id.clone(),
                pending_answer_id: entry.pending_answer_id.clone(),
                question_id: entry.question_id.clone(),
                unit_id: attempt.unit_id.clone(),
                learner_id: attempt.learner_id.clone(),
                raw_answer: entry.raw_answer.clone(),
                failure_kind: entry.failure_kind,
                retry_count: 0,
                max_attempts: entry.max_attempts,
                last_attempt_at: None,
                state: RetryQueueState::Queued,
                last_error: Some(entry.last_error.clone()),
                created_at: now,
                updated_at: now,
            });
        }

        Ok(())
    }

    async fn find_pending(&self, id: &str) -> Result<Option<PendingAnswer>, StoreError> {
        Ok(self.lock().pending.iter().find(|answer| answer.id == id).cloned())
    }

    async fn resolve_pending(
        &self,
        id: &str,
        resolution: &Resolution,
    ) -> Result<Option<PendingAnswer>, StoreError> {
        let mut tables = self.lock();
        let Some(answer) = tables
            .pending
            .iter_mut()
            .find(|answer| answer.id == id && answer.state == PendingState::Pending)
        else {
            return Ok(None);
        };

        answer.state = resolution.state;
        answer.final_score = Some(resolution.final_score);
        answer.final_feedback = Some(resolution.final_feedback.clone());
        answer.reviewer_comment = resolution.reviewer_comment.clone();
        answer.reviewer_id = Some(resolution.reviewer_id.clone());
        answer.validated_at = Some(resolution.resolved_at);
        answer.updated_at = resolution.resolved_at;
        Ok(Some(answer.clone()))
    }

    async fn attach_suggestion(
        &self,
        id: &str,
        update: &SuggestionUpdate,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(answer) = tables
            .pending
            .iter_mut()
            .find(|answer| answer.id == id && answer.state == PendingState::Pending)
        else {
            return Ok(false);
        };

        answer.suggested_score = Some(update.suggested_score);
        answer.suggested_feedback = Some(update.suggested_feedback.clone());
        answer.ideal_answer = update.ideal_answer.clone();
        answer.updated_at = update.updated_at;
        Ok(true)
    }

    async fn list_pending(
        &self,
        filter: &PendingFilter,
    ) -> Result<(Vec<PendingAnswer>, i64), StoreError> {
        let tables = self.lock();
        let mut matching: Vec<PendingAnswer> = tables
            .pending
            .iter()
            .filter(|answer| matches_filter(&tables, answer, filter))
            .cloned()
            .collect();
        drop(tables);
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.clamp(1, 1000) as usize)
            .collect();
        Ok((items, total))
    }

    async fn count_pending(
        &self,
        learner_id: &str,
        unit_id: Option<&str>,
    ) -> Result<i64, StoreError> {
        Ok(self
            .lock()
            .pending
            .iter()
            .filter(|answer| {
                answer.learner_id == learner_id
                    && answer.state == PendingState::Pending
                    && unit_id.map_or(true, |unit| answer.unit_id == unit)
            })
            .count() as i64)
    }

    async fn list_graded(
        &self,
        learner_id: &str,
        unit_id: Option<&str>,
    ) -> Result<Vec<GradedAnswer>, StoreError> {
        Ok(self
            .lock()
            .graded
            .iter()
            .filter(|answer| {
                answer.learner_id == learner_id
                    && unit_id.map_or(true, |unit| answer.unit_id == unit)
            })
            .cloned()
            .collect())
    }

    async fn list_due_reminders(
        &self,
        query: &ReminderQuery,
    ) -> Result<Vec<PendingAnswer>, StoreError> {
        let mut due: Vec<PendingAnswer> = self
            .lock()
            .pending
            .iter()
            .filter(|answer| {
                answer.state == PendingState::Pending
                    && answer.created_at < query.created_before
                    && answer.reminder_count < query.reminder_max
                    && answer.last_reminder_at.map_or(true, |at| at < query.reminded_before)
            })
            .cloned()
            .collect();
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        due.truncate(query.limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_reminded(&self, ids: &[String], at: PrimitiveDateTime) -> Result<(), StoreError> {
        for answer in self.lock().pending.iter_mut() {
            if ids.contains(&answer.id) && answer.state == PendingState::Pending {
                answer.reminder_count += 1;
                answer.last_reminder_at = Some(at);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContextStore for MemoryStore {
    async fn find_context(&self, unit_id: &str) -> Result<Option<AiContext>, StoreError> {
        Ok(self.context(unit_id))
    }

    async fn save_context(&self, context: &AiContext) -> Result<(), StoreError> {
        self.insert_context(context.clone());
        Ok(())
    }
}

#[async_trait]
impl RetryQueueStore for MemoryStore {
    async fn claim_due(
        &self,
        limit: i64,
        now: PrimitiveDateTime,
        stale_before: PrimitiveDateTime,
    ) -> Result<Vec<RetryQueueEntry>, StoreError> {
        let mut tables = self.lock();
        let mut claimed = Vec::new();
        for entry in tables.retries.iter_mut() {
            if claimed.len() as i64 >= limit {
                break;
            }
            let due = entry.retry_count < entry.max_attempts
                && (entry.state == RetryQueueState::Queued
                    || (entry.state == RetryQueueState::Processing
                        && entry.updated_at < stale_before));
            if due {
                entry.state = RetryQueueState::Processing;
                entry.updated_at = now;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn finish(&self, id: &str, outcome: &RetryOutcome) -> Result<(), StoreError> {
        if let Some(entry) = self.lock().retries.iter_mut().find(|entry| entry.id == id) {
            entry.retry_count = outcome.retry_count;
            entry.last_attempt_at = Some(outcome.attempted_at);
            entry.state = outcome.state;
            if outcome.error.is_some() {
                entry.last_error = outcome.error.clone();
            }
            entry.updated_at = outcome.attempted_at;
        }
        Ok(())
    }

    async fn list_for_pending(
        &self,
        pending_answer_id: &str,
    ) -> Result<Vec<RetryQueueEntry>, StoreError> {
        Ok(self
            .lock()
            .retries
            .iter()
            .filter(|entry| entry.pending_answer_id == pending_answer_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::repositories::store::{NewGradedAnswer, NewPendingAnswer};

    fn graded(id: &str, question_id: &str) -> NewGradedAnswer {
        NewGradedAnswer {
            id: id.into(),
            question_id: question_id.into(),
            raw_answer: Some("b".into()),
            score: 100,
            is_correct: true,
            feedback: String::new(),
        }
    }

    fn pending(id: &str, question_id: &str) -> NewPendingAnswer {
        NewPendingAnswer {
            id: id.into(),
            question_id: question_id.into(),
            raw_answer: "free text".into(),
            suggested_score: None,
            suggested_feedback: None,
            ideal_answer: None,
        }
    }

    fn attempt(
        attempt_no: i32,
        pending: Vec<NewPendingAnswer>,
        graded: Vec<NewGradedAnswer>,
    ) -> NewAttempt {
        NewAttempt {
            learner_id: "learner-1".into(),
            unit_id: "unit-1".into(),
            attempt_no,
            pending,
            graded,
            retries: vec![],
            created_at: datetime!(2025-05-01 09:00),
        }
    }

    #[tokio::test]
    async fn taken_answer_rejects_the_whole_attempt() {
        let store = MemoryStore::default();
        store
            .record_attempt(&attempt(1, vec![], vec![graded("ga-1", "q-1")]))
            .await
            .expect("first attempt");

        let replay = attempt(1, vec![pending("pa-2", "q-2")], vec![graded("ga-3", "q-1")]);
        let err = store.record_attempt(&replay).await.expect_err("duplicate row");

        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.pending_answers().is_empty());
        assert_eq!(store.graded_answers().len(), 1);
        assert_eq!(store.attempts("learner-1", "unit-1"), 1);
    }

    #[tokio::test]
    async fn stale_counter_rejects_without_writing() {
        let store = MemoryStore::default();
        store
            .record_attempt(&attempt(1, vec![], vec![graded("ga-1", "q-1")]))
            .await
            .expect("first attempt");

        let skipped = attempt(3, vec![pending("pa-2", "q-2")], vec![graded("ga-2", "q-1")]);
        let err = store.record_attempt(&skipped).await.expect_err("counter moved");

        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.pending_answers().is_empty());
        assert_eq!(store.graded_answers().len(), 1);
        assert_eq!(store.attempts("learner-1", "unit-1"), 1);
    }
}
