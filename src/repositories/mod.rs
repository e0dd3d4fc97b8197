pub(crate) mod ai_contexts;
pub(crate) mod attempts;
pub(crate) mod graded_answers;
#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod pending_answers;
pub(crate) mod postgres;
pub(crate) mod questions;
pub(crate) mod retry_queue;
pub(crate) mod store;
pub(crate) mod units;

pub(crate) use postgres::PgStore;
pub(crate) use store::{AnswerStore, ContextStore, QuizCatalog, RetryQueueStore, StoreError};
