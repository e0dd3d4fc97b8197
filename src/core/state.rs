use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::{AnswerStore, ContextStore, PgStore, QuizCatalog, RetryQueueStore};
use crate::services::ai_context::AiContextManager;
use crate::services::ai_correction::AiAssistedCorrector;
use crate::services::ai_service::AiServiceApi;
use crate::services::notifications::Notifier;
use crate::services::pending_review::{PendingReviewService, ReminderPolicy};
use crate::services::question_corrector::{GradingPolicy, QuestionCorrector};
use crate::services::retry_fallback::RetryFallbackHandler;
use crate::services::storage::StorageService;
use crate::services::submission_ingest::{SubmissionIngestor, SubmissionPolicy};

/// Storage seams the services run against.
#[derive(Clone)]
pub(crate) struct Stores {
    pub(crate) catalog: Arc<dyn QuizCatalog>,
    pub(crate) answers: Arc<dyn AnswerStore>,
    pub(crate) contexts: Arc<dyn ContextStore>,
    pub(crate) retry_queue: Arc<dyn RetryQueueStore>,
}

impl Stores {
    pub(crate) fn postgres(pool: &PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            catalog: store.clone(),
            answers: store.clone(),
            contexts: store.clone(),
            retry_queue: store,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    storage: Option<StorageService>,
    stores: Stores,
    ai: Arc<dyn AiServiceApi>,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        storage: Option<StorageService>,
        stores: Stores,
        ai: Arc<dyn AiServiceApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState { settings, db, redis, storage, stores, ai, notifier }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn storage(&self) -> Option<&StorageService> {
        self.inner.storage.as_ref()
    }

    pub(crate) fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    pub(crate) fn context_manager(&self) -> AiContextManager {
        AiContextManager::new(
            self.inner.stores.contexts.clone(),
            self.inner.ai.clone(),
            self.inner.storage.clone(),
            self.settings().ai().context_default_ttl_hours,
        )
    }

    pub(crate) fn ai_corrector(&self) -> AiAssistedCorrector {
        AiAssistedCorrector::new(self.context_manager(), self.inner.ai.clone())
    }

    pub(crate) fn submission_ingestor(&self) -> SubmissionIngestor {
        let policy = GradingPolicy::from_settings(self.settings());
        let corrector = QuestionCorrector::new(policy, self.ai_corrector());
        SubmissionIngestor::new(
            self.inner.stores.catalog.clone(),
            self.inner.stores.answers.clone(),
            corrector,
            self.inner.notifier.clone(),
            SubmissionPolicy::from_settings(self.settings()),
        )
    }

    pub(crate) fn review_service(&self) -> PendingReviewService {
        PendingReviewService::new(
            self.inner.stores.catalog.clone(),
            self.inner.stores.answers.clone(),
            self.inner.notifier.clone(),
            ReminderPolicy::from_settings(self.settings()),
        )
    }

    pub(crate) fn retry_handler(&self) -> RetryFallbackHandler {
        RetryFallbackHandler::new(
            self.inner.stores.catalog.clone(),
            self.inner.stores.answers.clone(),
            self.inner.stores.retry_queue.clone(),
            self.ai_corrector(),
            self.inner.notifier.clone(),
            self.settings().grading().retry_batch_size,
        )
    }
}
