use std::sync::Arc;

use base64::Engine;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};

use crate::core::time::parse_rfc3339_utc;
use crate::db::models::{AiContext, QuizUnit};
use crate::repositories::{ContextStore, StoreError};
use crate::services::ai_service::{AiServiceApi, AiServiceError, ContextRequest};
use crate::services::storage::StorageService;

#[derive(Debug, Error)]
pub(crate) enum ContextError {
    #[error("unit {0} has no content to index")]
    NoContent(String),
    #[error("document storage is not configured")]
    StorageUnavailable,
    #[error("failed to load unit document: {0}")]
    Storage(String),
    #[error(transparent)]
    Service(#[from] AiServiceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum ContentSource<'a> {
    Inline(&'a str),
    Document(&'a str),
}

impl<'a> ContentSource<'a> {
    fn of(unit: &'a QuizUnit) -> Option<Self> {
        if let Some(html) = unit.content_html.as_deref().filter(|html| !html.trim().is_empty()) {
            return Some(ContentSource::Inline(html));
        }
        unit.document_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(ContentSource::Document)
    }

    /// Stable identity of the content. Documents are identified by key plus the
    /// object's revision, so an overwritten file gets a new fingerprint.
    fn fingerprint(&self, revision: &str) -> String {
        let digest = match self {
            ContentSource::Inline(html) => Sha256::digest(html.as_bytes()),
            ContentSource::Document(key) => {
                Sha256::digest(format!("s3:{key}:{revision}").as_bytes())
            }
        };
        hex::encode(digest)
    }

    fn file_name(&self, unit_id: &str) -> String {
        match self {
            ContentSource::Inline(_) => format!("unit-{unit_id}.html"),
            ContentSource::Document(key) => {
                key.rsplit('/').next().filter(|name| !name.is_empty()).unwrap_or(*key).to_string()
            }
        }
    }
}

pub(crate) fn file_id(unit_id: &str, fingerprint: &str) -> String {
    let short = fingerprint.get(..16).unwrap_or(fingerprint);
    format!("unit-{unit_id}-{short}")
}

/// Keeps one live RAG context per unit.
#[derive(Clone)]
pub(crate) struct AiContextManager {
    store: Arc<dyn ContextStore>,
    ai: Arc<dyn AiServiceApi>,
    storage: Option<StorageService>,
    default_ttl: Duration,
}

impl AiContextManager {
    pub(crate) fn new(
        store: Arc<dyn ContextStore>,
        ai: Arc<dyn AiServiceApi>,
        storage: Option<StorageService>,
        default_ttl_hours: u64,
    ) -> Self {
        Self { store, ai, storage, default_ttl: Duration::hours(default_ttl_hours as i64) }
    }

    /// Returns the stored context while it is unexpired and built from the unit's
    /// current content; otherwise indexes the content again.
    pub(crate) async fn ensure_context(
        &self,
        unit: &QuizUnit,
        now: PrimitiveDateTime,
    ) -> Result<AiContext, ContextError> {
        let source =
            ContentSource::of(unit).ok_or_else(|| ContextError::NoContent(unit.id.clone()))?;
        let fingerprint = self.fingerprint(&source).await?;

        if let Some(existing) = self.store.find_context(&unit.id).await? {
            if existing.expires_at > now && existing.content_fingerprint == fingerprint {
                return Ok(existing);
            }
            tracing::info!(
                unit_id = %unit.id,
                expired = existing.expires_at <= now,
                "Stored AI context is stale; recreating"
            );
        }

        self.create(unit, &source, fingerprint, now).await
    }

    /// Indexes the unit content again regardless of the stored context.
    pub(crate) async fn regenerate(
        &self,
        unit: &QuizUnit,
        now: PrimitiveDateTime,
    ) -> Result<AiContext, ContextError> {
        let source =
            ContentSource::of(unit).ok_or_else(|| ContextError::NoContent(unit.id.clone()))?;
        let fingerprint = self.fingerprint(&source).await?;
        self.create(unit, &source, fingerprint, now).await
    }

    async fn fingerprint(&self, source: &ContentSource<'_>) -> Result<String, ContextError> {
        let revision = match source {
            ContentSource::Inline(_) => String::new(),
            ContentSource::Document(key) => {
                let storage = self.storage.as_ref().ok_or(ContextError::StorageUnavailable)?;
                storage.version(key).await.map_err(|err| ContextError::Storage(err.to_string()))?
            }
        };
        Ok(source.fingerprint(&revision))
    }

    async fn create(
        &self,
        unit: &QuizUnit,
        source: &ContentSource<'_>,
        fingerprint: String,
        now: PrimitiveDateTime,
    ) -> Result<AiContext, ContextError> {
        let bytes = match source {
            ContentSource::Inline(html) => html.as_bytes().to_vec(),
            ContentSource::Document(key) => {
                let storage = self.storage.as_ref().ok_or(ContextError::StorageUnavailable)?;
                storage.download(key).await.map_err(|err| ContextError::Storage(err.to_string()))?
            }
        };
        if bytes.is_empty() {
            return Err(ContextError::NoContent(unit.id.clone()));
        }

        let request = ContextRequest {
            file_id: file_id(&unit.id, &fingerprint),
            content_base64: base64::engine::general_purpose::STANDARD.encode(&bytes),
            file_name: source.file_name(&unit.id),
        };

        let created = self.ai.create_context(&request).await?;
        let expires_at = created
            .expires_at
            .as_deref()
            .and_then(parse_rfc3339_utc)
            .unwrap_or(now + self.default_ttl);

        let context = AiContext {
            unit_id: unit.id.clone(),
            context_id: created.context_id,
            file_id: request.file_id,
            content_fingerprint: fingerprint,
            expires_at,
            created_at: now,
        };
        self.store.save_context(&context).await?;

        tracing::info!(
            unit_id = %unit.id,
            context_id = %context.context_id,
            expires_at = %context.expires_at,
            "AI context created"
        );

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;
    use crate::test_support::{self, FakeAiService};
    use time::macros::datetime;

    fn manager(store: &Arc<MemoryStore>, ai: &Arc<FakeAiService>) -> AiContextManager {
        AiContextManager::new(store.clone(), ai.clone(), None, 24)
    }

    #[tokio::test]
    async fn fresh_context_is_reused() {
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(FakeAiService::default());
        let unit = test_support::quiz_unit("unit-1");
        let now = datetime!(2025-05-01 10:00);

        let first = manager(&store, &ai).ensure_context(&unit, now).await.expect("context");
        let second = manager(&store, &ai)
            .ensure_context(&unit, now + Duration::hours(1))
            .await
            .expect("context");

        assert_eq!(first.context_id, second.context_id);
        assert_eq!(ai.context_calls(), 1);
        assert!(first.file_id.starts_with("unit-unit-1-"));
        assert_eq!(first.file_id.len(), "unit-unit-1-".len() + 16);
    }

    #[tokio::test]
    async fn expired_or_changed_context_is_recreated() {
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(FakeAiService::default());
        let mut unit = test_support::quiz_unit("unit-1");
        let now = datetime!(2025-05-01 10:00);
        let manager = manager(&store, &ai);

        let first = manager.ensure_context(&unit, now).await.expect("context");
        // Fake service answers without an expiry, so the default TTL applies.
        assert_eq!(first.expires_at, now + Duration::hours(24));

        manager.ensure_context(&unit, now + Duration::hours(25)).await.expect("context");
        assert_eq!(ai.context_calls(), 2);

        unit.content_html = Some("<p>Revised chapter</p>".to_string());
        let revised =
            manager.ensure_context(&unit, now + Duration::hours(26)).await.expect("context");
        assert_eq!(ai.context_calls(), 3);
        assert_ne!(revised.content_fingerprint, first.content_fingerprint);
        assert_eq!(store.context("unit-1").map(|ctx| ctx.context_id), Some(revised.context_id));
    }

    #[tokio::test]
    async fn regenerate_ignores_fresh_context() {
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(FakeAiService::default());
        let unit = test_support::quiz_unit("unit-1");
        let now = datetime!(2025-05-01 10:00);
        let manager = manager(&store, &ai);

        let first = manager.ensure_context(&unit, now).await.expect("context");
        let second = manager.regenerate(&unit, now).await.expect("context");

        assert_ne!(first.context_id, second.context_id);
        assert_eq!(ai.context_calls(), 2);
    }

    #[tokio::test]
    async fn unit_without_content_is_unavailable() {
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(FakeAiService::default());
        let mut unit = test_support::quiz_unit("unit-1");
        unit.content_html = Some("   ".to_string());

        let result = manager(&store, &ai).ensure_context(&unit, datetime!(2025-05-01 10:00)).await;

        assert!(matches!(result, Err(ContextError::NoContent(_))));
        assert_eq!(ai.context_calls(), 0);
    }

    #[tokio::test]
    async fn document_unit_needs_storage() {
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(FakeAiService::default());
        let mut unit = test_support::quiz_unit("unit-1");
        unit.content_html = None;
        unit.document_key = Some("courses/bio/chapter-1.pdf".to_string());

        let result = manager(&store, &ai).ensure_context(&unit, datetime!(2025-05-01 10:00)).await;

        assert!(matches!(result, Err(ContextError::StorageUnavailable)));
    }

    #[tokio::test]
    async fn service_failure_is_reported() {
        let store = Arc::new(MemoryStore::default());
        let ai = Arc::new(FakeAiService::default());
        ai.fail_contexts(AiServiceError::Status { status: 503, body: "busy".into() });
        let unit = test_support::quiz_unit("unit-1");

        let result = manager(&store, &ai).ensure_context(&unit, datetime!(2025-05-01 10:00)).await;

        assert!(matches!(
            result,
            Err(ContextError::Service(AiServiceError::Status { status: 503, .. }))
        ));
        assert!(store.context("unit-1").is_none());
    }

    #[test]
    fn overwritten_document_changes_fingerprint() {
        let document = ContentSource::Document("courses/bio/chapter-1.pdf");

        let original = document.fingerprint("etag:9b2cf5");
        assert_eq!(original, document.fingerprint("etag:9b2cf5"));
        assert_ne!(original, document.fingerprint("etag:41d0e7"));
        assert_ne!(
            file_id("unit-1", &original),
            file_id("unit-1", &document.fingerprint("etag:41d0e7"))
        );
    }

    #[test]
    fn document_file_name_is_last_key_segment() {
        assert_eq!(ContentSource::Document("a/b/c.pdf").file_name("u"), "c.pdf");
        assert_eq!(ContentSource::Inline("<p/>").file_name("u"), "unit-u.html");
    }
}
