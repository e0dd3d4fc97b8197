use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::Client;
use thiserror::Error;

use crate::core::config::Settings;

/// Unit documents are sent inline to the AI service, so they must stay small.
const MAX_DOCUMENT_BYTES: i64 = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub(crate) enum StorageError {
    #[error("document {0} does not exist")]
    Missing(String),
    #[error("document {key} is {size} bytes; the limit is {MAX_DOCUMENT_BYTES}")]
    TooLarge { key: String, size: i64 },
    #[error("object storage request for {key} failed: {reason}")]
    Request { key: String, reason: String },
}

/// Read-only access to the unit documents kept in S3-compatible storage.
#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    /// `None` when no credentials are configured; units then rely on inline content.
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let s3 = settings.s3();
        if s3.access_key.is_empty() || s3.secret_key.is_empty() {
            return Ok(None);
        }

        let credentials = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "quiz-grader-static",
        );
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(s3.endpoint.clone())
            .region(aws_config::Region::new(s3.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        tracing::info!(bucket = %s3.bucket, endpoint = %s3.endpoint, "Document storage enabled");
        Ok(Some(Self { client: Client::new(&config), bucket: s3.bucket.clone() }))
    }

    pub(crate) fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Revision marker of the stored object: its ETag, else its modification time.
    pub(crate) async fn version(&self, key: &str) -> Result<String, StorageError> {
        let head =
            self.client.head_object().bucket(&self.bucket).key(key).send().await.map_err(|err| {
                if err.as_service_error().is_some_and(|service| service.is_not_found()) {
                    StorageError::Missing(key.to_string())
                } else {
                    StorageError::Request { key: key.to_string(), reason: err.to_string() }
                }
            })?;
        Ok(object_version(head.e_tag(), head.last_modified()))
    }

    pub(crate) async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let object =
            self.client.get_object().bucket(&self.bucket).key(key).send().await.map_err(|err| {
                if err.as_service_error().is_some_and(|service| service.is_no_such_key()) {
                    StorageError::Missing(key.to_string())
                } else {
                    StorageError::Request { key: key.to_string(), reason: err.to_string() }
                }
            })?;

        if let Some(size) = object.content_length().filter(|size| *size > MAX_DOCUMENT_BYTES) {
            return Err(StorageError::TooLarge { key: key.to_string(), size });
        }

        let bytes = object.body.collect().await.map_err(|err| StorageError::Request {
            key: key.to_string(),
            reason: err.to_string(),
        })?;
        Ok(bytes.into_bytes().to_vec())
    }
}

fn object_version(e_tag: Option<&str>, last_modified: Option<&DateTime>) -> String {
    if let Some(tag) = e_tag.map(|tag| tag.trim_matches('"')).filter(|tag| !tag.is_empty()) {
        return format!("etag:{tag}");
    }
    last_modified
        .map(|modified| format!("mtime:{}.{:09}", modified.secs(), modified.subsec_nanos()))
        .unwrap_or_default()
}
