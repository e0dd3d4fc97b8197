use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::Serialize;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NoticeKind {
    PendingReview,
    AiFailure,
    RetryExhausted,
    Overdue,
    Reviewed,
}

impl NoticeKind {
    fn describe(self, count: usize) -> String {
        let plural = if count == 1 { "" } else { "s" };
        match self {
            NoticeKind::PendingReview => format!("{count} answer{plural} awaiting review"),
            NoticeKind::AiFailure => format!("{count} AI correction failure{plural}"),
            NoticeKind::RetryExhausted => {
                format!("{count} answer{plural} need manual correction after AI retries")
            }
            NoticeKind::Overdue => format!("{count} overdue answer{plural}"),
            NoticeKind::Reviewed => format!("{count} answer{plural} reviewed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct NoticeItem {
    pub(crate) kind: NoticeKind,
    pub(crate) unit_id: String,
    pub(crate) question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) pending_answer_id: Option<String>,
    pub(crate) message: String,
}

/// Outbound notification hook. Delivery is fire-and-forget: implementations must
/// not block the caller and must not surface delivery errors.
pub(crate) trait Notifier: Send + Sync {
    fn notify(&self, recipient_id: &str, summary: &str, items: Vec<NoticeItem>);
}

pub(crate) fn notifier_from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn Notifier>> {
    match settings.notifications().webhook_url.as_deref() {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(settings.notifications().timeout_seconds),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

/// Writes notices to the log; used when no webhook is configured.
pub(crate) struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient_id: &str, summary: &str, items: Vec<NoticeItem>) {
        metrics::counter!("notifications_total", "channel" => "log").increment(1);
        tracing::info!(recipient_id, summary, items = items.len(), "Notification");
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient_id: &'a str,
    summary: &'a str,
    items: Vec<NoticeItem>,
}

pub(crate) struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub(crate) fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("Failed to build notification HTTP client")?;
        Ok(Self { client, url: url.to_string() })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, recipient_id: &str, summary: &str, items: Vec<NoticeItem>) {
        let body = match serde_json::to_vec(&WebhookPayload { recipient_id, summary, items }) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, recipient_id, "Failed to encode notification");
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(recipient_id, "No async runtime; notification dropped");
            return;
        };

        metrics::counter!("notifications_total", "channel" => "webhook").increment(1);
        let request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let recipient_id = recipient_id.to_string();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => tracing::warn!(
                    recipient_id = %recipient_id,
                    status = response.status().as_u16(),
                    "Notification webhook rejected notice"
                ),
                Err(err) => tracing::warn!(
                    recipient_id = %recipient_id,
                    error = %err,
                    "Notification webhook unreachable"
                ),
            }
        });
    }
}

/// Notices collected during one pass and sent as a single message per recipient.
#[derive(Debug, Default)]
pub(crate) struct NoticeBatch {
    by_recipient: BTreeMap<String, Vec<NoticeItem>>,
}

impl NoticeBatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, recipient_id: &str, item: NoticeItem) {
        self.by_recipient.entry(recipient_id.to_string()).or_default().push(item);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_recipient.is_empty()
    }

    pub(crate) fn recipients(&self) -> usize {
        self.by_recipient.len()
    }

    /// Sends one notice per recipient, items grouped by unit. Returns how many
    /// notices went out.
    pub(crate) fn flush(self, notifier: &dyn Notifier) -> usize {
        let mut sent = 0;
        for (recipient_id, mut items) in self.by_recipient {
            items.sort_by(|a, b| a.unit_id.cmp(&b.unit_id).then(a.kind.cmp(&b.kind)));
            let summary = summarize(&items);
            notifier.notify(&recipient_id, &summary, items);
            sent += 1;
        }
        sent
    }
}

fn summarize(items: &[NoticeItem]) -> String {
    let mut counts: BTreeMap<NoticeKind, usize> = BTreeMap::new();
    for item in items {
        *counts.entry(item.kind).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(kind, count)| kind.describe(count))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingNotifier;

    fn item(kind: NoticeKind, unit: &str, question: &str) -> NoticeItem {
        NoticeItem {
            kind,
            unit_id: unit.to_string(),
            question_id: question.to_string(),
            pending_answer_id: None,
            message: format!("{question} needs attention"),
        }
    }

    #[test]
    fn batch_sends_one_notice_per_recipient() {
        let notifier = RecordingNotifier::default();
        let mut batch = NoticeBatch::new();
        batch.push("reviewer-1", item(NoticeKind::PendingReview, "unit-b", "q-3"));
        batch.push("reviewer-1", item(NoticeKind::PendingReview, "unit-a", "q-1"));
        batch.push("reviewer-1", item(NoticeKind::AiFailure, "unit-a", "q-1"));
        batch.push("reviewer-2", item(NoticeKind::PendingReview, "unit-c", "q-9"));
        assert_eq!(batch.recipients(), 2);

        assert_eq!(batch.flush(&notifier), 2);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        let first = &sent[0];
        assert_eq!(first.recipient_id, "reviewer-1");
        assert_eq!(first.summary, "2 answers awaiting review, 1 AI correction failure");
        let units: Vec<&str> = first.items.iter().map(|item| item.unit_id.as_str()).collect();
        assert_eq!(units, vec!["unit-a", "unit-a", "unit-b"]);
        assert_eq!(sent[1].summary, "1 answer awaiting review");
    }

    #[test]
    fn empty_batch_sends_nothing() {
        let notifier = RecordingNotifier::default();
        let batch = NoticeBatch::new();
        assert!(batch.is_empty());
        assert_eq!(batch.flush(&notifier), 0);
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn webhook_payload_shape() {
        let payload = WebhookPayload {
            recipient_id: "reviewer-1",
            summary: "1 overdue answer",
            items: vec![item(NoticeKind::Overdue, "unit-a", "q-1")],
        };
        let json = serde_json::to_value(&payload).expect("json");
        assert_eq!(json["recipient_id"], "reviewer-1");
        assert_eq!(json["items"][0]["kind"], "overdue");
        assert!(json["items"][0].get("pending_answer_id").is_none());
    }
}
