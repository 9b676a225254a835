use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// Delivery channel for producer-facing notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        severity: Severity,
    ) -> Result<(), NotifyError>;
}

/// Sink that only records notifications in the service log.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
        severity: Severity,
    ) -> Result<(), NotifyError> {
        match severity {
            Severity::Error => error!(%user_id, title, body, "Notification"),
            Severity::Warning => warn!(%user_id, title, body, "Notification"),
            Severity::Info | Severity::Success => info!(%user_id, title, body, "Notification"),
        }
        Ok(())
    }
}

/// Send a notification, logging instead of propagating transport failures.
pub async fn notify_best_effort(
    sink: &dyn NotificationSink,
    user_id: Uuid,
    title: &str,
    body: &str,
    severity: Severity,
) {
    if let Err(e) = sink.notify(user_id, title, body, severity).await {
        warn!(%user_id, error = %e, "Failed to deliver notification");
    }
}
