//! Notification sink and audit log
//!
//! Writes here are telemetry: callers on the inventory path never let a
//! failed write fail the business operation.

use std::sync::Arc;

use shared::{Actor, Notification};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::NotificationStore;

#[derive(Clone)]
pub struct NotificationSink {
    store: Arc<dyn NotificationStore>,
}

impl NotificationSink {
    /// Create a new NotificationSink instance
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Append an unread notification for `actor`
    pub async fn record(&self, actor: &Actor, message: &str) -> AppResult<Notification> {
        let notification = Notification::unread(actor, message);
        self.store.insert_notification(&notification).await
    }

    /// The actor's notifications, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>> {
        self.store.list_notifications(Some(user_id)).await
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<Notification> {
        self.store
            .mark_notification_read(user_id, notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification".to_string()))
    }

    /// Audit view across every actor, newest first
    pub async fn list_all(&self) -> AppResult<Vec<Notification>> {
        let logs = self.store.list_notifications(None).await?;
        if logs.is_empty() {
            return Err(AppError::NotFound("Logs".to_string()));
        }
        Ok(logs)
    }

    pub async fn clear_all(&self) -> AppResult<u64> {
        let cleared = self.store.clear_notifications().await?;
        tracing::info!(cleared, "Audit log cleared");
        Ok(cleared)
    }
}
