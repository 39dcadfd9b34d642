use anyhow::Result;
use async_trait::async_trait;

use crate::messages::Notification;

/// Presentation layer sink for push-style notifications.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}
