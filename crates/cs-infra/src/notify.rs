use anyhow::{anyhow, Result};
use async_trait::async_trait;
use cs_core::messages::Notification;
use cs_core::ports::NotificationPort;
use tokio::sync::mpsc;

/// Forwards notifications to whoever holds the receiving end.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPort for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| anyhow!("presentation layer is gone"))
    }
}
