use std::sync::Arc;

use anyhow::Result;
use cs_core::ids::DeviceId;
use cs_core::messages::Notification;
use cs_core::ports::{NotificationPort, PushEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::SyncContext;
use crate::usecases::{notify_quietly, ItemCache};

/// Drains one push subscription into the cache.
///
/// Events are applied only while the session epoch the subscription was
/// opened under is still current.
pub(crate) struct PushConsumer {
    pub(crate) context: Arc<SyncContext>,
    pub(crate) cache: Arc<ItemCache>,
    pub(crate) notifier: Arc<dyn NotificationPort>,
    pub(crate) local_device: DeviceId,
    pub(crate) epoch: u64,
}

impl PushConsumer {
    pub(crate) fn spawn(self, events: mpsc::Receiver<PushEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    async fn run(self, mut events: mpsc::Receiver<PushEvent>) {
        while let Some(event) = events.recv().await {
            if !self.context.is_epoch_current(self.epoch) {
                debug!(epoch = self.epoch, "session changed, push consumer exiting");
                return;
            }
            if let Err(err) = self.apply(event).await {
                warn!(error = %err, "failed to apply push event");
            }
        }

        if self.context.is_epoch_current(self.epoch) {
            info!("push channel closed");
            self.context.set_subscription_active(false);
        }
    }

    async fn apply(&self, event: PushEvent) -> Result<()> {
        match event {
            PushEvent::Insert(item) if item.device_id == self.local_device => {
                debug!(item_id = %item.id, "ignoring own-device insert");
            }
            PushEvent::Insert(item) | PushEvent::Update(item) if item.is_deleted => {
                let id = item.id;
                self.cache.apply_remote_soft_delete(&id).await?;
                notify_quietly(self.notifier.as_ref(), Notification::ItemDeleted { id }).await;
            }
            PushEvent::Insert(item) | PushEvent::Update(item) => {
                debug!(item_id = %item.id, device_id = %item.device_id, "applying remote item");
                self.cache.apply_remote_insert(item.clone()).await?;
                notify_quietly(self.notifier.as_ref(), Notification::NewItem { item }).await;
            }
        }
        Ok(())
    }
}
