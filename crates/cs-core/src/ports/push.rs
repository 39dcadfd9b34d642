use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::auth::Session;
use crate::clipboard::ClipboardItem;
use crate::sync::RemoteError;

/// Row change delivered by the push channel. Delivery is at-least-once and
/// unordered relative to responses of locally initiated uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Insert(ClipboardItem),
    Update(ClipboardItem),
}

#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    async fn unsubscribe(&self);
}

pub struct PushSubscription {
    pub events: mpsc::Receiver<PushEvent>,
    pub handle: Box<dyn SubscriptionHandle>,
}

impl std::fmt::Debug for PushSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSubscription").finish_non_exhaustive()
    }
}

/// Live insert/update stream scoped to the authenticated user.
#[async_trait]
pub trait PushChannelPort: Send + Sync {
    async fn subscribe(&self, session: &Session) -> Result<PushSubscription, RemoteError>;
}
