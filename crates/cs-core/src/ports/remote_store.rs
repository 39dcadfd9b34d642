use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Session;
use crate::clipboard::{ClipboardItem, NewClipboardItem};
use crate::ids::{DeviceId, ItemId, UserId};
use crate::sync::RemoteError;

/// Device registration row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub device_name: String,
    pub user_id: UserId,
    pub last_seen_at: DateTime<Utc>,
}

/// Remote clipboard store.
///
/// Every call is scoped to the user of the given session; the store enforces
/// that scoping itself. The dedup key is `(user, content_hash, not deleted)`.
#[async_trait]
pub trait RemoteStorePort: Send + Sync {
    async fn insert_item(
        &self,
        session: &Session,
        item: &NewClipboardItem,
    ) -> Result<ClipboardItem, RemoteError>;

    /// Existing non-deleted item with the given fingerprint.
    async fn find_active_by_hash(
        &self,
        session: &Session,
        content_hash: &str,
    ) -> Result<Option<ClipboardItem>, RemoteError>;

    /// Non-deleted items ordered by `created_at` descending.
    async fn list_active(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ClipboardItem>, RemoteError>;

    async fn soft_delete(&self, session: &Session, id: &ItemId) -> Result<(), RemoteError>;

    async fn upsert_device(&self, session: &Session, device: &DeviceRecord)
        -> Result<(), RemoteError>;
}
