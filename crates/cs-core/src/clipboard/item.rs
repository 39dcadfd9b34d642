use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DeviceId, ItemId, UserId};
use crate::redaction::RedactionCategory;

fn is_false(value: &bool) -> bool {
    !*value
}

/// A clipboard record as seen by the presentation layer and the remote store.
///
/// `content` is always post-redaction; `content_hash` is the fingerprint of the
/// pre-redaction text so that the same copy is recognised on every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardItem {
    pub id: ItemId,
    pub content: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub device_id: DeviceId,
    pub device_name: String,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<RedactionCategory>,
    /// Not yet confirmed by the remote store.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pending: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ClipboardItem {
    /// Build a locally visible record that has not been confirmed yet.
    pub fn pending(new_item: NewClipboardItem) -> Self {
        Self::from_new(ItemId::provisional(), new_item, true)
    }

    /// Build a confirmed record from an insert payload and the id the store assigned.
    pub fn confirmed(id: ItemId, new_item: NewClipboardItem) -> Self {
        Self::from_new(id, new_item, false)
    }

    fn from_new(id: ItemId, new_item: NewClipboardItem, pending: bool) -> Self {
        let NewClipboardItem {
            content,
            content_hash,
            user_id,
            device_id,
            device_name,
            origin,
            created_at,
            categories,
        } = new_item;

        Self {
            id,
            content,
            content_hash,
            user_id,
            device_id,
            device_name,
            origin,
            created_at,
            categories,
            pending,
            is_deleted: false,
            deleted_at: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.is_deleted
    }

    /// Insert payload carrying the same content, used when a pending record is flushed.
    pub fn to_new_item(&self, user_id: UserId) -> NewClipboardItem {
        NewClipboardItem {
            content: self.content.clone(),
            content_hash: self.content_hash.clone(),
            user_id: Some(user_id),
            device_id: self.device_id.clone(),
            device_name: self.device_name.clone(),
            origin: self.origin.clone(),
            created_at: self.created_at,
            categories: self.categories.clone(),
        }
    }
}

/// Insert payload for the remote store. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClipboardItem {
    pub content: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub device_id: DeviceId,
    pub device_name: String,
    pub origin: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<RedactionCategory>,
}
