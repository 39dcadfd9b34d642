//! Message contract between the sync engine and the presentation layer.
//!
//! Both directions are JSON-compatible tagged enums, e.g.
//! `{"type":"UPLOAD","content":"hello"}` or `{"type":"ITEM_DELETED","id":"7"}`.

use serde::{Deserialize, Serialize};

use crate::clipboard::ClipboardItem;
use crate::ids::ItemId;

/// Requests sent into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Manual upload; bypasses debounce.
    Upload {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
    /// Full reconciliation against the remote store.
    Sync,
    GetItems,
    EnableCapture,
    DisableCapture,
    DeleteItem { id: ItemId },
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ClipboardItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ClipboardItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn with_item(item: ClipboardItem) -> Self {
        Self {
            item: Some(item),
            ..Self::ok()
        }
    }

    pub fn with_items(items: Vec<ClipboardItem>) -> Self {
        Self {
            items: Some(items),
            ..Self::ok()
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            error_code: Some(code.into()),
            ..Self::default()
        }
    }
}

/// Push-style notifications emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    NewItem { item: ClipboardItem },
    ItemDeleted { id: ItemId },
    ItemsUpdated { items: Vec<ClipboardItem> },
    AuthChanged { authenticated: bool },
}
