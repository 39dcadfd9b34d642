//! ID type wrappers for type safety.

mod id_macro;

use serde::{Deserialize, Serialize};

use id_macro::impl_id;

const PENDING_PREFIX: &str = "pending-";

/// Identifier of a clipboard item.
///
/// Confirmed items carry the id assigned by the remote store. Items that
/// have not been confirmed yet carry a provisional id with a `pending-` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

/// Stable identifier of this installation, generated once and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

/// Identifier of the authenticated account, assigned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl_id!(ItemId, DeviceId, UserId);

impl ItemId {
    /// Locally generated provisional id for an item awaiting confirmation.
    pub fn provisional() -> Self {
        Self(format!("{PENDING_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PENDING_PREFIX)
    }
}
