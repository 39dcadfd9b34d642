//! Use cases of the sync engine
//!
//! ```text
//! [capture source]
//!        ↓
//! CaptureClipboard ──→ UploadPipeline ──→ remote store
//!        ↓                    (debounce → rate limit → redact → dedup → retry)
//! ItemCache  ←── reconciliation / push updates
//!        ↓
//! [presentation layer]
//! ```

mod capture;
mod device;
mod reconcile;
mod router;
mod settings;
mod upload;

pub use capture::{CaptureClipboard, CaptureEvent, CaptureOutcome, CaptureSource};
pub use device::LocalDevice;
pub use reconcile::{merge_items, ItemCache, ITEMS_KEY};
pub use router::MessageRouter;
pub use settings::SettingsService;
pub use upload::{PreparedContent, UploadOptions, UploadPipeline, TRUNCATION_MARKER};

use cs_core::messages::Notification;
use cs_core::ports::NotificationPort;
use tracing::warn;

/// Deliver a notification; a closed or failing presentation layer is logged, not fatal.
pub(crate) async fn notify_quietly(notifier: &dyn NotificationPort, notification: Notification) {
    if let Err(err) = notifier.notify(notification).await {
        warn!(error = %err, "failed to deliver notification");
    }
}
