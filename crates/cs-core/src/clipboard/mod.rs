//! Clipboard item model and content fingerprinting.

mod device;
mod fingerprint;
mod item;

pub use device::DeviceIdentity;
pub use fingerprint::{fingerprint, EMPTY_FINGERPRINT};
pub use item::{ClipboardItem, NewClipboardItem};
