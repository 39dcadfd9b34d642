//! # cs-core
//!
//! Core domain models and policies for ClipSync.
//!
//! This crate contains pure business logic without any infrastructure dependencies.
//! Everything that talks to the outside world (identity provider, remote store,
//! push channel, durable storage, presentation layer) is expressed as a port in
//! [`ports`] and implemented elsewhere.

pub mod auth;
pub mod clipboard;
pub mod config;
pub mod ids;
pub mod lifecycle;
pub mod messages;
pub mod ports;
pub mod redaction;
pub mod settings;
pub mod sync;

pub use auth::{AuthEvent, AuthEventKind, Session};
pub use clipboard::{fingerprint, ClipboardItem, DeviceIdentity, EMPTY_FINGERPRINT};
pub use config::{DebounceMode, SyncConfig};
pub use ids::{DeviceId, ItemId, UserId};
pub use lifecycle::{LifecycleState, LoginState};
pub use messages::{Notification, Request, Response};
pub use redaction::{redact, RedactionCategory, RedactionResult, REDACTED_SENTINEL};
pub use settings::Settings;
pub use sync::{RemoteError, UploadError};
