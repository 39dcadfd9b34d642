//! # Engine Dependencies
//!
//! Dependency grouping for constructing the lifecycle supervisor.
//!
//! **Note**: This is NOT a Builder pattern.
//! - No build steps
//! - No default values
//! - Just parameter grouping

use std::sync::Arc;

use cs_core::ports::*;

/// All collaborators the engine consumes. Every dependency is required.
#[derive(Clone)]
pub struct SyncDeps {
    // Remote collaborators
    pub identity: Arc<dyn IdentityProviderPort>,
    pub remote: Arc<dyn RemoteStorePort>,
    pub push: Arc<dyn PushChannelPort>,

    // Local collaborators
    pub storage: Arc<dyn KeyValueStorePort>,
    pub notifier: Arc<dyn NotificationPort>,

    // System
    pub clock: Arc<dyn ClockPort>,
}
