//! # Dependency Injection
//!
//! The only place that knows about `cs-infra` and `cs-app` at the same time.
//! It assembles; it does not decide.

use std::sync::Arc;

use cs_app::{LifecycleSupervisor, MessageRouter, SyncDeps};
use cs_core::messages::Notification;
use cs_core::ports::{ClockPort, KeyValueStorePort};
use cs_core::SyncConfig;
use cs_infra::{ChannelNotifier, InMemoryCloud, SystemClock};
use tokio::sync::mpsc;

/// The assembled engine plus the handles the local runtime drives directly.
pub struct Wired {
    pub supervisor: Arc<LifecycleSupervisor>,
    pub router: MessageRouter,
    /// Identity provider, remote store and push channel.
    pub cloud: Arc<InMemoryCloud>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

pub fn wire(config: SyncConfig, storage: Arc<dyn KeyValueStorePort>) -> Wired {
    wire_with_clock(config, storage, Arc::new(SystemClock))
}

pub fn wire_with_clock(
    config: SyncConfig,
    storage: Arc<dyn KeyValueStorePort>,
    clock: Arc<dyn ClockPort>,
) -> Wired {
    let cloud = Arc::new(InMemoryCloud::new(Arc::clone(&clock)));
    let (notifier, notifications) = ChannelNotifier::new();

    let deps = SyncDeps {
        identity: cloud.clone(),
        remote: cloud.clone(),
        push: cloud.clone(),
        storage,
        notifier: Arc::new(notifier),
        clock,
    };

    let supervisor = LifecycleSupervisor::new(deps, config);
    let router = MessageRouter::new(Arc::clone(&supervisor));

    Wired {
        supervisor,
        router,
        cloud,
        notifications,
    }
}
