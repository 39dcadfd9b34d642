#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cs_app::{LifecycleSupervisor, MessageRouter, SyncDeps};
use cs_core::messages::Notification;
use cs_core::ports::KeyValueStorePort;
use cs_core::SyncConfig;
use cs_infra::{ChannelNotifier, InMemoryCloud, InMemoryKeyValueStore, ManualClock};
use tokio::sync::mpsc;

pub const START_MS: i64 = 1_700_000_000_000;

pub struct Harness {
    pub supervisor: Arc<LifecycleSupervisor>,
    pub router: MessageRouter,
    pub cloud: Arc<InMemoryCloud>,
    pub clock: Arc<ManualClock>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_storage(config, Arc::new(InMemoryKeyValueStore::new()))
    }

    pub fn with_storage(config: SyncConfig, storage: Arc<dyn KeyValueStorePort>) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let cloud = Arc::new(InMemoryCloud::new(clock.clone()));
        let (notifier, notifications) = ChannelNotifier::new();

        let supervisor = LifecycleSupervisor::new(
            SyncDeps {
                identity: cloud.clone(),
                remote: cloud.clone(),
                push: cloud.clone(),
                storage,
                notifier: Arc::new(notifier),
                clock: clock.clone(),
            },
            config,
        );
        let router = MessageRouter::new(Arc::clone(&supervisor));

        Self {
            supervisor,
            router,
            cloud,
            clock,
            notifications,
        }
    }

    /// Everything emitted so far.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        retry_base_delay_ms: 10,
        device_name: Some("Test Laptop".to_string()),
        ..SyncConfig::default()
    }
}

/// Poll `check` until it holds, giving background tasks a chance to run.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}
