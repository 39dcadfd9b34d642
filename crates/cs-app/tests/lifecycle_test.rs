//! Initialization, login/logout, wake recovery and pending flushes.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{test_config, wait_until, Harness};
use cs_core::ids::{DeviceId, UserId};
use cs_core::messages::{Notification, Request};
use cs_core::ports::{KeyValueStorePort, StorageChange};
use cs_core::{LifecycleState, LoginState, SyncConfig};
use cs_infra::ManualWakeTrigger;
use serde_json::Value;
use tokio::sync::broadcast;

mockall::mock! {
    pub Store {}

    #[async_trait]
    impl KeyValueStorePort for Store {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;
        async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
        async fn remove(&self, key: &str) -> anyhow::Result<()>;
        fn subscribe_changes(&self) -> broadcast::Receiver<StorageChange>;
    }
}

/// Store whose first read fails, then behaves like a plain map.
fn flaky_store() -> MockStore {
    let map: Arc<Mutex<HashMap<String, Value>>> = Arc::default();
    let reads = Arc::new(AtomicUsize::new(0));
    let mut store = MockStore::new();

    let get_map = map.clone();
    store.expect_get().returning(move |key| {
        if reads.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(anyhow::anyhow!("storage unavailable"));
        }
        Ok(get_map.lock().unwrap().get(key).cloned())
    });
    let set_map = map.clone();
    store.expect_set().returning(move |key, value| {
        set_map.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    });
    store.expect_remove().returning(move |key| {
        map.lock().unwrap().remove(key);
        Ok(())
    });
    store
        .expect_subscribe_changes()
        .returning(|| broadcast::channel(1).1);
    store
}

async fn wait_for_subscription(harness: &Harness, active: bool) {
    let context = harness.supervisor.context().clone();
    wait_until("subscription state", || {
        let context = context.clone();
        async move { context.is_subscription_active() == active }
    })
    .await;
}

#[tokio::test]
async fn concurrent_initialization_runs_once() {
    let harness = Harness::new(test_config());
    harness.cloud.sign_in("alice");

    let supervisor = &harness.supervisor;
    let results = futures::future::join_all((0..5).map(|_| supervisor.initialize())).await;

    for result in results {
        assert_eq!(
            result.unwrap().authenticated_user,
            Some(UserId::from("alice"))
        );
    }
    wait_for_subscription(&harness, true).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.cloud.subscribe_count(), 1);
    assert_eq!(harness.cloud.device_upsert_count(), 1);
    assert_eq!(harness.supervisor.lifecycle_state(), LifecycleState::Ready);

    let devices = harness.cloud.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_name, "Test Laptop");
}

#[tokio::test]
async fn failed_initialization_is_retried_on_next_call() {
    let harness = Harness::with_storage(test_config(), Arc::new(flaky_store()));

    let first = harness.supervisor.initialize().await;
    assert!(first.is_err());
    assert_ne!(harness.supervisor.lifecycle_state(), LifecycleState::Ready);

    let second = harness.supervisor.initialize().await;
    assert!(second.is_ok(), "{second:?}");
    assert_eq!(harness.supervisor.lifecycle_state(), LifecycleState::Ready);
}

#[tokio::test]
async fn requests_are_served_after_failed_initialization() {
    let harness = Harness::with_storage(test_config(), Arc::new(flaky_store()));

    // The request's own initialization attempt fails; local state still answers.
    let response = harness.router.handle(Request::GetItems).await;

    assert!(response.success);
    assert_eq!(response.items, Some(vec![]));
}

#[tokio::test(start_paused = true)]
async fn slow_session_check_does_not_fail_initialization() {
    let harness = Harness::new(SyncConfig {
        init_session_timeout_ms: 1_000,
        ..test_config()
    });
    harness.cloud.sign_in("alice");
    harness.cloud.set_session_delay(Some(Duration::from_secs(30)));

    let outcome = harness.supervisor.initialize().await.unwrap();

    assert!(outcome.session_timed_out);
    assert!(outcome.authenticated_user.is_none());
    assert_eq!(harness.supervisor.lifecycle_state(), LifecycleState::Ready);
}

#[tokio::test]
async fn sign_out_tears_down_session_state() {
    let mut harness = Harness::new(test_config());
    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();
    wait_for_subscription(&harness, true).await;

    harness.cloud.sign_out();
    wait_for_subscription(&harness, false).await;

    let cloud = harness.cloud.clone();
    wait_until("remote subscription closed", || {
        let cloud = cloud.clone();
        async move { cloud.active_subscriptions() == 0 }
    })
    .await;
    assert!(!harness.supervisor.login_state().is_logged_in());
    assert!(harness
        .drain_notifications()
        .contains(&Notification::AuthChanged {
            authenticated: false
        }));
}

#[tokio::test]
async fn wake_resubscribes_after_push_disconnect() {
    let harness = Harness::new(test_config());
    let trigger = ManualWakeTrigger::new();
    let wake_loop = harness.supervisor.arm_wake(&trigger);

    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();
    wait_for_subscription(&harness, true).await;

    harness.cloud.disconnect_push();
    wait_for_subscription(&harness, false).await;

    assert_eq!(trigger.fire(), 1);
    wait_for_subscription(&harness, true).await;
    assert_eq!(harness.cloud.subscribe_count(), 2);

    // Pushes flow again on the new subscription.
    harness
        .cloud
        .insert_from_device(&UserId::from("alice"), &DeviceId::from("phone"), "after wake");
    let cache = harness.supervisor.cache().clone();
    wait_until("push after resubscribe", || {
        let cache = cache.clone();
        async move { cache.items().await.unwrap().len() == 1 }
    })
    .await;

    wake_loop.abort();
}

#[tokio::test]
async fn failed_subscription_is_retried_on_wake() {
    let harness = Harness::new(test_config());
    harness.cloud.fail_next_subscribes(u32::MAX);
    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();

    let supervisor = harness.supervisor.clone();
    wait_until("login attempt settled", || {
        let supervisor = supervisor.clone();
        async move { supervisor.login_state() == LoginState::LoggedOut }
    })
    .await;
    assert!(!harness.supervisor.context().is_subscription_active());

    harness.cloud.fail_next_subscribes(0);
    harness.supervisor.on_wake().await;

    wait_until("logged in after wake", || {
        let supervisor = supervisor.clone();
        async move { supervisor.login_state().is_logged_in() }
    })
    .await;
    assert!(harness.supervisor.context().is_subscription_active());
}

#[tokio::test]
async fn flush_stops_when_session_is_gone() {
    let harness = Harness::new(test_config());
    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();
    harness.cloud.revoke_session();

    for text in ["one", "two"] {
        let response = harness
            .router
            .handle(Request::Upload {
                content: text.into(),
                origin: None,
            })
            .await;
        assert_eq!(response.error_code.as_deref(), Some("NOT_AUTHENTICATED"));
    }

    let report = harness.supervisor.flush_pending().await.unwrap();

    assert!(report.aborted);
    assert_eq!(report.confirmed, 0);
    assert_eq!(harness.cloud.insert_attempts(), 0);
    assert_eq!(harness.supervisor.cache().pending_items().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_abort_flush_and_keep_records() {
    let harness = Harness::new(test_config());
    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();
    wait_for_subscription(&harness, true).await;

    harness.cloud.fail_next_inserts(100);
    for text in ["first", "second"] {
        let response = harness
            .router
            .handle(Request::Upload {
                content: text.into(),
                origin: None,
            })
            .await;
        assert_eq!(
            response.error_code.as_deref(),
            Some("NETWORK_OR_SERVER_ERROR")
        );
    }
    harness.cloud.fail_next_inserts(0);
    harness.cloud.reject_auth(true);
    let lookups_before = harness.cloud.lookup_count();

    let report = harness.supervisor.flush_pending().await.unwrap();

    assert!(report.aborted);
    assert_eq!(harness.cloud.lookup_count(), lookups_before + 1);
    assert_eq!(harness.supervisor.cache().pending_items().await.unwrap().len(), 2);

    harness.cloud.reject_auth(false);
    let report = harness.supervisor.flush_pending().await.unwrap();
    assert_eq!(report.confirmed, 2);
    assert!(harness.supervisor.cache().pending_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn pending_record_already_stored_remotely_is_dropped() {
    let harness = Harness::new(test_config());
    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();
    wait_for_subscription(&harness, true).await;

    harness.cloud.revoke_session();
    harness
        .router
        .handle(Request::Upload {
            content: "shared".into(),
            origin: None,
        })
        .await;
    harness
        .cloud
        .insert_from_device(&UserId::from("alice"), &DeviceId::from("phone"), "shared");
    harness.cloud.sign_in("alice");

    let report = harness.supervisor.flush_pending().await.unwrap();

    assert_eq!(report.deduplicated, 1);
    let items = harness.supervisor.cache().items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(!items[0].pending);
    assert_eq!(items[0].device_id, DeviceId::from("phone"));
}

#[tokio::test]
async fn switching_users_resets_the_cache_view() {
    let harness = Harness::new(test_config());
    harness.cloud.sign_in("alice");
    harness.supervisor.initialize().await.unwrap();
    wait_for_subscription(&harness, true).await;
    assert!(harness
        .router
        .handle(Request::Upload {
            content: "alice only".into(),
            origin: None,
        })
        .await
        .success);

    harness.cloud.sign_in("bob");

    let cache = harness.supervisor.cache().clone();
    wait_until("bob's listing reconciled", || {
        let cache = cache.clone();
        async move { cache.items().await.unwrap().is_empty() }
    })
    .await;
    assert!(harness.cloud.items_for(&UserId::from("bob")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn sign_out_is_not_held_behind_a_retrying_flush() {
    let mut harness = Harness::new(SyncConfig {
        retry_base_delay_ms: 5_000,
        ..test_config()
    });
    harness.supervisor.initialize().await.unwrap();
    let response = harness
        .router
        .handle(Request::Upload {
            content: "written offline".into(),
            origin: None,
        })
        .await;
    assert_eq!(response.error_code.as_deref(), Some("NOT_AUTHENTICATED"));

    harness.cloud.fail_next_inserts(100);
    harness.cloud.sign_in("alice");
    let cloud = harness.cloud.clone();
    wait_until("flush reached the network", || {
        let cloud = cloud.clone();
        async move { cloud.insert_attempts() >= 1 }
    })
    .await;
    harness.drain_notifications();

    harness.cloud.sign_out();
    wait_for_subscription(&harness, false).await;
    let supervisor = harness.supervisor.clone();
    wait_until("logged out", || {
        let supervisor = supervisor.clone();
        async move { supervisor.login_state() == LoginState::LoggedOut }
    })
    .await;

    assert_eq!(harness.cloud.insert_attempts(), 1, "flush is still backing off");
    assert!(harness
        .drain_notifications()
        .contains(&Notification::AuthChanged {
            authenticated: false
        }));

    // Let the abandoned login run out; it must not report a login.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.supervisor.login_state(), LoginState::LoggedOut);
    assert!(!harness
        .drain_notifications()
        .contains(&Notification::AuthChanged {
            authenticated: true
        }));
    let pending = harness.supervisor.cache().pending_items().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content, "written offline");
}

