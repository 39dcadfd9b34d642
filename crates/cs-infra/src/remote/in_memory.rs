use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cs_core::auth::{AuthEvent, AuthEventKind, Session};
use cs_core::clipboard::{fingerprint, ClipboardItem, NewClipboardItem};
use cs_core::ids::{DeviceId, ItemId, UserId};
use cs_core::ports::{
    ClockPort, DeviceRecord, IdentityProviderPort, PushChannelPort, PushEvent, PushSubscription,
    RemoteStorePort, SubscriptionHandle,
};
use cs_core::RemoteError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;
use tracing::{debug, info};

const PUSH_BUFFER: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct CloudState {
    session: Option<Session>,
    items: Vec<ClipboardItem>,
    devices: HashMap<DeviceId, DeviceRecord>,
    next_id: u64,
}

#[derive(Default)]
struct Faults {
    insert_failures: u32,
    reject_auth: bool,
    subscribe_failures: u32,
    session_delay: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    insert_attempts: AtomicUsize,
    lookups: AtomicUsize,
    listings: AtomicUsize,
    subscribes: AtomicUsize,
    device_upserts: AtomicUsize,
    refreshes: AtomicUsize,
}

type Subscriptions = Arc<Mutex<HashMap<u64, AbortHandle>>>;

/// Cloud backend kept entirely in memory.
///
/// One instance plays the identity provider, the remote store and the push
/// channel. The store enforces user scoping and the
/// `(user, content_hash, not deleted)` uniqueness key itself.
pub struct InMemoryCloud {
    clock: Arc<dyn ClockPort>,
    state: Mutex<CloudState>,
    faults: Mutex<Faults>,
    counters: Counters,
    auth_listeners: Mutex<Vec<mpsc::UnboundedSender<AuthEvent>>>,
    push_tx: broadcast::Sender<(UserId, PushEvent)>,
    subscriptions: Subscriptions,
    next_subscription: AtomicU64,
}

impl InMemoryCloud {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            clock,
            state: Mutex::new(CloudState::default()),
            faults: Mutex::new(Faults::default()),
            counters: Counters::default(),
            auth_listeners: Mutex::new(Vec::new()),
            push_tx: broadcast::channel(PUSH_BUFFER).0,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_subscription: AtomicU64::new(1),
        }
    }

    // === Identity control ===

    /// Establish a session for `user` and emit `SIGNED_IN`.
    pub fn sign_in(&self, user: impl Into<UserId>) -> Session {
        let user_id = user.into();
        let session = Session {
            access_token: format!("token-{}-{}", user_id, uuid::Uuid::new_v4()),
            user_id,
            expires_at: None,
        };
        lock(&self.state).session = Some(session.clone());
        info!(user_id = %session.user_id, "cloud: signed in");
        self.emit(AuthEvent::signed_in(session.clone()));
        session
    }

    /// Drop the session and emit `SIGNED_OUT`.
    pub fn sign_out(&self) {
        lock(&self.state).session = None;
        info!("cloud: signed out");
        self.emit(AuthEvent::signed_out());
    }

    /// Invalidate the session without telling listeners.
    pub fn revoke_session(&self) {
        lock(&self.state).session = None;
    }

    pub fn emit(&self, event: AuthEvent) {
        lock(&self.auth_listeners).retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn current_session(&self) -> Option<Session> {
        lock(&self.state).session.clone()
    }

    // === Fault injection ===

    pub fn fail_next_inserts(&self, count: u32) {
        lock(&self.faults).insert_failures = count;
    }

    /// Reject every store call as if the token were invalid.
    pub fn reject_auth(&self, reject: bool) {
        lock(&self.faults).reject_auth = reject;
    }

    pub fn fail_next_subscribes(&self, count: u32) {
        lock(&self.faults).subscribe_failures = count;
    }

    /// Delay every session lookup and refresh.
    pub fn set_session_delay(&self, delay: Option<Duration>) {
        lock(&self.faults).session_delay = delay;
    }

    /// Close every live push subscription, as a dropped socket would.
    pub fn disconnect_push(&self) {
        for (_, handle) in lock(&self.subscriptions).drain() {
            handle.abort();
        }
    }

    // === Other devices ===

    /// Insert an item on behalf of another device of `user` and push it.
    pub fn insert_from_device(
        &self,
        user: &UserId,
        device_id: &DeviceId,
        content: &str,
    ) -> ClipboardItem {
        let new_item = NewClipboardItem {
            content: content.to_string(),
            content_hash: fingerprint(content),
            user_id: Some(user.clone()),
            device_id: device_id.clone(),
            device_name: format!("Device {device_id}"),
            origin: "remote".to_string(),
            created_at: self.clock.now(),
            categories: Vec::new(),
        };
        let item = self.store_item(new_item);
        self.publish(user, PushEvent::Insert(item.clone()));
        item
    }

    /// Soft-delete an item from elsewhere and push the update.
    pub fn delete_from_elsewhere(&self, id: &ItemId) -> Option<ClipboardItem> {
        let deleted = self.mark_deleted(id, None)?;
        if let Some(user) = deleted.user_id.clone() {
            self.publish(&user, PushEvent::Update(deleted.clone()));
        }
        Some(deleted)
    }

    // === Inspection ===

    pub fn items_for(&self, user: &UserId) -> Vec<ClipboardItem> {
        lock(&self.state)
            .items
            .iter()
            .filter(|item| item.user_id.as_ref() == Some(user))
            .cloned()
            .collect()
    }

    pub fn devices(&self) -> Vec<DeviceRecord> {
        lock(&self.state).devices.values().cloned().collect()
    }

    pub fn insert_attempts(&self) -> usize {
        self.counters.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn lookup_count(&self) -> usize {
        self.counters.lookups.load(Ordering::SeqCst)
    }

    pub fn listing_count(&self) -> usize {
        self.counters.listings.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self) -> usize {
        self.counters.subscribes.load(Ordering::SeqCst)
    }

    pub fn device_upsert_count(&self) -> usize {
        self.counters.device_upserts.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.counters.refreshes.load(Ordering::SeqCst)
    }

    pub fn active_subscriptions(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    // === Internals ===

    fn authorize(&self, session: &Session) -> Result<(), RemoteError> {
        if lock(&self.faults).reject_auth {
            return Err(RemoteError::Unauthorized("JWT expired".to_string()));
        }
        match &lock(&self.state).session {
            Some(current) if current.access_token == session.access_token => Ok(()),
            _ => Err(RemoteError::Unauthorized("invalid session".to_string())),
        }
    }

    fn store_item(&self, new_item: NewClipboardItem) -> ClipboardItem {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let item = ClipboardItem::confirmed(ItemId::from(state.next_id.to_string()), new_item);
        state.items.push(item.clone());
        item
    }

    fn mark_deleted(&self, id: &ItemId, user: Option<&UserId>) -> Option<ClipboardItem> {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let item = state.items.iter_mut().find(|item| {
            item.id == *id && user.map_or(true, |user| item.user_id.as_ref() == Some(user))
        })?;
        item.is_deleted = true;
        item.deleted_at = Some(now);
        Some(item.clone())
    }

    fn publish(&self, user: &UserId, event: PushEvent) {
        let _ = self.push_tx.send((user.clone(), event));
    }

    async fn session_delay(&self) {
        let delay = lock(&self.faults).session_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IdentityProviderPort for InMemoryCloud {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        self.session_delay().await;
        Ok(self.current_session())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, RemoteError> {
        self.counters.refreshes.fetch_add(1, Ordering::SeqCst);
        self.session_delay().await;
        Ok(self.current_session())
    }

    fn on_auth_state_change(&self) -> mpsc::UnboundedReceiver<AuthEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(AuthEvent::new(
            AuthEventKind::InitialSession,
            self.current_session(),
        ));
        lock(&self.auth_listeners).push(tx);
        rx
    }
}

#[async_trait]
impl RemoteStorePort for InMemoryCloud {
    async fn insert_item(
        &self,
        session: &Session,
        item: &NewClipboardItem,
    ) -> Result<ClipboardItem, RemoteError> {
        self.counters.insert_attempts.fetch_add(1, Ordering::SeqCst);
        self.authorize(session)?;

        {
            let mut faults = lock(&self.faults);
            if faults.insert_failures > 0 {
                faults.insert_failures -= 1;
                return Err(RemoteError::Network("connection reset".to_string()));
            }
        }

        let duplicate = lock(&self.state).items.iter().any(|existing| {
            existing.user_id.as_ref() == Some(&session.user_id)
                && existing.content_hash == item.content_hash
                && !existing.is_deleted
        });
        if duplicate {
            return Err(RemoteError::Server {
                status: 409,
                message: "duplicate key value violates unique constraint".to_string(),
            });
        }

        let mut new_item = item.clone();
        new_item.user_id = Some(session.user_id.clone());
        let stored = self.store_item(new_item);
        debug!(item_id = %stored.id, "cloud: item inserted");
        self.publish(&session.user_id, PushEvent::Insert(stored.clone()));
        Ok(stored)
    }

    async fn find_active_by_hash(
        &self,
        session: &Session,
        content_hash: &str,
    ) -> Result<Option<ClipboardItem>, RemoteError> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        self.authorize(session)?;

        Ok(lock(&self.state)
            .items
            .iter()
            .find(|item| {
                item.user_id.as_ref() == Some(&session.user_id)
                    && item.content_hash == content_hash
                    && !item.is_deleted
            })
            .cloned())
    }

    async fn list_active(
        &self,
        session: &Session,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ClipboardItem>, RemoteError> {
        self.counters.listings.fetch_add(1, Ordering::SeqCst);
        self.authorize(session)?;

        let mut items: Vec<ClipboardItem> = self
            .items_for(&session.user_id)
            .into_iter()
            .filter(|item| !item.is_deleted)
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    async fn soft_delete(&self, session: &Session, id: &ItemId) -> Result<(), RemoteError> {
        self.authorize(session)?;

        let deleted = self
            .mark_deleted(id, Some(&session.user_id))
            .ok_or_else(|| RemoteError::Server {
                status: 404,
                message: format!("item not found: {id}"),
            })?;
        self.publish(&session.user_id, PushEvent::Update(deleted));
        Ok(())
    }

    async fn upsert_device(
        &self,
        session: &Session,
        device: &DeviceRecord,
    ) -> Result<(), RemoteError> {
        self.counters.device_upserts.fetch_add(1, Ordering::SeqCst);
        self.authorize(session)?;

        lock(&self.state)
            .devices
            .insert(device.device_id.clone(), device.clone());
        Ok(())
    }
}

struct InMemorySubscription {
    id: u64,
    subscriptions: Subscriptions,
}

#[async_trait]
impl SubscriptionHandle for InMemorySubscription {
    async fn unsubscribe(&self) {
        if let Some(handle) = lock(&self.subscriptions).remove(&self.id) {
            handle.abort();
        }
    }
}

#[async_trait]
impl PushChannelPort for InMemoryCloud {
    async fn subscribe(&self, session: &Session) -> Result<PushSubscription, RemoteError> {
        self.counters.subscribes.fetch_add(1, Ordering::SeqCst);
        {
            let mut faults = lock(&self.faults);
            if faults.subscribe_failures > 0 {
                faults.subscribe_failures -= 1;
                return Err(RemoteError::Network("realtime channel error".to_string()));
            }
        }
        self.authorize(session)?;

        let (tx, rx) = mpsc::channel(PUSH_BUFFER);
        let mut source = self.push_tx.subscribe();
        let user_id = session.user_id.clone();

        let forwarder = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok((user, event)) if user == user_id => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscriptions).insert(id, forwarder.abort_handle());

        Ok(PushSubscription {
            events: rx,
            handle: Box::new(InMemorySubscription {
                id,
                subscriptions: Arc::clone(&self.subscriptions),
            }),
        })
    }
}
