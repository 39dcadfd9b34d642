use std::sync::{Arc, Mutex, Weak};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use cs_core::auth::{AuthEvent, AuthEventKind, Session};
use cs_core::clipboard::ClipboardItem;
use cs_core::ids::{ItemId, UserId};
use cs_core::lifecycle::{LifecycleState, LoginState};
use cs_core::messages::Notification;
use cs_core::ports::{DeviceRecord, WakeTriggerPort};
use cs_core::{SyncConfig, UploadError};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::push::PushConsumer;
use crate::context::{ActiveSubscription, SyncContext};
use crate::deps::SyncDeps;
use crate::sync::{lock, retry_with_backoff, RetryPolicy};
use crate::usecases::{
    notify_quietly, CaptureClipboard, ItemCache, LocalDevice, SettingsService, UploadPipeline,
};

/// Result of one completed initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InitOutcome {
    pub authenticated_user: Option<UserId>,
    /// The session check hit its timeout; retried on the next wake.
    pub session_timed_out: bool,
}

pub type InitResult = Result<InitOutcome, Arc<anyhow::Error>>;

type SharedInit = Shared<BoxFuture<'static, InitResult>>;

/// Counters from one pending-flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub confirmed: usize,
    /// Already stored remotely; the local record was dropped.
    pub deduplicated: usize,
    pub failed: usize,
    pub skipped: usize,
    /// The session became invalid mid-flush.
    pub aborted: bool,
}

impl FlushReport {
    fn changed_cache(&self) -> bool {
        self.confirmed > 0 || self.deduplicated > 0
    }
}

#[derive(Debug, Default)]
struct SupervisorState {
    lifecycle: LifecycleState,
    login: LoginState,
    user: Option<UserId>,
    sign_outs: u64,
}

/// A login waiting for the login worker.
struct QueuedLogin {
    session: Session,
    kind: AuthEventKind,
    sign_outs: u64,
}

/// Resumable bootstrap of the sync engine.
///
/// Owns the [`SyncContext`] and every use case. Initialization is memoized as
/// one shared in-flight future: concurrent triggers await the same run, a
/// completed run is returned as-is, and a failed run is forgotten so the next
/// trigger starts over.
pub struct LifecycleSupervisor {
    deps: SyncDeps,
    context: Arc<SyncContext>,
    settings: Arc<SettingsService>,
    device: Arc<LocalDevice>,
    cache: Arc<ItemCache>,
    pipeline: Arc<UploadPipeline>,
    capture: Arc<CaptureClipboard>,
    retry: RetryPolicy,
    max_items: usize,
    init_session_timeout: std::time::Duration,
    wake_interval: std::time::Duration,
    state: Mutex<SupervisorState>,
    init: Mutex<Option<SharedInit>>,
    auth_listener: Mutex<Option<JoinHandle<()>>>,
    login_worker: Mutex<Option<JoinHandle<()>>>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl LifecycleSupervisor {
    pub fn new(deps: SyncDeps, config: SyncConfig) -> Arc<Self> {
        let context = Arc::new(SyncContext::new(&config, Arc::clone(&deps.clock)));
        let settings = Arc::new(SettingsService::new(Arc::clone(&deps.storage)));
        let device = Arc::new(LocalDevice::new(
            Arc::clone(&deps.storage),
            config.device_name.clone(),
        ));
        let cache = Arc::new(ItemCache::new(Arc::clone(&deps.storage), config.max_items));
        let pipeline = Arc::new(UploadPipeline::new(
            Arc::clone(&context),
            Arc::clone(&deps.identity),
            Arc::clone(&deps.remote),
            Arc::clone(&deps.clock),
            Arc::clone(&device),
            &config,
        ));
        let capture = Arc::new(CaptureClipboard::new(
            Arc::clone(&context),
            Arc::clone(&pipeline),
            Arc::clone(&cache),
            Arc::clone(&settings),
            Arc::clone(&device),
            Arc::clone(&deps.notifier),
        ));

        Arc::new(Self {
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay()),
            max_items: config.max_items,
            init_session_timeout: config.init_session_timeout(),
            wake_interval: config.wake_interval(),
            deps,
            context,
            settings,
            device,
            cache,
            pipeline,
            capture,
            state: Mutex::new(SupervisorState::default()),
            init: Mutex::new(None),
            auth_listener: Mutex::new(None),
            login_worker: Mutex::new(None),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    // === Accessors ===

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    pub fn cache(&self) -> &Arc<ItemCache> {
        &self.cache
    }

    pub fn capture(&self) -> &Arc<CaptureClipboard> {
        &self.capture
    }

    pub fn settings(&self) -> &Arc<SettingsService> {
        &self.settings
    }

    pub fn device(&self) -> &Arc<LocalDevice> {
        &self.device
    }

    pub fn pipeline(&self) -> &Arc<UploadPipeline> {
        &self.pipeline
    }

    pub fn now(&self) -> chrono::DateTime<Utc> {
        self.deps.clock.now()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        lock(&self.state).lifecycle
    }

    pub fn login_state(&self) -> LoginState {
        lock(&self.state).login
    }

    // === Initialization ===

    /// Idempotent, re-entrant initialization.
    pub async fn initialize(self: &Arc<Self>) -> InitResult {
        let shared = {
            let mut slot = lock(&self.init);
            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let this = Arc::clone(self);
                    let fut: SharedInit = async move {
                        this.run_initialization().await.map_err(Arc::new)
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let result = shared.clone().await;
        if result.is_err() {
            let mut slot = lock(&self.init);
            if slot
                .as_ref()
                .is_some_and(|current| Shared::ptr_eq(current, &shared))
            {
                *slot = None;
            }
        }
        result
    }

    async fn run_initialization(self: Arc<Self>) -> Result<InitOutcome> {
        let span = info_span!("usecase.lifecycle.initialize");

        async move {
            {
                let mut state = lock(&self.state);
                state.lifecycle = state
                    .lifecycle
                    .start()
                    .unwrap_or(LifecycleState::Initializing);
            }

            let result = self.initialization_steps().await;

            let mut state = lock(&self.state);
            state.lifecycle = state.lifecycle.on_initialized(result.is_ok());
            match &result {
                Ok(outcome) => info!(
                    authenticated = outcome.authenticated_user.is_some(),
                    session_timed_out = outcome.session_timed_out,
                    "initialization complete"
                ),
                Err(err) => error!(error = %err, "initialization failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn initialization_steps(self: &Arc<Self>) -> Result<InitOutcome> {
        self.settings
            .ensure_defaults()
            .await
            .context("ensure default settings failed")?;
        self.device
            .get()
            .await
            .context("load device identity failed")?;

        self.register_auth_listener();

        let (session, session_timed_out) = self.resolve_session().await;
        let authenticated_user = session.as_ref().map(|s| s.user_id.clone());

        if let Some(session) = session {
            if let Err(err) = self.handle_signed_in(session).await {
                warn!(error = %err, "login after initialization failed");
            }
        }

        Ok(InitOutcome {
            authenticated_user,
            session_timed_out,
        })
    }

    /// Read the stored session, refreshing once if absent or expired,
    /// bounded by the init timeout. Errors and timeouts read as "no session".
    async fn resolve_session(&self) -> (Option<Session>, bool) {
        let identity = Arc::clone(&self.deps.identity);
        let clock = Arc::clone(&self.deps.clock);

        let lookup = async move {
            match identity.get_session().await {
                Ok(Some(session)) if !session.is_expired_at(clock.now()) => Ok(Some(session)),
                Ok(_) => identity.refresh_session().await,
                Err(err) => {
                    warn!(error = %err, "session lookup failed, trying refresh");
                    identity.refresh_session().await
                }
            }
        };

        match timeout(self.init_session_timeout, lookup).await {
            Ok(Ok(session)) => (session, false),
            Ok(Err(err)) => {
                warn!(error = %err, "session refresh failed");
                (None, false)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.init_session_timeout.as_millis() as u64,
                    "session check timed out, continuing unauthenticated"
                );
                (None, true)
            }
        }
    }

    /// Sign-outs are handled on the listener itself. Logins are queued to a
    /// separate worker, one at a time, so a sign-out never waits behind a
    /// login's network calls.
    fn register_auth_listener(self: &Arc<Self>) {
        let mut slot = lock(&self.auth_listener);
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let (logins_tx, mut logins_rx) = mpsc::unbounded_channel::<QueuedLogin>();
        let weak: Weak<Self> = Arc::downgrade(self);
        let worker = tokio::spawn(async move {
            while let Some(queued) = logins_rx.recv().await {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                let kind = queued.kind.clone();
                if let Err(err) = this.login(queued.session, Some(queued.sign_outs)).await {
                    warn!(error = %err, ?kind, "login flow failed");
                }
            }
            debug!("login worker stopped");
        });
        if let Some(previous) = lock(&self.login_worker).replace(worker) {
            previous.abort();
        }

        let mut events = self.deps.identity.on_auth_state_change();
        let weak: Weak<Self> = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.handle_auth_event(event, &logins_tx).await;
            }
            debug!("auth listener stopped");
        }));
        debug!("auth listener registered");
    }

    async fn handle_auth_event(
        &self,
        event: AuthEvent,
        logins: &mpsc::UnboundedSender<QueuedLogin>,
    ) {
        debug!(kind = ?event.kind, "auth state changed");
        if event.kind == AuthEventKind::SignedOut {
            self.handle_signed_out().await;
            return;
        }
        let Some(session) = event.established_session().cloned() else {
            return;
        };

        let queued = QueuedLogin {
            session,
            kind: event.kind,
            sign_outs: lock(&self.state).sign_outs,
        };
        if logins.send(queued).is_err() {
            warn!("login worker gone, auth event dropped");
        }
    }

    // === Login / logout ===

    /// Run the login subflow for `session` unless it is already active or
    /// another login is in flight.
    pub async fn handle_signed_in(self: &Arc<Self>, session: Session) -> Result<()> {
        self.login(session, None).await
    }

    /// `queued_at` is the sign-out count when the login was queued; a
    /// sign-out since then cancels the login before it starts.
    async fn login(self: &Arc<Self>, session: Session, queued_at: Option<u64>) -> Result<()> {
        let (epoch, previous_user) = {
            let mut state = lock(&self.state);
            if queued_at.is_some_and(|count| count != state.sign_outs) {
                debug!(user_id = %session.user_id, "signed out before login started");
                return Ok(());
            }
            let same_user = state.user.as_ref() == Some(&session.user_id);

            if same_user && state.login.is_logged_in() && self.context.is_subscription_active() {
                debug!(user_id = %session.user_id, "already logged in with live subscription");
                return Ok(());
            }
            let Some(next) = state.login.begin_login() else {
                debug!(user_id = %session.user_id, "login already in flight");
                return Ok(());
            };
            state.login = next;
            if same_user {
                (self.context.epoch(), None)
            } else {
                let previous = state.user.replace(session.user_id.clone());
                (self.context.advance_epoch(), previous)
            }
        };

        if let Some(previous) = previous_user {
            info!(%previous, user_id = %session.user_id, "user changed, dropping previous session state");
            self.context.reset_session_state().await;
        }

        let span = info_span!("usecase.lifecycle.login", user_id = %session.user_id);
        let result = self.login_steps(&session, epoch).instrument(span).await;

        {
            let mut state = lock(&self.state);
            if !self.context.is_epoch_current(epoch) {
                info!(user_id = %session.user_id, "session changed during login, result dropped");
                return Ok(());
            }
            state.login = state.login.on_login_finished(result.is_ok());
        }

        match result {
            Ok(()) => {
                notify_quietly(
                    self.deps.notifier.as_ref(),
                    Notification::AuthChanged {
                        authenticated: true,
                    },
                )
                .await;
                info!(user_id = %session.user_id, "logged in");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn login_steps(self: &Arc<Self>, session: &Session, epoch: u64) -> Result<()> {
        if let Err(err) = self.register_device(session).await {
            warn!(error = %err, "device registration failed");
        }

        self.ensure_subscription(session, epoch).await?;

        if let Err(err) = self.reconcile_with_remote(session, epoch).await {
            warn!(error = %err, "initial reconciliation failed");
        }
        if let Err(err) = self.flush_pending().await {
            warn!(error = %err, "pending flush failed");
        }
        Ok(())
    }

    async fn register_device(&self, session: &Session) -> Result<()> {
        let device = self.device.get().await?;
        let record = DeviceRecord {
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            user_id: session.user_id.clone(),
            last_seen_at: self.deps.clock.now(),
        };

        let remote = Arc::clone(&self.deps.remote);
        let record_ref = &record;
        retry_with_backoff(&self.retry, "upsert_device", |_| {
            let remote = Arc::clone(&remote);
            async move { remote.upsert_device(session, record_ref).await }
        })
        .await
        .context("upsert device failed")?;
        debug!(device_id = %record.device_id, "device registered");
        Ok(())
    }

    /// Open the push subscription unless a live one exists.
    async fn ensure_subscription(&self, session: &Session, epoch: u64) -> Result<()> {
        let mut slot = self.context.subscription_slot().lock().await;

        if slot.is_some() && self.context.is_subscription_active() {
            debug!("push subscription already active");
            return Ok(());
        }
        if let Some(stale) = slot.take() {
            self.context.set_subscription_active(false);
            stale.close().await;
            debug!("stale push subscription closed");
        }

        let subscription = self
            .deps
            .push
            .subscribe(session)
            .await
            .context("push subscribe failed")?;

        if !self.context.is_epoch_current(epoch) {
            subscription.handle.unsubscribe().await;
            bail!("session changed while subscribing");
        }

        let local_device = self.device.get().await?.device_id.clone();
        let consumer = PushConsumer {
            context: Arc::clone(&self.context),
            cache: Arc::clone(&self.cache),
            notifier: Arc::clone(&self.deps.notifier),
            local_device,
            epoch,
        }
        .spawn(subscription.events);

        self.context.set_subscription_active(true);
        *slot = Some(ActiveSubscription {
            handle: subscription.handle,
            consumer,
        });
        info!("push subscription established");
        Ok(())
    }

    async fn reconcile_with_remote(
        &self,
        session: &Session,
        epoch: u64,
    ) -> Result<Vec<ClipboardItem>> {
        let remote = Arc::clone(&self.deps.remote);
        let limit = self.max_items;
        let server = retry_with_backoff(&self.retry, "list_active", |_| {
            let remote = Arc::clone(&remote);
            async move { remote.list_active(session, limit, 0).await }
        })
        .await
        .context("fetch remote items failed")?;

        if !self.context.is_epoch_current(epoch) {
            bail!("session changed during reconciliation");
        }

        let items = self.cache.reconcile(server).await?;
        debug!(count = items.len(), "cache reconciled");
        notify_quietly(
            self.deps.notifier.as_ref(),
            Notification::ItemsUpdated {
                items: items.clone(),
            },
        )
        .await;
        Ok(items)
    }

    /// Session loss: drop the subscription and per-session bookkeeping.
    pub async fn handle_signed_out(&self) {
        {
            let mut state = lock(&self.state);
            self.context.advance_epoch();
            state.sign_outs += 1;
            state.login = state.login.sign_out();
            state.user = None;
        }
        self.context.reset_session_state().await;
        notify_quietly(
            self.deps.notifier.as_ref(),
            Notification::AuthChanged {
                authenticated: false,
            },
        )
        .await;
        info!("signed out");
    }

    // === Pending flush ===

    /// Push every pending record, oldest first.
    ///
    /// The session is re-checked before each item; a revoked session or a
    /// session change aborts the rest of the pass. Overlapping calls return
    /// an empty report.
    pub async fn flush_pending(&self) -> Result<FlushReport> {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            debug!("flush already running");
            return Ok(FlushReport::default());
        };

        let pending = self.cache.pending_items().await?;
        let mut report = FlushReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let span = info_span!("usecase.lifecycle.flush_pending", count = pending.len());
        async {
            let epoch = self.context.epoch();
            let mut last_session = None;
            let mut needs_reconcile = false;

            for item in pending {
                let Some(session) = self.pipeline.current_session().await else {
                    info!("session no longer valid, aborting flush");
                    report.aborted = true;
                    break;
                };
                if !self.context.is_epoch_current(epoch) {
                    report.aborted = true;
                    break;
                }
                if !self.context.mark_in_flight(&item.id) {
                    report.skipped += 1;
                    continue;
                }

                let result = self.pipeline.upload_pending(&item, &session).await;
                self.context.clear_in_flight(&item.id);

                if !self.context.is_epoch_current(epoch) {
                    debug!(item_id = %item.id, "session changed, dropping flush result");
                    report.aborted = true;
                    break;
                }

                match result {
                    Ok(confirmed) => {
                        debug!(pending_id = %item.id, item_id = %confirmed.id, "pending item confirmed");
                        self.cache.replace(&item.id, confirmed).await?;
                        report.confirmed += 1;
                    }
                    Err(UploadError::DuplicateContent) => {
                        self.cache.remove(&item.id).await?;
                        report.deduplicated += 1;
                        needs_reconcile = true;
                    }
                    Err(UploadError::AuthRejected(message)) => {
                        warn!(%message, "credentials rejected, aborting flush");
                        report.aborted = true;
                        break;
                    }
                    Err(err) => {
                        warn!(item_id = %item.id, error = %err, "pending item kept for next flush");
                        report.failed += 1;
                    }
                }
                last_session = Some(session);
            }

            if needs_reconcile {
                if let Some(session) = &last_session {
                    if let Err(err) = self.reconcile_with_remote(session, epoch).await {
                        warn!(error = %err, "post-flush reconciliation failed");
                    }
                }
            }

            if report.changed_cache() {
                notify_quietly(
                    self.deps.notifier.as_ref(),
                    Notification::ItemsUpdated {
                        items: self.cache.items().await?,
                    },
                )
                .await;
            }
            info!(
                confirmed = report.confirmed,
                deduplicated = report.deduplicated,
                failed = report.failed,
                aborted = report.aborted,
                "flush finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    // === Wake and explicit requests ===

    /// Register the periodic wake. Call before starting initialization so the
    /// recovery path exists regardless of how initialization goes.
    pub fn arm_wake(self: &Arc<Self>, trigger: &dyn WakeTriggerPort) -> JoinHandle<()> {
        let mut ticks = trigger.arm(self.wake_interval);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while ticks.recv().await.is_some() {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.on_wake().await;
            }
        })
    }

    /// Re-check authentication; resubscribe if the subscription was lost and
    /// flush anything still pending.
    pub async fn on_wake(self: &Arc<Self>) {
        let span = info_span!("usecase.lifecycle.wake");
        async {
            if let Err(err) = self.initialize().await {
                warn!(error = %err, "initialization on wake failed");
                return;
            }

            let (session, _) = self.resolve_session().await;
            let Some(session) = session else {
                debug!("wake: not authenticated");
                return;
            };

            let logged_in_as_session_user = {
                let state = lock(&self.state);
                state.login.is_logged_in() && state.user.as_ref() == Some(&session.user_id)
            };

            if !logged_in_as_session_user {
                if let Err(err) = self.handle_signed_in(session).await {
                    warn!(error = %err, "login on wake failed");
                }
                return;
            }

            if !self.context.is_subscription_active() {
                info!("push subscription lost, re-establishing");
                if let Err(err) = self.ensure_subscription(&session, self.context.epoch()).await {
                    warn!(error = %err, "resubscribe on wake failed");
                }
            }
            if let Err(err) = self.flush_pending().await {
                warn!(error = %err, "flush on wake failed");
            }
        }
        .instrument(span)
        .await
    }

    /// Full reconciliation requested by the presentation layer.
    pub async fn sync_now(&self) -> Result<Vec<ClipboardItem>> {
        let session = self
            .pipeline
            .current_session()
            .await
            .ok_or(UploadError::NotAuthenticated)?;

        self.reconcile_with_remote(&session, self.context.epoch())
            .await?;
        if let Err(err) = self.flush_pending().await {
            warn!(error = %err, "flush after sync failed");
        }
        self.cache.items().await
    }

    /// Delete an item everywhere. Pending records never reached the remote
    /// store and are only dropped locally.
    pub async fn delete_item(&self, id: &ItemId) -> Result<()> {
        if !id.is_provisional() {
            let session = self
                .pipeline
                .current_session()
                .await
                .ok_or(UploadError::NotAuthenticated)?;

            let remote = Arc::clone(&self.deps.remote);
            let session = &session;
            retry_with_backoff(&self.retry, "soft_delete", |_| {
                let remote = Arc::clone(&remote);
                async move { remote.soft_delete(session, id).await }
            })
            .await
            .with_context(|| format!("soft delete failed: {id}"))?;
        }

        self.cache.apply_remote_soft_delete(id).await?;
        notify_quietly(
            self.deps.notifier.as_ref(),
            Notification::ItemDeleted { id: id.clone() },
        )
        .await;
        info!(item_id = %id, "item deleted");
        Ok(())
    }

    /// Stop background work and drop every live resource.
    pub async fn shutdown(&self) {
        if let Some(listener) = lock(&self.auth_listener).take() {
            listener.abort();
        }
        if let Some(worker) = lock(&self.login_worker).take() {
            worker.abort();
        }
        self.context.teardown().await;
        {
            let mut state = lock(&self.state);
            *state = SupervisorState::default();
        }
        lock(&self.init).take();
        info!("sync engine shut down");
    }
}

impl std::fmt::Debug for LifecycleSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("LifecycleSupervisor")
            .field("lifecycle", &state.lifecycle)
            .field("login", &state.login)
            .field("user", &state.user)
            .finish_non_exhaustive()
    }
}
