use std::sync::Arc;

use cs_core::auth::Session;
use cs_core::clipboard::{fingerprint, ClipboardItem, NewClipboardItem};
use cs_core::ports::{ClockPort, IdentityProviderPort, RemoteStorePort};
use cs_core::redaction::{redact, RedactionCategory};
use cs_core::{SyncConfig, UploadError};
use tokio::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};

use super::device::LocalDevice;
use crate::context::SyncContext;
use crate::sync::{retry_with_backoff, RetryPolicy};

/// Appended to content cut at `max_content_length`.
pub const TRUNCATION_MARKER: &str = "\n...[truncated]";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Bypass the debounce coalescer (manual uploads).
    pub skip_debounce: bool,
    pub origin: Option<String>,
}

/// Content after truncation and redaction, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedContent {
    pub content: String,
    /// Fingerprint of the raw, pre-redaction text.
    pub content_hash: String,
    pub categories: Vec<RedactionCategory>,
    pub truncated: bool,
}

const DEFAULT_ORIGIN: &str = "unknown";

/// Gatekeeper between a captured text and the remote store.
///
/// Local gates run first and never touch the network:
/// empty check → recent-upload guard → rate limit → debounce.
/// Then: session → truncate → redact → rate-limit slot → remote dedup →
/// insert with retry.
pub struct UploadPipeline {
    context: Arc<SyncContext>,
    identity: Arc<dyn IdentityProviderPort>,
    remote: Arc<dyn RemoteStorePort>,
    clock: Arc<dyn ClockPort>,
    device: Arc<LocalDevice>,
    max_content_length: usize,
    debounce_delay: Duration,
    retry: RetryPolicy,
}

impl UploadPipeline {
    pub fn new(
        context: Arc<SyncContext>,
        identity: Arc<dyn IdentityProviderPort>,
        remote: Arc<dyn RemoteStorePort>,
        clock: Arc<dyn ClockPort>,
        device: Arc<LocalDevice>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            context,
            identity,
            remote,
            clock,
            device,
            max_content_length: config.max_content_length,
            debounce_delay: config.debounce_delay(),
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay()),
        }
    }

    pub async fn upload(
        self: &Arc<Self>,
        content: &str,
        options: UploadOptions,
    ) -> Result<ClipboardItem, UploadError> {
        let span = info_span!(
            "usecase.upload.execute",
            skip_debounce = options.skip_debounce,
            len = content.len()
        );

        async move {
            if content.trim().is_empty() {
                return Err(UploadError::EmptyContent);
            }

            let content_hash = fingerprint(content);
            if self.context.recent_uploads.contains(&content_hash) {
                debug!(content_hash = %content_hash, "recently uploaded, suppressing echo");
                return Err(UploadError::DuplicateLoopPrevention);
            }

            if !self.context.rate_limiter.admit() {
                warn!("upload rate limit reached");
                return Err(UploadError::RateLimited);
            }

            let origin = options
                .origin
                .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());

            if options.skip_debounce {
                return self.upload_now(content.to_string(), origin).await;
            }

            let this = Arc::clone(self);
            let owned = content.to_string();
            self.context
                .debouncer
                .schedule(&content_hash, self.debounce_delay, async move {
                    this.upload_now(owned, origin).await
                })
                .await
                .outcome()
                .await
                .map_err(|_| UploadError::Superseded)?
        }
        .instrument(span)
        .await
    }

    /// Truncate and redact raw captured text.
    pub fn prepare(&self, raw: &str) -> PreparedContent {
        let content_hash = fingerprint(raw);

        let (bounded, truncated) = if raw.chars().count() > self.max_content_length {
            let mut cut: String = raw.chars().take(self.max_content_length).collect();
            cut.push_str(TRUNCATION_MARKER);
            (cut, true)
        } else {
            (raw.to_string(), false)
        };

        let result = redact(bounded.as_str());
        if result.was_redacted {
            let categories: Vec<&str> = result.categories.iter().map(|c| c.as_str()).collect();
            info!(?categories, "sensitive content redacted");
        }

        PreparedContent {
            content: result.redacted,
            content_hash,
            categories: result.categories,
            truncated,
        }
    }

    /// Current non-expired session, if any. Provider errors read as "none".
    pub async fn current_session(&self) -> Option<Session> {
        match self.identity.get_session().await {
            Ok(Some(session)) if !session.is_expired_at(self.clock.now()) => Some(session),
            Ok(Some(_)) => {
                debug!("stored session expired");
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "session lookup failed");
                None
            }
        }
    }

    /// Push a locally stored pending record. Local gates were already passed
    /// when the record was captured, so only dedup and insert run here.
    pub async fn upload_pending(
        &self,
        item: &ClipboardItem,
        session: &Session,
    ) -> Result<ClipboardItem, UploadError> {
        let new_item = item.to_new_item(session.user_id.clone());
        let confirmed = self.insert_deduplicated(session, &new_item).await?;
        self.context.recent_uploads.insert(&item.content_hash);
        Ok(confirmed)
    }

    async fn upload_now(&self, raw: String, origin: String) -> Result<ClipboardItem, UploadError> {
        let session = self
            .current_session()
            .await
            .ok_or(UploadError::NotAuthenticated)?;

        let prepared = self.prepare(&raw);
        let device = self.device.get().await.map_err(|err| {
            UploadError::NetworkOrServer(format!("device identity unavailable: {err:#}"))
        })?;

        let new_item = NewClipboardItem {
            content: prepared.content,
            content_hash: prepared.content_hash.clone(),
            user_id: Some(session.user_id.clone()),
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            origin,
            created_at: self.clock.now(),
            categories: prepared.categories,
        };

        // Debounced uploads passed `admit` before waiting; the slot is only
        // taken here, right before the network.
        let Some(slot) = self.context.rate_limiter.try_reserve() else {
            warn!("upload rate limit reached after debounce");
            return Err(UploadError::RateLimited);
        };

        let confirmed = match self.insert_deduplicated(&session, &new_item).await {
            Ok(confirmed) => confirmed,
            Err(err) => {
                self.context.rate_limiter.release(slot);
                return Err(err);
            }
        };

        self.context.recent_uploads.insert(&prepared.content_hash);
        info!(item_id = %confirmed.id, "upload confirmed");
        Ok(confirmed)
    }

    async fn insert_deduplicated(
        &self,
        session: &Session,
        new_item: &NewClipboardItem,
    ) -> Result<ClipboardItem, UploadError> {
        if let Some(existing) = self
            .remote
            .find_active_by_hash(session, &new_item.content_hash)
            .await?
        {
            debug!(item_id = %existing.id, "content already stored remotely");
            return Err(UploadError::DuplicateContent);
        }

        let remote = Arc::clone(&self.remote);
        retry_with_backoff(&self.retry, "insert_item", |_| {
            let remote = Arc::clone(&remote);
            async move { remote.insert_item(session, new_item).await }
        })
        .await
        .map_err(UploadError::from)
    }
}
