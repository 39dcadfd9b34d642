use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use cs_core::clipboard::{fingerprint, ClipboardItem, NewClipboardItem};
use cs_core::messages::Notification;
use cs_core::ports::NotificationPort;
use cs_core::UploadError;
use tracing::{debug, info, info_span, warn, Instrument};

use super::device::LocalDevice;
use super::reconcile::ItemCache;
use super::settings::SettingsService;
use super::notify_quietly;
use super::upload::{UploadOptions, UploadPipeline};
use crate::context::SyncContext;

/// Text delivered by the capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureEvent {
    pub content: String,
    pub origin: String,
    pub timestamp: DateTime<Utc>,
}

impl CaptureEvent {
    pub fn new(
        content: impl Into<String>,
        origin: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            origin: origin.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// Observed copy event; honours the capture toggle and debounce.
    CopyEvent,
    /// Explicit upload request; bypasses both.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Uploaded(ClipboardItem),
    /// Upload failed recoverably; the content is kept as a pending record.
    StoredPending {
        item: ClipboardItem,
        reason: UploadError,
    },
    Rejected(UploadError),
    CaptureDisabled,
    /// A newer capture or a session change made this result obsolete.
    Stale,
}

/// Runs one capture through the upload pipeline and applies the result to
/// the cache. A failed upload never discards content: recoverable errors
/// leave a pending record behind.
pub struct CaptureClipboard {
    context: Arc<SyncContext>,
    pipeline: Arc<UploadPipeline>,
    cache: Arc<ItemCache>,
    settings: Arc<SettingsService>,
    device: Arc<LocalDevice>,
    notifier: Arc<dyn NotificationPort>,
}

impl CaptureClipboard {
    pub fn new(
        context: Arc<SyncContext>,
        pipeline: Arc<UploadPipeline>,
        cache: Arc<ItemCache>,
        settings: Arc<SettingsService>,
        device: Arc<LocalDevice>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Self {
        Self {
            context,
            pipeline,
            cache,
            settings,
            device,
            notifier,
        }
    }

    pub async fn execute(&self, event: CaptureEvent, source: CaptureSource) -> Result<CaptureOutcome> {
        let span = info_span!("usecase.capture.execute", ?source, origin = %event.origin);

        async move {
            if source == CaptureSource::CopyEvent && !self.settings.load().await?.capture_enabled {
                debug!("capture disabled, dropping copy event");
                return Ok(CaptureOutcome::CaptureDisabled);
            }

            let content_hash = fingerprint(event.content.as_str());
            let sequence = self.context.sequences.begin(&content_hash);
            let epoch = self.context.epoch();

            let options = UploadOptions {
                skip_debounce: source == CaptureSource::Manual,
                origin: Some(event.origin.clone()),
            };
            let result = self.pipeline.upload(&event.content, options).await;
            let outcome = self.settle(&event, result, &content_hash, sequence, epoch).await;
            self.context.sequences.finish(&content_hash, sequence);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn settle(
        &self,
        event: &CaptureEvent,
        result: Result<ClipboardItem, UploadError>,
        content_hash: &str,
        sequence: u64,
        epoch: u64,
    ) -> Result<CaptureOutcome> {
        let outcome = match result {
            Ok(item) if self.context.is_epoch_current(epoch) => {
                self.cache.upsert_confirmed(item.clone()).await?;
                notify_quietly(
                    self.notifier.as_ref(),
                    Notification::NewItem { item: item.clone() },
                )
                .await;
                CaptureOutcome::Uploaded(item)
            }
            Ok(item) => {
                info!(item_id = %item.id, "session changed during upload, result ignored");
                CaptureOutcome::Stale
            }
            Err(reason) if reason.falls_back_to_pending() => {
                if self.context.sequences.is_current(content_hash, sequence) {
                    let item = self.store_pending(event).await?;
                    info!(item_id = %item.id, reason = reason.code(), "capture kept as pending");
                    CaptureOutcome::StoredPending { item, reason }
                } else {
                    debug!("newer capture of same content in progress, skipping fallback");
                    CaptureOutcome::Stale
                }
            }
            Err(reason) => {
                match &reason {
                    UploadError::DuplicateLoopPrevention | UploadError::Superseded => {
                        debug!(reason = reason.code(), "capture dropped")
                    }
                    _ => warn!(reason = reason.code(), error = %reason, "capture rejected"),
                }
                CaptureOutcome::Rejected(reason)
            }
        };
        Ok(outcome)
    }

    async fn store_pending(&self, event: &CaptureEvent) -> Result<ClipboardItem> {
        let prepared = self.pipeline.prepare(&event.content);
        let device = self.device.get().await?;

        let item = ClipboardItem::pending(NewClipboardItem {
            content: prepared.content,
            content_hash: prepared.content_hash,
            user_id: None,
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            origin: event.origin.clone(),
            created_at: event.timestamp,
            categories: prepared.categories,
        });

        let stored = self.cache.add_pending(item).await?;
        notify_quietly(
            self.notifier.as_ref(),
            Notification::NewItem {
                item: stored.clone(),
            },
        )
        .await;
        Ok(stored)
    }
}
