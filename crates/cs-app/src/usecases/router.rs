use std::sync::Arc;

use cs_core::messages::{Request, Response};
use cs_core::UploadError;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::capture::{CaptureEvent, CaptureOutcome, CaptureSource};
use crate::lifecycle::LifecycleSupervisor;

const MANUAL_ORIGIN: &str = "manual";

/// Entry point for the presentation layer and the capture source.
///
/// Every request first awaits initialization; a failed initialization is
/// logged and the request is still served from local state.
#[derive(Clone)]
pub struct MessageRouter {
    supervisor: Arc<LifecycleSupervisor>,
}

impl MessageRouter {
    pub fn new(supervisor: Arc<LifecycleSupervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Arc<LifecycleSupervisor> {
        &self.supervisor
    }

    pub async fn handle(&self, request: Request) -> Response {
        if let Err(err) = self.supervisor.initialize().await {
            warn!(error = %err, "handling request without completed initialization");
        }

        match request {
            Request::Upload { content, origin } => self.upload(content, origin).await,
            Request::Sync => match self.supervisor.sync_now().await {
                Ok(items) => Response::with_items(items),
                Err(err) => failure_from(err, "SYNC_FAILED"),
            },
            Request::GetItems => match self.supervisor.cache().items().await {
                Ok(items) => Response::with_items(items),
                Err(err) => Response::failure("STORAGE_ERROR", format!("{err:#}")),
            },
            Request::EnableCapture => self.set_capture(true).await,
            Request::DisableCapture => self.set_capture(false).await,
            Request::DeleteItem { id } => match self.supervisor.delete_item(&id).await {
                Ok(()) => Response::ok(),
                Err(err) => failure_from(err, "DELETE_FAILED"),
            },
        }
    }

    /// Hand a copy event to a detached task and return immediately.
    pub fn dispatch_capture(&self, event: CaptureEvent) -> JoinHandle<()> {
        let supervisor = Arc::clone(&self.supervisor);
        tokio::spawn(async move {
            if let Err(err) = supervisor.initialize().await {
                warn!(error = %err, "capturing without completed initialization");
            }
            match supervisor
                .capture()
                .execute(event, CaptureSource::CopyEvent)
                .await
            {
                Ok(outcome) => debug!(?outcome, "capture settled"),
                Err(err) => error!(error = %err, "capture task failed"),
            }
        })
    }

    async fn upload(&self, content: String, origin: Option<String>) -> Response {
        let event = CaptureEvent::new(
            content,
            origin.unwrap_or_else(|| MANUAL_ORIGIN.to_string()),
            self.supervisor.now(),
        );

        match self
            .supervisor
            .capture()
            .execute(event, CaptureSource::Manual)
            .await
        {
            Ok(CaptureOutcome::Uploaded(item)) => Response::with_item(item),
            Ok(CaptureOutcome::StoredPending { item, reason }) => Response {
                item: Some(item),
                ..upload_failure(&reason)
            },
            Ok(CaptureOutcome::Rejected(reason)) => upload_failure(&reason),
            Ok(CaptureOutcome::CaptureDisabled) => {
                Response::failure("CAPTURE_DISABLED", "capture is disabled")
            }
            Ok(CaptureOutcome::Stale) => {
                Response::failure("STALE", "superseded by a newer request or session")
            }
            Err(err) => Response::failure("INTERNAL_ERROR", format!("{err:#}")),
        }
    }

    async fn set_capture(&self, enabled: bool) -> Response {
        match self.supervisor.settings().set_capture_enabled(enabled).await {
            Ok(_) => Response::ok(),
            Err(err) => Response::failure("STORAGE_ERROR", format!("{err:#}")),
        }
    }
}

fn upload_failure(reason: &UploadError) -> Response {
    Response::failure(reason.code(), reason.to_string())
}

fn failure_from(err: anyhow::Error, fallback_code: &str) -> Response {
    match err.downcast_ref::<UploadError>() {
        Some(reason) => upload_failure(reason),
        None => Response::failure(fallback_code, format!("{err:#}")),
    }
}
