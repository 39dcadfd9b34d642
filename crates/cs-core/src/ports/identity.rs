use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::auth::{AuthEvent, Session};
use crate::sync::RemoteError;

/// Identity / session provider.
#[async_trait]
pub trait IdentityProviderPort: Send + Sync {
    /// Current session, if one is stored.
    async fn get_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Attempt a single refresh of an expired or missing session.
    async fn refresh_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Register an auth state listener.
    ///
    /// Registration is synchronous so the caller can guarantee it happens
    /// before any session check; events are delivered in order on the channel.
    fn on_auth_state_change(&self) -> mpsc::UnboundedReceiver<AuthEvent>;
}
