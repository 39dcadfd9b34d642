//! Port interfaces for the sync engine
//!
//! Ports define the contract between the engine (use cases in `cs-app`) and
//! the collaborators it does not own: the identity provider, the remote store,
//! the push channel, durable local storage, the presentation layer and the
//! host's wake scheduler. Infrastructure implements them; the engine only
//! ever sees these traits.

mod clock;
mod identity;
mod notifier;
mod push;
mod remote_store;
mod storage;
mod wake;

pub use clock::ClockPort;
pub use identity::IdentityProviderPort;
pub use notifier::NotificationPort;
pub use push::{PushChannelPort, PushEvent, PushSubscription, SubscriptionHandle};
pub use remote_store::{DeviceRecord, RemoteStorePort};
pub use storage::{load_json, save_json, KeyValueStorePort, StorageChange};
pub use wake::WakeTriggerPort;
