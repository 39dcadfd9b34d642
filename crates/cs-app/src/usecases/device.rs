use std::sync::Arc;

use anyhow::{Context, Result};
use cs_core::clipboard::DeviceIdentity;
use cs_core::ids::DeviceId;
use cs_core::ports::{load_json, save_json, KeyValueStorePort};
use tokio::sync::OnceCell;
use tracing::info;

/// Storage key for [`DeviceIdentity`].
pub const DEVICE_IDENTITY_KEY: &str = "deviceIdentity";

const FALLBACK_DEVICE_NAME: &str = "Unknown Device";

/// This installation's identity: generated once, persisted, then cached.
pub struct LocalDevice {
    store: Arc<dyn KeyValueStorePort>,
    configured_name: Option<String>,
    identity: OnceCell<DeviceIdentity>,
}

impl LocalDevice {
    pub fn new(store: Arc<dyn KeyValueStorePort>, configured_name: Option<String>) -> Self {
        Self {
            store,
            configured_name: configured_name.filter(|name| !name.trim().is_empty()),
            identity: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<&DeviceIdentity> {
        self.identity
            .get_or_try_init(|| self.load_or_create())
            .await
    }

    /// Cached identity, if [`LocalDevice::get`] has succeeded before.
    pub fn cached(&self) -> Option<&DeviceIdentity> {
        self.identity.get()
    }

    async fn load_or_create(&self) -> Result<DeviceIdentity> {
        let stored =
            load_json::<DeviceIdentity>(self.store.as_ref(), DEVICE_IDENTITY_KEY).await?;

        let identity = match stored {
            Some(mut identity) => {
                match &self.configured_name {
                    Some(name) if *name != identity.device_name => {
                        identity.device_name = name.clone();
                    }
                    _ => return Ok(identity),
                }
                identity
            }
            None => {
                let identity = DeviceIdentity::new(DeviceId::new(), self.default_name());
                info!(device_id = %identity.device_id, device_name = %identity.device_name, "generated device identity");
                identity
            }
        };

        save_json(self.store.as_ref(), DEVICE_IDENTITY_KEY, &identity)
            .await
            .context("persist device identity failed")?;
        Ok(identity)
    }

    fn default_name(&self) -> String {
        if let Some(name) = &self.configured_name {
            return name.clone();
        }
        gethostname::gethostname()
            .to_str()
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_DEVICE_NAME)
            .to_string()
    }
}
