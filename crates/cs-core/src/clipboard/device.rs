use serde::{Deserialize, Serialize};

use crate::ids::DeviceId;

/// Identity of this installation as shown to other devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub device_name: String,
}

impl DeviceIdentity {
    pub fn new(device_id: DeviceId, device_name: impl Into<String>) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
        }
    }
}
