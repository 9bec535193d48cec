use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceEndpoint {
    pub uid: String,
    pub token: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

fn default_provider() -> String {
    "fcm".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
    #[serde(default)]
    pub provider: Option<String>,
}
