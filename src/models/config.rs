use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default = "default_grace_window_hours")]
    pub grace_window_hours: i64,
    #[serde(default = "default_session_tz_ttl_hours")]
    pub session_tz_ttl_hours: i64,
    #[serde(default = "default_notify_retries")]
    pub notify_retries: u32,
    #[serde(default = "default_notify_backoff_secs")]
    pub notify_backoff_base_secs: f64,
    #[serde(default = "default_fallback_timezone")]
    pub fallback_timezone: String,
    #[serde(default = "default_free_tier_days")]
    pub free_tier_days: i64,
    #[serde(default = "default_pro_tier_days")]
    pub pro_tier_days: i64,
    #[serde(default = "default_ultra_tier_days")]
    pub ultra_tier_days: i64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8417
}

fn default_broadcast_capacity() -> usize {
    4096
}

fn default_grace_window_hours() -> i64 {
    24
}

fn default_session_tz_ttl_hours() -> i64 {
    168
}

fn default_notify_retries() -> u32 {
    3
}

fn default_notify_backoff_secs() -> f64 {
    0.5
}

fn default_fallback_timezone() -> String {
    "Europe/Istanbul".to_string()
}

fn default_free_tier_days() -> i64 {
    14
}

fn default_pro_tier_days() -> i64 {
    60
}

fn default_ultra_tier_days() -> i64 {
    365
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            broadcast_capacity: default_broadcast_capacity(),
            grace_window_hours: default_grace_window_hours(),
            session_tz_ttl_hours: default_session_tz_ttl_hours(),
            notify_retries: default_notify_retries(),
            notify_backoff_base_secs: default_notify_backoff_secs(),
            fallback_timezone: default_fallback_timezone(),
            free_tier_days: default_free_tier_days(),
            pro_tier_days: default_pro_tier_days(),
            ultra_tier_days: default_ultra_tier_days(),
        }
    }
}
