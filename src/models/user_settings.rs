use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PlannerError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionLevel {
    Free,
    Pro,
    Ultra,
}

impl SubscriptionLevel {
    pub fn tier_limit_days(&self, config: &crate::models::AppConfig) -> i64 {
        match self {
            SubscriptionLevel::Free => config.free_tier_days,
            SubscriptionLevel::Pro => config.pro_tier_days,
            SubscriptionLevel::Ultra => config.ultra_tier_days,
        }
    }
}

impl Default for SubscriptionLevel {
    fn default() -> Self {
        SubscriptionLevel::Free
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub uid: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub session_timezone: Option<String>,
    pub session_tz_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub subscription_level: SubscriptionLevel,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_timezone() -> String {
    "Europe/Istanbul".to_string()
}

fn default_true() -> bool {
    true
}

impl UserSettings {
    pub fn new(uid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uid: uid.into(),
            timezone: default_timezone(),
            session_timezone: None,
            session_tz_expires_at: None,
            language: String::new(),
            theme: String::new(),
            notifications_enabled: true,
            subscription_level: SubscriptionLevel::Free,
            subscription_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolve the effective IANA zone for this user at `now`, per the
    /// session-override -> persistent -> fallback precedence chain.
    /// Falls back silently (never errors) on an unparseable stored zone.
    pub fn effective_zone(&self, now: DateTime<Utc>, fallback: &str) -> chrono_tz::Tz {
        if let (Some(session), Some(expires)) =
            (self.session_timezone.as_deref(), self.session_tz_expires_at)
        {
            if now <= expires {
                if let Ok(tz) = session.parse::<chrono_tz::Tz>() {
                    return tz;
                }
            }
        }
        if let Ok(tz) = self.timezone.parse::<chrono_tz::Tz>() {
            return tz;
        }
        fallback
            .parse::<chrono_tz::Tz>()
            .unwrap_or(chrono_tz::Tz::UTC)
    }
}

pub fn validate_timezone(tz: &str) -> Result<(), PlannerError> {
    tz.parse::<chrono_tz::Tz>()
        .map_err(|_| PlannerError::InvalidTimezone(tz.to_string()))?;
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetTimezoneRequest {
    pub zone: String,
    #[serde(default)]
    pub persist: bool,
    pub ttl_hours: Option<i64>,
}
