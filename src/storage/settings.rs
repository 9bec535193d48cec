use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;

use crate::models::user_settings::validate_timezone;
use crate::models::UserSettings;
use crate::storage::SettingsStore;

pub struct JsonSettingsStore {
    file_path: PathBuf,
    cache: RwLock<Vec<UserSettings>>,
}

impl JsonSettingsStore {
    /// Create a new JsonSettingsStore, loading existing data from disk if present.
    ///
    /// If `settings.json` is corrupted, a backup is made at `settings.json.bak`,
    /// a warning is logged, and the store starts empty.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("settings.json");

        let settings = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read settings.json")?;
            match serde_json::from_str::<Vec<UserSettings>>(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "settings.json is corrupted ({}), creating backup and starting empty",
                        e
                    );
                    let backup_path = data_dir.join("settings.json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to create backup of corrupted settings.json: {}",
                            backup_err
                        );
                    }
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            file_path,
            cache: RwLock::new(settings),
        })
    }

    async fn persist(&self, settings: &[UserSettings]) -> Result<()> {
        let tmp_path = self.file_path.with_extension("json.tmp");
        let json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary settings file")?;
        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary settings file")?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn get_or_create(&self, uid: &str) -> Result<UserSettings> {
        {
            let cache = self.cache.read().await;
            if let Some(existing) = cache.iter().find(|s| s.uid == uid) {
                return Ok(existing.clone());
            }
        }
        let mut cache = self.cache.write().await;
        if let Some(existing) = cache.iter().find(|s| s.uid == uid) {
            return Ok(existing.clone());
        }
        let created = UserSettings::new(uid, Utc::now());
        cache.push(created.clone());
        self.persist(&cache).await?;
        Ok(created)
    }

    async fn set_timezone(&self, uid: &str, zone: &str, persist: bool, ttl_hours: i64) -> Result<()> {
        validate_timezone(zone)?;

        let mut cache = self.cache.write().await;
        let idx = match cache.iter().position(|s| s.uid == uid) {
            Some(i) => i,
            None => {
                cache.push(UserSettings::new(uid, Utc::now()));
                cache.len() - 1
            }
        };

        let now = Utc::now();
        let settings = &mut cache[idx];
        if persist {
            settings.timezone = zone.to_string();
        } else {
            settings.session_timezone = Some(zone.to_string());
            settings.session_tz_expires_at = Some(now + Duration::hours(ttl_hours));
        }
        settings.updated_at = now;

        self.persist(&cache).await?;
        Ok(())
    }

    async fn set_notifications_enabled(&self, uid: &str, enabled: bool) -> Result<()> {
        let mut cache = self.cache.write().await;
        let idx = match cache.iter().position(|s| s.uid == uid) {
            Some(i) => i,
            None => {
                cache.push(UserSettings::new(uid, Utc::now()));
                cache.len() - 1
            }
        };
        cache[idx].notifications_enabled = enabled;
        cache[idx].updated_at = Utc::now();
        self.persist(&cache).await?;
        Ok(())
    }
}
