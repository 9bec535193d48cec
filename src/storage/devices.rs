use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::DeviceEndpoint;
use crate::storage::DeviceStore;

pub struct JsonDeviceStore {
    file_path: PathBuf,
    cache: RwLock<Vec<DeviceEndpoint>>,
}

impl JsonDeviceStore {
    /// Create a new JsonDeviceStore, loading existing data from disk if present.
    ///
    /// If `devices.json` is corrupted, a backup is made at `devices.json.bak`,
    /// a warning is logged, and the store starts empty.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("devices.json");

        let devices = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read devices.json")?;
            match serde_json::from_str::<Vec<DeviceEndpoint>>(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "devices.json is corrupted ({}), creating backup and starting empty",
                        e
                    );
                    let backup_path = data_dir.join("devices.json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to create backup of corrupted devices.json: {}",
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
            cache: RwLock::new(devices),
        })
    }

    async fn persist(&self, devices: &[DeviceEndpoint]) -> Result<()> {
        let tmp_path = self.file_path.with_extension("json.tmp");
        let json =
            serde_json::to_string_pretty(devices).context("Failed to serialize devices")?;
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary devices file")?;
        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary devices file")?;
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for JsonDeviceStore {
    async fn register(&self, uid: &str, token: &str, provider: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        // Tokens are globally unique: a token re-registered under a different
        // uid (reinstall, account switch on the same device) moves ownership
        // rather than creating a second row for the same physical token.
        cache.retain(|d| d.token != token || d.uid == uid);
        if let Some(existing) = cache
            .iter_mut()
            .find(|d| d.uid == uid && d.token == token)
        {
            existing.provider = provider.to_string();
        } else {
            cache.push(DeviceEndpoint {
                uid: uid.to_string(),
                token: token.to_string(),
                provider: provider.to_string(),
                created_at: Utc::now(),
            });
        }
        self.persist(&cache).await
    }

    async fn unregister(&self, uid: &str, token: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.retain(|d| !(d.uid == uid && d.token == token));
        self.persist(&cache).await
    }

    async fn list_for_user(&self, uid: &str) -> Result<Vec<DeviceEndpoint>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().filter(|d| d.uid == uid).cloned().collect())
    }
}
