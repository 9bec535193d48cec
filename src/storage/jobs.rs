use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::Job;
use crate::storage::JobStore;

pub struct JsonJobStore {
    file_path: PathBuf,
    cache: RwLock<Vec<Job>>,
}

impl JsonJobStore {
    /// Create a new JsonJobStore, loading existing data from disk if present.
    ///
    /// If `jobs.json` is corrupted, a backup is made at `jobs.json.bak`, a
    /// warning is logged, and the store starts empty.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("jobs.json");

        let jobs = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read jobs.json")?;
            match serde_json::from_str::<Vec<Job>>(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "jobs.json is corrupted ({}), creating backup and starting empty",
                        e
                    );
                    let backup_path = data_dir.join("jobs.json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to create backup of corrupted jobs.json: {}",
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
            cache: RwLock::new(jobs),
        })
    }

    async fn persist(&self, jobs: &[Job]) -> Result<()> {
        let tmp_path = self.file_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(jobs).context("Failed to serialize jobs")?;
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary jobs file")?;
        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary jobs file")?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn upsert_job(&self, job: Job) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(existing) = cache.iter_mut().find(|j| j.job_id == job.job_id) {
            *existing = job;
        } else {
            cache.push(job);
        }
        self.persist(&cache).await
    }

    async fn remove_job(&self, job_id: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.retain(|j| j.job_id != job_id);
        self.persist(&cache).await
    }

    async fn due_jobs(&self, before: DateTime<Utc>) -> Result<Vec<Job>> {
        let cache = self.cache.read().await;
        Ok(cache
            .iter()
            .filter(|j| !j.acquired && j.run_at_utc <= before)
            .cloned()
            .collect())
    }

    async fn all_jobs(&self) -> Result<Vec<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.clone())
    }

    async fn acquire(&self, job_id: &str) -> Result<bool> {
        let mut cache = self.cache.write().await;
        match cache.iter_mut().find(|j| j.job_id == job_id) {
            Some(job) if !job.acquired => {
                job.acquired = true;
                self.persist(&cache).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.retain(|j| j.job_id != job_id);
        self.persist(&cache).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn setup_store() -> (JsonJobStore, TempDir) {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let store = JsonJobStore::new(tmp_dir.path().to_path_buf())
            .await
            .expect("create store");
        (store, tmp_dir)
    }

    #[tokio::test]
    async fn test_upsert_and_all_jobs() {
        let (store, _tmp) = setup_store().await;
        let job = Job::new(Uuid::now_v7(), Utc::now(), 60);
        store.upsert_job(job.clone()).await.unwrap();
        let all = store.all_jobs().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].job_id, job.job_id);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_same_job_id() {
        let (store, _tmp) = setup_store().await;
        let plan_id = Uuid::now_v7();
        let job1 = Job::new(plan_id, Utc::now(), 60);
        store.upsert_job(job1).await.unwrap();

        let new_time = Utc::now() + Duration::hours(1);
        let job2 = Job::new(plan_id, new_time, 60);
        store.upsert_job(job2).await.unwrap();

        let all = store.all_jobs().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].run_at_utc, new_time);
    }

    #[tokio::test]
    async fn test_remove_job() {
        let (store, _tmp) = setup_store().await;
        let job = Job::new(Uuid::now_v7(), Utc::now(), 60);
        store.upsert_job(job.clone()).await.unwrap();
        store.remove_job(&job.job_id).await.unwrap();
        assert!(store.all_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_due_jobs_filters_by_time_and_acquired() {
        let (store, _tmp) = setup_store().await;
        let now = Utc::now();
        let due = Job::new(Uuid::now_v7(), now - Duration::minutes(1), 60);
        let future = Job::new(Uuid::now_v7(), now + Duration::hours(1), 60);
        store.upsert_job(due.clone()).await.unwrap();
        store.upsert_job(future).await.unwrap();

        let result = store.due_jobs(now).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].job_id, due.job_id);
    }

    #[tokio::test]
    async fn test_due_jobs_excludes_acquired() {
        let (store, _tmp) = setup_store().await;
        let now = Utc::now();
        let job = Job::new(Uuid::now_v7(), now - Duration::minutes(1), 60);
        store.upsert_job(job.clone()).await.unwrap();
        store.acquire(&job.job_id).await.unwrap();

        let result = store.due_jobs(now).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let (store, _tmp) = setup_store().await;
        let job = Job::new(Uuid::now_v7(), Utc::now(), 60);
        store.upsert_job(job.clone()).await.unwrap();

        assert!(store.acquire(&job.job_id).await.unwrap());
        assert!(!store.acquire(&job.job_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_missing_job_returns_false() {
        let (store, _tmp) = setup_store().await;
        assert!(!store.acquire("plan_does-not-exist").await.unwrap());
    }

    #[tokio::test]
    async fn test_complete_removes_job() {
        let (store, _tmp) = setup_store().await;
        let job = Job::new(Uuid::now_v7(), Utc::now(), 60);
        store.upsert_job(job.clone()).await.unwrap();
        store.acquire(&job.job_id).await.unwrap();
        store.complete(&job.job_id).await.unwrap();
        assert!(store.all_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let tmp_dir = TempDir::new().unwrap();
        let job = Job::new(Uuid::now_v7(), Utc::now(), 60);
        {
            let store = JsonJobStore::new(tmp_dir.path().to_path_buf()).await.unwrap();
            store.upsert_job(job.clone()).await.unwrap();
        }
        let store2 = JsonJobStore::new(tmp_dir.path().to_path_buf()).await.unwrap();
        let all = store2.all_jobs().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].job_id, job.job_id);
    }

    #[tokio::test]
    async fn test_corrupted_file_recovers_empty_with_backup() {
        let tmp_dir = TempDir::new().unwrap();
        tokio::fs::write(tmp_dir.path().join("jobs.json"), b"{{not json")
            .await
            .unwrap();
        let store = JsonJobStore::new(tmp_dir.path().to_path_buf()).await.unwrap();
        assert!(store.all_jobs().await.unwrap().is_empty());
        assert!(tmp_dir.path().join("jobs.json.bak").exists());
    }

    #[tokio::test]
    async fn test_no_leftover_tmp_file() {
        let (store, tmp) = setup_store().await;
        store
            .upsert_job(Job::new(Uuid::now_v7(), Utc::now(), 60))
            .await
            .unwrap();
        assert!(!tmp.path().join("jobs.json.tmp").exists());
    }
}
