pub mod devices;
pub mod jobs;
pub mod plans;
pub mod settings;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{DeviceEndpoint, Job, NewPlan, Plan, PlanUpdate, UserSettings};

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn create(&self, uid: &str, draft: NewPlan, tier_limit_days: i64, today: NaiveDate) -> Result<Plan>;
    async fn get(&self, id: Uuid) -> Result<Option<Plan>>;
    async fn list_by_range(&self, uid: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Plan>>;
    async fn update(
        &self,
        id: Uuid,
        uid: &str,
        draft: PlanUpdate,
        tier_limit_days: i64,
        today: NaiveDate,
    ) -> Result<Plan>;
    async fn delete(&self, id: Uuid, uid: &str) -> Result<()>;
    async fn list_pending_for_user(&self, uid: &str, within_days: i64, today: NaiveDate) -> Result<Vec<Plan>>;
    /// All users' pending (not yet notified) plans within [from, to], used by startup recovery.
    async fn list_all_pending(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Plan>>;
    async fn mark_notified(&self, id: Uuid) -> Result<()>;
    async fn set_notify_at(&self, id: Uuid, notify_at_utc: Option<DateTime<Utc>>) -> Result<()>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn upsert_job(&self, job: Job) -> Result<()>;
    async fn remove_job(&self, job_id: &str) -> Result<()>;
    async fn due_jobs(&self, before: DateTime<Utc>) -> Result<Vec<Job>>;
    async fn all_jobs(&self) -> Result<Vec<Job>>;
    /// Atomically mark a job in-flight. Returns false if already acquired or absent.
    async fn acquire(&self, job_id: &str) -> Result<bool>;
    async fn complete(&self, job_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_or_create(&self, uid: &str) -> Result<UserSettings>;
    async fn set_timezone(&self, uid: &str, zone: &str, persist: bool, ttl_hours: i64) -> Result<()>;
    async fn set_notifications_enabled(&self, uid: &str, enabled: bool) -> Result<()>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn register(&self, uid: &str, token: &str, provider: &str) -> Result<()>;
    async fn unregister(&self, uid: &str, token: &str) -> Result<()>;
    async fn list_for_user(&self, uid: &str) -> Result<Vec<DeviceEndpoint>>;
}
