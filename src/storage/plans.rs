use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::PlannerError;
use crate::models::plan::{validate_new_plan, validate_plan_update};
use crate::models::{NewPlan, Plan, PlanUpdate};
use crate::storage::PlanStore;

pub struct JsonPlanStore {
    file_path: PathBuf,
    cache: RwLock<Vec<Plan>>,
}

impl JsonPlanStore {
    /// Create a new JsonPlanStore, loading existing data from disk if present.
    ///
    /// If `plans.json` is corrupted, a backup is made at `plans.json.bak`,
    /// a warning is logged, and the store starts empty.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("plans.json");

        let plans = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read plans.json")?;
            match serde_json::from_str::<Vec<Plan>>(&content) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(
                        "plans.json is corrupted ({}), creating backup and starting empty",
                        e
                    );
                    let backup_path = data_dir.join("plans.json.bak");
                    if let Err(backup_err) = tokio::fs::copy(&file_path, &backup_path).await {
                        tracing::error!(
                            "Failed to create backup of corrupted plans.json: {}",
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
            cache: RwLock::new(plans),
        })
    }

    async fn persist(&self, plans: &[Plan]) -> Result<()> {
        let tmp_path = self.file_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(plans).context("Failed to serialize plans")?;
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary plans file")?;
        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary plans file")?;
        Ok(())
    }

    fn conflicting<'a>(
        plans: &'a [Plan],
        uid: &str,
        date: NaiveDate,
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
        exclude: Option<Uuid>,
    ) -> Vec<&'a Plan> {
        plans
            .iter()
            .filter(|p| {
                p.uid == uid
                    && p.date == date
                    && exclude != Some(p.id)
                    && p.overlaps(start, end)
            })
            .collect()
    }
}

#[async_trait]
impl PlanStore for JsonPlanStore {
    async fn create(&self, uid: &str, draft: NewPlan, tier_limit_days: i64, today: NaiveDate) -> Result<Plan> {
        validate_new_plan(&draft)?;

        if draft.date > today + Duration::days(tier_limit_days) {
            return Err(PlannerError::TierLimit(format!(
                "date {} is beyond the allowed {} day horizon",
                draft.date, tier_limit_days
            ))
            .into());
        }

        let mut cache = self.cache.write().await;

        let conflicts = Self::conflicting(
            &cache,
            uid,
            draft.date,
            draft.start_time,
            draft.end_time,
            None,
        );
        if !conflicts.is_empty() {
            let ids: Vec<String> = conflicts.iter().map(|p| p.id.to_string()).collect();
            return Err(PlannerError::Conflict(format!(
                "overlaps existing plan(s): {}",
                ids.join(", ")
            ))
            .into());
        }

        let now = Utc::now();
        let plan = Plan {
            id: Uuid::now_v7(),
            uid: uid.to_string(),
            date: draft.date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            title: draft.title,
            description: draft.description,
            notified: false,
            notify_at_utc: None,
            created_at: now,
            updated_at: now,
        };

        cache.push(plan.clone());
        self.persist(&cache).await?;
        Ok(plan)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Plan>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().find(|p| p.id == id).cloned())
    }

    async fn list_by_range(&self, uid: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Plan>> {
        let cache = self.cache.read().await;
        let mut result: Vec<Plan> = cache
            .iter()
            .filter(|p| p.uid == uid && p.date >= from && p.date <= to)
            .cloned()
            .collect();
        result.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
        Ok(result)
    }

    async fn update(
        &self,
        id: Uuid,
        uid: &str,
        draft: PlanUpdate,
        tier_limit_days: i64,
        today: NaiveDate,
    ) -> Result<Plan> {
        validate_plan_update(&draft)?;

        let mut cache = self.cache.write().await;

        let idx = cache
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PlannerError::NotFound(format!("plan '{id}' not found")))?;

        if cache[idx].uid != uid {
            return Err(PlannerError::Forbidden("plan belongs to another user".to_string()).into());
        }

        let new_date = draft.date.unwrap_or(cache[idx].date);
        let new_start = draft.start_time.unwrap_or(cache[idx].start_time);
        let new_end = draft.end_time.unwrap_or(cache[idx].end_time);
        if new_end <= new_start {
            return Err(PlannerError::Validation("end_time must be after start_time".to_string()).into());
        }

        if new_date > today + Duration::days(tier_limit_days) {
            return Err(PlannerError::TierLimit(format!(
                "date {} is beyond the allowed {} day horizon",
                new_date, tier_limit_days
            ))
            .into());
        }

        let conflicts: Vec<Uuid> = Self::conflicting(&cache, uid, new_date, new_start, new_end, Some(id))
            .into_iter()
            .map(|p| p.id)
            .collect();

        if !conflicts.is_empty() {
            if !draft.force {
                let ids: Vec<String> = conflicts.iter().map(|i| i.to_string()).collect();
                return Err(PlannerError::Conflict(format!(
                    "overlaps existing plan(s): {}",
                    ids.join(", ")
                ))
                .into());
            }
            cache.retain(|p| !conflicts.contains(&p.id));
        }

        let idx = cache
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PlannerError::NotFound(format!("plan '{id}' not found")))?;

        let plan = &mut cache[idx];
        plan.date = new_date;
        plan.start_time = new_start;
        plan.end_time = new_end;
        if let Some(title) = draft.title {
            plan.title = title;
        }
        if let Some(description) = draft.description {
            plan.description = description;
        }
        plan.notified = false;
        plan.updated_at = Utc::now();
        let updated = plan.clone();

        self.persist(&cache).await?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, uid: &str) -> Result<()> {
        let mut cache = self.cache.write().await;
        let idx = cache
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| PlannerError::NotFound(format!("plan '{id}' not found")))?;
        if cache[idx].uid != uid {
            return Err(PlannerError::Forbidden("plan belongs to another user".to_string()).into());
        }
        cache.remove(idx);
        self.persist(&cache).await?;
        Ok(())
    }

    async fn list_pending_for_user(
        &self,
        uid: &str,
        within_days: i64,
        today: NaiveDate,
    ) -> Result<Vec<Plan>> {
        let cache = self.cache.read().await;
        let from = today - Duration::days(1);
        let to = today + Duration::days(within_days);
        Ok(cache
            .iter()
            .filter(|p| p.uid == uid && !p.notified && p.date >= from && p.date <= to)
            .cloned()
            .collect())
    }

    async fn list_all_pending(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Plan>> {
        let cache = self.cache.read().await;
        Ok(cache
            .iter()
            .filter(|p| !p.notified && p.date >= from && p.date <= to)
            .cloned()
            .collect())
    }

    async fn mark_notified(&self, id: Uuid) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(plan) = cache.iter_mut().find(|p| p.id == id) {
            plan.notified = true;
            plan.updated_at = Utc::now();
        }
        self.persist(&cache).await?;
        Ok(())
    }

    async fn set_notify_at(&self, id: Uuid, notify_at_utc: Option<DateTime<Utc>>) -> Result<()> {
        let mut cache = self.cache.write().await;
        if let Some(plan) = cache.iter_mut().find(|p| p.id == id) {
            plan.notify_at_utc = notify_at_utc;
        }
        self.persist(&cache).await?;
        Ok(())
    }
}
