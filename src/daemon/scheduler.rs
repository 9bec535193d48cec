use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{Duration, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::clock::{local_to_utc, Clock};
use crate::daemon::dispatcher::Dispatcher;
use crate::models::{Job, Plan};
use crate::storage::{JobStore, PlanStore, SettingsStore};

const GRACE_WINDOW_HOURS: i64 = 24;
const IMMEDIATE_RUN_OFFSET_SECS: i64 = 5;
const RECOVERY_MISFIRE_GRACE_SECONDS: u64 = 3600;
const RESCHEDULE_WINDOW_DAYS: i64 = 30;
const RECOVERY_LOOKBACK_DAYS: i64 = 1;
const RECOVERY_LOOKAHEAD_DAYS: i64 = 7;

/// Binds plans to durable jobs and runs the pump that fires them.
///
/// Holds no cached plan/settings state itself -- every operation re-reads the
/// stores, so a `reschedule_user` racing a concurrent timezone write always
/// sees at-least the writer's own update by the time it computes `notify_at_utc`.
pub struct Scheduler {
    plan_store: Arc<dyn PlanStore>,
    job_store: Arc<dyn JobStore>,
    settings_store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    notify: Arc<Notify>,
    dispatcher: Arc<Dispatcher>,
    fallback_timezone: String,
}

impl Scheduler {
    pub fn new(
        plan_store: Arc<dyn PlanStore>,
        job_store: Arc<dyn JobStore>,
        settings_store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        notify: Arc<Notify>,
        dispatcher: Arc<Dispatcher>,
        fallback_timezone: String,
    ) -> Self {
        Self {
            plan_store,
            job_store,
            settings_store,
            clock,
            notify,
            dispatcher,
            fallback_timezone,
        }
    }

    /// Compute `notify_at_utc` for `plan` and persist it; upsert a due job
    /// when the instant still lies in the future. No-ops on past instants --
    /// startup recovery is the path that handles those.
    pub async fn schedule(&self, plan: &Plan) -> Result<()> {
        let settings = self.settings_store.get_or_create(&plan.uid).await?;
        let zone = settings.effective_zone(self.clock.now(), &self.fallback_timezone);
        let notify_at = local_to_utc(zone, plan.date, plan.start_time);

        self.plan_store.set_notify_at(plan.id, Some(notify_at)).await?;

        if notify_at > self.clock.now() {
            let job = Job::new(plan.id, notify_at, 60);
            self.job_store.upsert_job(job).await?;
            self.notify.notify_one();
        }
        Ok(())
    }

    pub async fn cancel(&self, plan_id: Uuid) -> Result<()> {
        self.job_store
            .remove_job(&crate::models::job::job_id_for_plan(plan_id))
            .await
    }

    /// Re-binds every pending plan of `uid` to a freshly computed instant.
    /// Meant to be spawned off the request path that triggered a timezone
    /// change, never awaited inline by the HTTP handler.
    pub async fn reschedule_user(&self, uid: &str) -> Result<()> {
        let today = self.clock.now().date_naive();
        let pending = self
            .plan_store
            .list_pending_for_user(uid, RESCHEDULE_WINDOW_DAYS, today)
            .await?;
        for plan in pending {
            self.cancel(plan.id).await?;
            self.schedule(&plan).await?;
        }
        Ok(())
    }

    /// Reconciles persisted `notify_at_utc` against the live clock at process
    /// start, applying the grace-window policy to anything missed while the
    /// process was down.
    pub async fn startup_recovery(&self) -> Result<()> {
        let today = self.clock.now().date_naive();
        let from = today - Duration::days(RECOVERY_LOOKBACK_DAYS);
        let to = today + Duration::days(RECOVERY_LOOKAHEAD_DAYS);
        let pending = self.plan_store.list_all_pending(from, to).await?;
        let now = self.clock.now();

        for plan in pending {
            match plan.notify_at_utc {
                None => {
                    self.schedule(&plan).await?;
                }
                Some(notify_at) if notify_at > now => {
                    let job = Job::new(plan.id, notify_at, 60);
                    self.job_store.upsert_job(job).await?;
                }
                Some(notify_at) => {
                    let age = now - notify_at;
                    if age <= Duration::hours(GRACE_WINDOW_HOURS) {
                        let run_at = now + Duration::seconds(IMMEDIATE_RUN_OFFSET_SECS);
                        let job = Job::new(plan.id, run_at, RECOVERY_MISFIRE_GRACE_SECONDS);
                        self.job_store.upsert_job(job).await?;
                    } else {
                        tracing::warn!(
                            "plan '{}' missed its window by more than {}h, marking notified without dispatch",
                            plan.id,
                            GRACE_WINDOW_HOURS
                        );
                        self.plan_store.mark_notified(plan.id).await?;
                    }
                }
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    /// The pump: sleeps until the earliest due job, wakes early on `Notify`
    /// whenever a caller upserts a job earlier than the current sleep target.
    pub async fn run(&self) -> Result<()> {
        loop {
            let jobs = self.job_store.all_jobs().await?;
            let pending: Vec<&Job> = jobs.iter().filter(|j| !j.acquired).collect();

            if pending.is_empty() {
                self.notify.notified().await;
                continue;
            }

            let earliest = pending.iter().map(|j| j.run_at_utc).min().unwrap();
            let now = self.clock.now();
            let sleep_duration = (earliest - now).to_std().unwrap_or(StdDuration::ZERO);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    let now = self.clock.now();
                    let due = self.job_store.due_jobs(now).await?;
                    for job in due {
                        if self.job_store.acquire(&job.job_id).await? {
                            let dispatcher = self.dispatcher.clone();
                            tokio::spawn(async move {
                                if let Err(e) = dispatcher.dispatch(&job).await {
                                    tracing::error!("dispatch task failed for '{}': {}", job.job_id, e);
                                }
                            });
                        }
                    }
                }
                _ = self.notify.notified() => {
                    continue;
                }
            }
        }
    }
}
