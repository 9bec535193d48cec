use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::clock::Clock;
use crate::models::{AppConfig, Job, Plan};
use crate::storage::{DeviceStore, JobStore, PlanStore, SettingsStore};

/// Outcome of a multicast delivery attempt.
#[derive(Debug, Clone, Default)]
pub struct MulticastResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub per_token_errors: HashMap<String, String>,
}

/// Abstracts the push transport. Implementations may support a batch
/// multicast call, a per-token call, or both; the dispatcher prefers
/// multicast when present.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send_multicast(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<MulticastResult>;

    async fn send_single(&self, token: &str, title: &str, body: &str, data: &Value) -> Result<()>;
}

/// Default channel: logs instead of delivering. Used when no real push
/// transport is configured.
pub struct LoggingDeliveryChannel;

#[async_trait]
impl DeliveryChannel for LoggingDeliveryChannel {
    async fn send_multicast(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<MulticastResult> {
        tracing::info!(
            "[logging channel] multicast to {} token(s): {} -- {:?} ({})",
            tokens.len(),
            title,
            body,
            data
        );
        Ok(MulticastResult {
            success_count: tokens.len(),
            failure_count: 0,
            per_token_errors: HashMap::new(),
        })
    }

    async fn send_single(&self, token: &str, title: &str, body: &str, data: &Value) -> Result<()> {
        tracing::info!(
            "[logging channel] single to {}: {} -- {:?} ({})",
            token,
            title,
            body,
            data
        );
        Ok(())
    }
}

/// Posts a notification payload to a configured webhook URL via reqwest.
/// Illustrates the shape a real push transport would take.
pub struct WebhookDeliveryChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookDeliveryChannel {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookDeliveryChannel {
    async fn send_multicast(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<MulticastResult> {
        // This transport has no batch endpoint; fall back to per-token calls.
        let mut result = MulticastResult::default();
        for token in tokens {
            match self.send_single(token, title, body, data).await {
                Ok(()) => result.success_count += 1,
                Err(e) => {
                    result.failure_count += 1;
                    result.per_token_errors.insert(token.clone(), e.to_string());
                }
            }
        }
        Ok(result)
    }

    async fn send_single(&self, token: &str, title: &str, body: &str, data: &Value) -> Result<()> {
        let payload = serde_json::json!({
            "token": token,
            "title": title,
            "body": body,
            "data": data,
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "webhook returned status {}",
                response.status()
            ));
        }
        Ok(())
    }
}

/// Loads a plan, formats its notification body, and fans it out across the
/// user's registered devices. Owns no job-queue state -- it is invoked once
/// per fired job, with `notified` as the idempotency anchor.
pub struct Dispatcher {
    plan_store: Arc<dyn PlanStore>,
    settings_store: Arc<dyn SettingsStore>,
    device_store: Arc<dyn DeviceStore>,
    job_store: Arc<dyn JobStore>,
    channel: Arc<dyn DeliveryChannel>,
    clock: Arc<dyn Clock>,
    config: Arc<AppConfig>,
}

impl Dispatcher {
    pub fn new(
        plan_store: Arc<dyn PlanStore>,
        settings_store: Arc<dyn SettingsStore>,
        device_store: Arc<dyn DeviceStore>,
        job_store: Arc<dyn JobStore>,
        channel: Arc<dyn DeliveryChannel>,
        clock: Arc<dyn Clock>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            plan_store,
            settings_store,
            device_store,
            job_store,
            channel,
            clock,
            config,
        }
    }

    /// Run the full dispatch contract for a fired job. Always completes
    /// (removes) the job on exit, regardless of outcome.
    pub async fn dispatch(&self, job: &Job) -> Result<()> {
        let outcome = self.dispatch_inner(job).await;
        if let Err(ref e) = outcome {
            tracing::error!("dispatch failed for job '{}': {}", job.job_id, e);
        }
        self.job_store.complete(&job.job_id).await?;
        outcome
    }

    async fn dispatch_inner(&self, job: &Job) -> Result<()> {
        let plan = match self.plan_store.get(job.plan_id).await? {
            Some(p) if !p.notified => p,
            _ => return Ok(()),
        };

        let settings = self.settings_store.get_or_create(&plan.uid).await?;
        if !settings.notifications_enabled {
            self.plan_store.mark_notified(plan.id).await?;
            return Ok(());
        }

        let devices = self.device_store.list_for_user(&plan.uid).await?;
        if devices.is_empty() {
            tracing::info!("no devices registered for uid '{}', skipping dispatch", plan.uid);
            return Ok(());
        }

        let zone = settings.effective_zone(self.clock.now(), &self.config.fallback_timezone);
        let body = format_body(&plan, zone);
        let data = serde_json::json!({
            "type": "plan_notification",
            "date": plan.date.to_string(),
            "start_time": plan.start_time.format("%H:%M").to_string(),
            "end_time": plan.end_time.format("%H:%M").to_string(),
        });

        let tokens: Vec<String> = devices.into_iter().map(|d| d.token).collect();
        let multicast = self
            .channel
            .send_multicast(&tokens, &plan.title, &body, &data)
            .await;

        match multicast {
            Ok(result) => {
                if result.failure_count > 0 {
                    tracing::warn!(
                        "multicast to uid '{}' had {} failure(s): {:?}",
                        plan.uid,
                        result.failure_count,
                        result.per_token_errors
                    );
                }
            }
            Err(e) => {
                tracing::warn!("multicast send failed ({}), falling back to per-token retry", e);
                for token in &tokens {
                    self.send_with_retry(token, &plan.title, &body, &data).await;
                }
            }
        }

        self.plan_store.mark_notified(plan.id).await?;
        Ok(())
    }

    async fn send_with_retry(&self, token: &str, title: &str, body: &str, data: &Value) {
        let retries = self.config.notify_retries.max(1);
        for attempt in 1..=retries {
            let result = tokio::time::timeout(
                StdDuration::from_secs(10),
                self.channel.send_single(token, title, body, data),
            )
            .await;

            match result {
                Ok(Ok(())) => return,
                Ok(Err(e)) => {
                    tracing::warn!(
                        "delivery attempt {}/{} to token '{}' failed: {}",
                        attempt,
                        retries,
                        token,
                        e
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "delivery attempt {}/{} to token '{}' timed out",
                        attempt,
                        retries,
                        token
                    );
                }
            }

            if attempt < retries {
                let backoff = self.config.notify_backoff_base_secs * 2f64.powi((attempt - 1) as i32);
                tokio::time::sleep(StdDuration::from_secs_f64(backoff)).await;
            }
        }
        tracing::error!("exhausted retries delivering to token '{}'", token);
    }
}

fn format_body(plan: &Plan, _zone: chrono_tz::Tz) -> String {
    // The job fires on a UTC instant; the body shows local civil times, which
    // are exactly plan.start_time/end_time in the zone used to schedule it.
    let start_local = plan.start_time.format("%H:%M").to_string();
    let end_local = plan.end_time.format("%H:%M").to_string();
    let mut lines = vec![plan.title.clone()];
    if !plan.description.is_empty() {
        lines.push(plan.description.clone());
    }
    lines.push(format!("{start_local} - {end_local}"));
    lines.join("\n")
}
