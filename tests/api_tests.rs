//! Integration tests for the HTTP API and the scheduler's durability story.
//!
//! These tests spawn a real Axum server on a random port and use reqwest
//! to hit it with actual HTTP requests, backed by the real JSON stores over
//! a temp directory and a `FakeClock` so timing-sensitive scenarios are
//! deterministic.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use planner_core::clock::{Clock, FakeClock};
use planner_core::daemon::dispatcher::{Dispatcher, LoggingDeliveryChannel};
use planner_core::daemon::scheduler::Scheduler;
use planner_core::models::AppConfig;
use planner_core::server::{self, AppState};
use planner_core::storage::devices::JsonDeviceStore;
use planner_core::storage::jobs::JsonJobStore;
use planner_core::storage::plans::JsonPlanStore;
use planner_core::storage::settings::JsonSettingsStore;
use planner_core::storage::{DeviceStore, JobStore, PlanStore, SettingsStore};

use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    base_url: String,
    state: Arc<AppState>,
    _dir: TempDir,
    _server: tokio::task::JoinHandle<()>,
}

async fn spawn_test_server(now: chrono::DateTime<Utc>) -> Harness {
    let dir = TempDir::new().expect("create temp dir");

    let plan_store = Arc::new(
        JsonPlanStore::new(dir.path().to_path_buf())
            .await
            .expect("create plan store"),
    ) as Arc<dyn PlanStore>;
    let job_store = Arc::new(
        JsonJobStore::new(dir.path().to_path_buf())
            .await
            .expect("create job store"),
    ) as Arc<dyn JobStore>;
    let settings_store = Arc::new(
        JsonSettingsStore::new(dir.path().to_path_buf())
            .await
            .expect("create settings store"),
    ) as Arc<dyn SettingsStore>;
    let device_store = Arc::new(
        JsonDeviceStore::new(dir.path().to_path_buf())
            .await
            .expect("create device store"),
    ) as Arc<dyn DeviceStore>;

    let clock = FakeClock::new(now);
    let config = Arc::new(AppConfig::default());

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&plan_store),
        Arc::clone(&settings_store),
        Arc::clone(&device_store),
        Arc::clone(&job_store),
        Arc::new(LoggingDeliveryChannel),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&config),
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&plan_store),
        Arc::clone(&job_store),
        Arc::clone(&settings_store),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(tokio::sync::Notify::new()),
        dispatcher,
        config.fallback_timezone.clone(),
    ));

    let (shutdown_tx, _rx) = tokio::sync::watch::channel(());
    let state = Arc::new(AppState {
        plan_store,
        job_store,
        settings_store,
        device_store,
        scheduler,
        config,
        clock: clock as Arc<dyn Clock>,
        start_time: Instant::now(),
        shutdown_tx,
    });

    let router = server::create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    Harness {
        base_url,
        state,
        _dir: dir,
        _server: handle,
    }
}

fn plan_json(date: chrono::NaiveDate, start: &str, end: &str, title: &str) -> serde_json::Value {
    serde_json::json!({
        "date": date.to_string(),
        "start_time": start,
        "end_time": end,
        "title": title,
        "description": "",
    })
}

// ---------------------------------------------------------------------------
// 1. Create within tier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_within_tier_is_listed() {
    let today = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let harness = spawn_test_server(today).await;
    let client = reqwest::Client::new();

    let plan_date = chrono::NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
    let resp = client
        .post(format!("{}/api/plans", harness.base_url))
        .header("x-user-id", "u1")
        .json(&plan_json(plan_date, "09:00:00", "10:00:00", "Dentist"))
        .send()
        .await
        .expect("send create request");
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let created: serde_json::Value = resp.json().await.expect("parse created plan");
    assert_eq!(created["notified"], false);
    assert!(created["id"].is_string());

    let listed = client
        .get(format!("{}/api/plans", harness.base_url))
        .header("x-user-id", "u1")
        .query(&[("from", "2025-01-20"), ("to", "2025-01-20")])
        .send()
        .await
        .expect("send list request")
        .json::<serde_json::Value>()
        .await
        .expect("parse list response");
    let plans = listed.as_array().expect("array of plans");
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["title"], "Dentist");
}

// ---------------------------------------------------------------------------
// 2. Tier violation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_beyond_tier_is_rejected() {
    let today = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let harness = spawn_test_server(today).await;
    let client = reqwest::Client::new();

    let plan_date = chrono::NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    let resp = client
        .post(format!("{}/api/plans", harness.base_url))
        .header("x-user-id", "u1")
        .json(&plan_json(plan_date, "09:00:00", "10:00:00", "Too far out"))
        .send()
        .await
        .expect("send create request");
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
    let body: serde_json::Value = resp.json().await.expect("parse error body");
    assert_eq!(body["error"], "tier_limit");
}

// ---------------------------------------------------------------------------
// 3. Overlap rejection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_plan_is_rejected() {
    let today = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let harness = spawn_test_server(today).await;
    let client = reqwest::Client::new();

    let plan_date = chrono::NaiveDate::from_ymd_opt(2025, 1, 20).unwrap();
    client
        .post(format!("{}/api/plans", harness.base_url))
        .header("x-user-id", "u1")
        .json(&plan_json(plan_date, "09:00:00", "10:00:00", "Existing"))
        .send()
        .await
        .expect("create first plan");

    let resp = client
        .post(format!("{}/api/plans", harness.base_url))
        .header("x-user-id", "u1")
        .json(&plan_json(plan_date, "09:30:00", "10:30:00", "Overlapping"))
        .send()
        .await
        .expect("create overlapping plan");
    assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
    let body: serde_json::Value = resp.json().await.expect("parse error body");
    assert_eq!(body["error"], "conflict");
}

// ---------------------------------------------------------------------------
// 4. Timezone cascade
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timezone_change_cascades_to_pending_jobs() {
    // 12:00 UTC is 15:00 in Europe/Istanbul (UTC+3).
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let harness = spawn_test_server(now).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/settings/timezone", harness.base_url))
        .header("x-user-id", "u1")
        .json(&serde_json::json!({"zone": "Europe/Istanbul", "persist": true}))
        .send()
        .await
        .expect("set initial timezone");

    let today = now.date_naive();
    let created: serde_json::Value = client
        .post(format!("{}/api/plans", harness.base_url))
        .header("x-user-id", "u1")
        .json(&plan_json(today, "15:00:00", "16:00:00", "Standup"))
        .send()
        .await
        .expect("create plan")
        .json()
        .await
        .expect("parse created plan");
    let plan_id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let job_before = harness
        .state
        .job_store
        .all_jobs()
        .await
        .expect("list jobs")
        .into_iter()
        .find(|j| j.plan_id == plan_id)
        .expect("job exists before cascade");
    assert_eq!(job_before.run_at_utc, Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap());

    let resp = client
        .post(format!("{}/api/settings/timezone", harness.base_url))
        .header("x-user-id", "u1")
        .json(&serde_json::json!({"zone": "UTC", "persist": true}))
        .send()
        .await
        .expect("set new timezone");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    // The cascade reschedule is spawned off the request path; give it a tick.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let job_after = harness
        .state
        .job_store
        .all_jobs()
        .await
        .expect("list jobs")
        .into_iter()
        .find(|j| j.plan_id == plan_id)
        .expect("job exists after cascade");
    assert_eq!(job_after.run_at_utc, Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap());
}

// ---------------------------------------------------------------------------
// 5 & 6. Startup recovery: grace window vs too-old
// ---------------------------------------------------------------------------

#[tokio::test]
async fn restart_within_grace_window_reschedules_immediate_run() {
    let crash_instant = Utc.with_ymd_and_hms(2025, 1, 10, 15, 0, 0).unwrap();
    let notify_at = crash_instant - ChronoDuration::minutes(5);
    let restart_instant = crash_instant + ChronoDuration::minutes(10);

    let harness = spawn_test_server(restart_instant).await;

    let plan = harness
        .state
        .plan_store
        .create(
            "u1",
            planner_core::models::NewPlan {
                date: restart_instant.date_naive(),
                start_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
                title: "Recovering".to_string(),
                description: String::new(),
            },
            365,
            restart_instant.date_naive(),
        )
        .await
        .expect("seed plan");
    harness
        .state
        .plan_store
        .set_notify_at(plan.id, Some(notify_at))
        .await
        .expect("set notify_at_utc");

    harness
        .state
        .scheduler
        .startup_recovery()
        .await
        .expect("run startup recovery");

    let job = harness
        .state
        .job_store
        .all_jobs()
        .await
        .expect("list jobs")
        .into_iter()
        .find(|j| j.plan_id == plan.id)
        .expect("recovered job exists");
    assert_eq!(job.run_at_utc, restart_instant + ChronoDuration::seconds(5));
    assert_eq!(job.misfire_grace_seconds, 3600);

    let refreshed = harness
        .state
        .plan_store
        .get(plan.id)
        .await
        .expect("reload plan")
        .expect("plan still present");
    assert!(!refreshed.notified);
}

#[tokio::test]
async fn restart_past_grace_window_marks_notified_without_dispatch() {
    let restart_instant = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
    let notify_at = restart_instant - ChronoDuration::days(1) - ChronoDuration::hours(2);

    let harness = spawn_test_server(restart_instant).await;

    let plan = harness
        .state
        .plan_store
        .create(
            "u1",
            planner_core::models::NewPlan {
                date: (restart_instant - ChronoDuration::days(1)).date_naive(),
                start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
                title: "Too old".to_string(),
                description: String::new(),
            },
            365,
            restart_instant.date_naive(),
        )
        .await
        .expect("seed plan");
    harness
        .state
        .plan_store
        .set_notify_at(plan.id, Some(notify_at))
        .await
        .expect("set notify_at_utc");

    harness
        .state
        .scheduler
        .startup_recovery()
        .await
        .expect("run startup recovery");

    let jobs = harness
        .state
        .job_store
        .all_jobs()
        .await
        .expect("list jobs");
    assert!(!jobs.iter().any(|j| j.plan_id == plan.id));

    let refreshed = harness
        .state
        .plan_store
        .get(plan.id)
        .await
        .expect("reload plan")
        .expect("plan still present");
    assert!(refreshed.notified);
}

// ---------------------------------------------------------------------------
// Misc HTTP surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoint_reports_pending_plan_count() {
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let harness = spawn_test_server(now).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", harness.base_url))
        .send()
        .await
        .expect("send health request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.expect("parse health body");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn device_registration_round_trip() {
    let now = Utc.with_ymd_and_hms(2025, 1, 10, 8, 0, 0).unwrap();
    let harness = spawn_test_server(now).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/devices", harness.base_url))
        .header("x-user-id", "u1")
        .json(&serde_json::json!({"token": "tok-1", "provider": "fcm"}))
        .send()
        .await
        .expect("register device");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let resp = client
        .delete(format!("{}/api/devices/tok-1", harness.base_url))
        .header("x-user-id", "u1")
        .send()
        .await
        .expect("unregister device");
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);
}
