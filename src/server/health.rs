use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub pending_plan_count: usize,
    pub version: String,
    pub data_dir: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("health check");

    let uptime = state.start_time.elapsed().as_secs();

    let today = state.clock.now().date_naive();
    let pending_plan_count = match state
        .plan_store
        .list_all_pending(today, today + chrono::Duration::days(365))
        .await
    {
        Ok(plans) => plans.len(),
        Err(_) => 0,
    };

    let data_dir = state
        .config
        .data_dir
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: uptime,
        pending_plan_count,
        version: env!("CARGO_PKG_VERSION").to_string(),
        data_dir,
    };

    (StatusCode::OK, Json(response))
}
