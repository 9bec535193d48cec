use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::errors::PlannerError;
use crate::models::user_settings::validate_timezone;
use crate::models::{NewPlan, PlanUpdate, RegisterDeviceRequest, SetTimezoneRequest};

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

/// Map a store/scheduler `anyhow::Error` to its HTTP representation. Errors
/// that did not originate as a `PlannerError` (a genuinely unexpected I/O
/// failure) are reported as 500s rather than guessed at.
fn map_error(err: anyhow::Error) -> (StatusCode, Json<ErrorResponse>) {
    match err.downcast_ref::<PlannerError>() {
        Some(PlannerError::NotFound(msg)) => error_response(StatusCode::NOT_FOUND, "not_found", msg),
        Some(PlannerError::Conflict(msg)) => error_response(StatusCode::CONFLICT, "conflict", msg),
        Some(PlannerError::Validation(msg)) => {
            error_response(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        Some(PlannerError::TierLimit(msg)) => error_response(StatusCode::FORBIDDEN, "tier_limit", msg),
        Some(PlannerError::InvalidTimezone(msg)) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_timezone", msg)
        }
        Some(PlannerError::Forbidden(msg)) => error_response(StatusCode::FORBIDDEN, "forbidden", msg),
        Some(PlannerError::Storage(msg)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg)
        }
        Some(PlannerError::Internal(msg)) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
        None => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            &err.to_string(),
        ),
    }
}

/// Resolve the caller's uid from the `X-User-Id` header. Full auth
/// (token verification) is out of scope; this is the single seam a real
/// bearer-token resolver would plug into.
fn resolve_uid(headers: &HeaderMap) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "unauthorized", "missing X-User-Id header"))
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// POST /api/plans
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<NewPlan>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    let settings = match state.settings_store.get_or_create(&uid).await {
        Ok(s) => s,
        Err(e) => return map_error(e).into_response(),
    };
    let tier_limit_days = settings.subscription_level.tier_limit_days(&state.config);

    let today = state.clock.now().date_naive();
    let plan = match state.plan_store.create(&uid, draft, tier_limit_days, today).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("plan creation failed for uid '{}': {}", uid, e);
            return map_error(e).into_response();
        }
    };

    if settings.notifications_enabled && plan.date >= state.clock.now().date_naive() {
        if let Err(e) = state.scheduler.schedule(&plan).await {
            tracing::error!("failed to schedule plan '{}': {}", plan.id, e);
        }
    }

    (StatusCode::CREATED, Json(plan)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListPlansParams {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// GET /api/plans
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListPlansParams>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    match state
        .plan_store
        .list_by_range(&uid, params.from, params.to)
        .await
    {
        Ok(plans) => Json(plans).into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

/// GET /api/plans/{id}
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    match state.plan_store.get(id).await {
        Ok(Some(plan)) if plan.uid == uid => Json(plan).into_response(),
        Ok(Some(_)) => {
            error_response(StatusCode::FORBIDDEN, "forbidden", "plan belongs to another user")
                .into_response()
        }
        Ok(None) => {
            error_response(StatusCode::NOT_FOUND, "not_found", &format!("plan '{id}' not found"))
                .into_response()
        }
        Err(e) => map_error(e).into_response(),
    }
}

/// PATCH /api/plans/{id}
pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(draft): Json<PlanUpdate>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    let settings = match state.settings_store.get_or_create(&uid).await {
        Ok(s) => s,
        Err(e) => return map_error(e).into_response(),
    };
    let tier_limit_days = settings.subscription_level.tier_limit_days(&state.config);

    let today = state.clock.now().date_naive();
    let plan = match state.plan_store.update(id, &uid, draft, tier_limit_days, today).await {
        Ok(p) => p,
        Err(e) => return map_error(e).into_response(),
    };

    if let Err(e) = state.scheduler.cancel(plan.id).await {
        tracing::error!("failed to cancel job for updated plan '{}': {}", plan.id, e);
    }
    if settings.notifications_enabled && plan.date >= state.clock.now().date_naive() {
        if let Err(e) = state.scheduler.schedule(&plan).await {
            tracing::error!("failed to reschedule updated plan '{}': {}", plan.id, e);
        }
    }

    Json(plan).into_response()
}

/// DELETE /api/plans/{id}
pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    match state.plan_store.delete(id, &uid).await {
        Ok(()) => {
            if let Err(e) = state.scheduler.cancel(id).await {
                tracing::error!("failed to cancel job for deleted plan '{}': {}", id, e);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => map_error(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// POST /api/settings/timezone
pub async fn set_timezone(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetTimezoneRequest>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = validate_timezone(&req.zone) {
        return map_error(e.into()).into_response();
    }

    let ttl_hours = req.ttl_hours.unwrap_or(state.config.session_tz_ttl_hours);
    if let Err(e) = state
        .settings_store
        .set_timezone(&uid, &req.zone, req.persist, ttl_hours)
        .await
    {
        return map_error(e).into_response();
    }

    // Cascade reschedule runs off the request path.
    let scheduler = Arc::clone(&state.scheduler);
    let uid_for_task = uid.clone();
    tokio::spawn(async move {
        if let Err(e) = scheduler.reschedule_user(&uid_for_task).await {
            tracing::error!("cascade reschedule failed for uid '{}': {}", uid_for_task, e);
        }
    });

    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
pub struct SetNotificationsRequest {
    pub enabled: bool,
}

/// POST /api/settings/notifications
pub async fn set_notifications_enabled(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetNotificationsRequest>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    match state
        .settings_store
        .set_notifications_enabled(&uid, req.enabled)
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// POST /api/devices
pub async fn register_device(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterDeviceRequest>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    let provider = req.provider.unwrap_or_else(|| "fcm".to_string());
    match state.device_store.register(&uid, &req.token, &provider).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

/// DELETE /api/devices/{token}
pub async fn unregister_device(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let uid = match resolve_uid(&headers) {
        Ok(uid) => uid,
        Err(e) => return e.into_response(),
    };

    match state.device_store.unregister(&uid, &token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => map_error(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Process lifecycle
// ---------------------------------------------------------------------------

/// POST /api/shutdown
pub async fn shutdown(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());
    (StatusCode::OK, Json(serde_json::json!({ "message": "shutdown initiated" })))
}
