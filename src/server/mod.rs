pub mod health;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::clock::Clock;
use crate::daemon::scheduler::Scheduler;
use crate::models::AppConfig;
use crate::storage::{DeviceStore, JobStore, PlanStore, SettingsStore};

/// Shared application state for the Axum server.
pub struct AppState {
    pub plan_store: Arc<dyn PlanStore>,
    pub job_store: Arc<dyn JobStore>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub device_store: Arc<dyn DeviceStore>,
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
    pub shutdown_tx: tokio::sync::watch::Sender<()>,
}

/// Build the Axum router exposing the plan/settings/device/process-lifecycle
/// surface. Thin glue: every handler delegates straight into a store or the
/// scheduler, no business logic lives here.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/plans", get(routes::list_plans).post(routes::create_plan))
        .route(
            "/api/plans/{id}",
            get(routes::get_plan)
                .patch(routes::update_plan)
                .delete(routes::delete_plan),
        )
        .route("/api/settings/timezone", post(routes::set_timezone))
        .route(
            "/api/settings/notifications",
            post(routes::set_notifications_enabled),
        )
        .route(
            "/api/devices",
            post(routes::register_device),
        )
        .route("/api/devices/{token}", delete(routes::unregister_device))
        .route("/api/shutdown", post(routes::shutdown))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
