pub mod api;
pub mod devices;

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Device roster
        .route(
            "/api/devices",
            get(devices::list_devices).post(devices::create_device),
        )
        .route("/api/devices/{id}", delete(devices::delete_device))
        // Occupancy
        .route("/api/counts", get(api::get_counts))
        .route("/api/log", get(api::get_log))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
