use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::RegistryError;
use crate::models::{CreateDeviceRequest, Device, GetDevicesResponse};
use crate::state::AppState;

/// GET /api/devices - List registered devices.
pub async fn list_devices(State(state): State<AppState>) -> Json<GetDevicesResponse> {
    Json(GetDevicesResponse {
        devices: state.registry.snapshot(),
    })
}

/// POST /api/devices - Register a device. It is polled from the next tick on.
pub async fn create_device(
    State(state): State<AppState>,
    Json(req): Json<CreateDeviceRequest>,
) -> Response {
    let id = req.id.trim();
    if id.is_empty() {
        return (StatusCode::BAD_REQUEST, "id is required").into_response();
    }

    let mut device = Device::new(id);
    device.username = req.username;
    device.password = req.password;

    match state.registry.add(device.clone()) {
        Ok(()) => {}
        Err(RegistryError::DuplicateDevice(id)) => {
            return (
                StatusCode::CONFLICT,
                format!("Device already registered: {}", id),
            )
                .into_response();
        }
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }

    tracing::info!(device = %device.id, "Device added");
    if let Err(e) = state.sink.note_device_added(&device) {
        tracing::error!(device = %device.id, "Failed to log device addition: {}", e);
    }

    (StatusCode::CREATED, Json(device)).into_response()
}

/// DELETE /api/devices/{id} - Stop polling a device. Unknown ids are not an error.
pub async fn delete_device(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    if state.registry.remove(&id) {
        tracing::info!(device = %id, "Device removed");
    }
    StatusCode::NO_CONTENT
}
