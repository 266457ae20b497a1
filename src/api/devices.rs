use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
    api::{error::ApiError, AppState},
    engine::{DeviceCategory, DeviceInfo, PowerProfile},
};

/// Device list response
#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    devices: Vec<DeviceInfo>,
    total: usize,
}

/// Request to register a device or rebind the profile of an existing one
#[derive(Debug, Deserialize)]
pub struct AssignDeviceRequest {
    device_id: String,
    /// Exact profile name; overrides `category` and the identifier.
    profile: Option<String>,
    /// Category hint, snake_case.
    category: Option<String>,
}

/// Profile list response
#[derive(Debug, Serialize)]
pub struct ProfileListResponse {
    profiles: Vec<PowerProfile>,
    total: usize,
}

/// GET /devices - List all registered devices
pub async fn list_devices(
    State(state): State<AppState>,
) -> Result<Json<DeviceListResponse>, ApiError> {
    let devices: Vec<DeviceInfo> = state
        .engine
        .device_ids()
        .iter()
        .map(|id| state.engine.get_device_info(id))
        .collect::<Result<_, _>>()?;
    let total = devices.len();
    Ok(Json(DeviceListResponse { devices, total }))
}

/// GET /devices/:id - Get one device
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<DeviceInfo>, ApiError> {
    Ok(Json(state.engine.get_device_info(&device_id)?))
}

/// POST /devices - Register a device or rebind its profile
pub async fn assign_device(
    State(state): State<AppState>,
    Json(request): Json<AssignDeviceRequest>,
) -> Result<Json<DeviceInfo>, ApiError> {
    if request.device_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "device_id must not be empty".to_string(),
        ));
    }
    let category = request
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;
    state
        .engine
        .assign_profile(&request.device_id, request.profile.as_deref(), category)?;
    Ok(Json(state.engine.get_device_info(&request.device_id)?))
}

/// GET /profiles - List the profile catalog
pub async fn list_profiles(State(state): State<AppState>) -> Json<ProfileListResponse> {
    let profiles: Vec<PowerProfile> = state
        .engine
        .catalog()
        .profiles()
        .iter()
        .map(|p| p.as_ref().clone())
        .collect();
    let total = profiles.len();
    Json(ProfileListResponse { profiles, total })
}

fn parse_category(raw: &str) -> Result<DeviceCategory, ApiError> {
    raw.parse().map_err(|_| {
        let known: Vec<String> = DeviceCategory::iter().map(|c| c.to_string()).collect();
        ApiError::BadRequest(format!(
            "unknown device category '{raw}'. Must be one of: {}",
            known.join(", ")
        ))
    })
}
