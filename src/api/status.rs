use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::{
    api::{error::ApiError, AppState, DeviceQuery},
    engine::PowerReading,
    publisher::EnergyReport,
};

/// Device summary response
#[derive(Debug, Serialize)]
pub struct DeviceStatusResponse {
    version: String,
    status: String,
    device_id: String,
    device_name: String,
    power_state: bool,
    /// Instantaneous draw in watts.
    energy_consumption: f64,
    /// Lifetime consumption in kilowatt-hours.
    total_energy: f64,
    profile_name: String,
    profile_category: String,
    voltage: f64,
    current: f64,
}

/// GET / and GET /status - Get the device summary
pub async fn device_status(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<DeviceStatusResponse>, ApiError> {
    let device_id = query
        .device
        .unwrap_or_else(|| state.primary_device_id.clone());
    let reading = state.engine.get_power_consumption(&device_id)?;
    let info = state.engine.get_device_info(&device_id)?;

    Ok(Json(DeviceStatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "Online".to_string(),
        device_name: state.friendly_name(&device_id),
        device_id,
        power_state: reading.power_on,
        energy_consumption: reading.watts,
        total_energy: reading.energy_wh / 1000.0,
        profile_name: info.profile_name,
        profile_category: info.category.to_string(),
        voltage: reading.voltage,
        current: reading.current_amps,
    }))
}

/// GET /energy - Get the smart-meter energy block
pub async fn energy(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<EnergyReport>, ApiError> {
    let device_id = query
        .device
        .unwrap_or_else(|| state.primary_device_id.clone());
    let reading = state.engine.get_power_consumption(&device_id)?;
    Ok(Json(EnergyReport::from_reading(&reading)))
}

/// Profile detail response
#[derive(Debug, Serialize)]
pub struct PowerProfileResponse {
    device_id: String,
    profile_name: String,
    profile_category: String,
    profile_description: String,
    power_state: bool,
    current_watts: f64,
    total_energy_kwh: f64,
    standby_watts: f64,
    max_watts: f64,
    min_watts: f64,
    has_cycling: bool,
    time_dependent: bool,
    seasonal_dependent: bool,
}

/// GET /power-profile - Get the profile a device is bound to
pub async fn power_profile(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<PowerProfileResponse>, ApiError> {
    let device_id = query
        .device
        .unwrap_or_else(|| state.primary_device_id.clone());
    let reading = state.engine.get_power_consumption(&device_id)?;
    let profile = state.engine.device_profile(&device_id)?;

    Ok(Json(PowerProfileResponse {
        device_id,
        profile_name: profile.name.clone(),
        profile_category: profile.category.to_string(),
        profile_description: profile.description.clone(),
        power_state: reading.power_on,
        current_watts: reading.watts,
        total_energy_kwh: reading.energy_wh / 1000.0,
        standby_watts: profile.standby_watts,
        max_watts: profile.base_watts_max,
        min_watts: profile.base_watts_min,
        has_cycling: profile.cycle_minutes.is_some(),
        time_dependent: profile.time_of_day_enabled,
        seasonal_dependent: profile.seasonal_enabled,
    }))
}

/// Builds the `Status <level>` payload. Levels 0 (abbreviated overview),
/// 8 and 10 (sensor block) and 11 (runtime state) are answerable from the
/// simulation; the remaining firmware levels are rejected.
pub fn status_payload(
    state: &AppState,
    device_id: &str,
    level: u8,
) -> Result<serde_json::Value, ApiError> {
    let reading = state.engine.get_power_consumption(device_id)?;
    let now = Local::now().naive_local();
    match level {
        0 => Ok(serde_json::json!({
            "Status": status_block(state, device_id, &reading),
            "StatusSTS": sts_block(state, &reading, now),
            "StatusSNS": sns_block(&reading, now),
        })),
        8 | 10 => Ok(serde_json::json!({ "StatusSNS": sns_block(&reading, now) })),
        11 => Ok(serde_json::json!({ "StatusSTS": sts_block(state, &reading, now) })),
        other => Err(ApiError::BadRequest(format!(
            "status level {other} is not supported"
        ))),
    }
}

fn status_block(state: &AppState, device_id: &str, reading: &PowerReading) -> serde_json::Value {
    let name = state.friendly_name(device_id);
    serde_json::json!({
        "Module": 1,
        "DeviceName": name,
        "FriendlyName": [name],
        "Topic": device_id,
        "Power": if reading.power_on { 1 } else { 0 },
    })
}

fn sns_block(reading: &PowerReading, now: NaiveDateTime) -> serde_json::Value {
    let energy = EnergyReport::from_reading(reading);
    serde_json::json!({
        "Time": format_time(now),
        "ENERGY": {
            "Total": energy.total,
            "Today": energy.today,
            "Yesterday": energy.yesterday,
            "Period": (energy.power * 5.0).round() as i64,
            "Power": energy.power,
            "ApparentPower": energy.apparent_power,
            "ReactivePower": energy.reactive_power,
            "Factor": energy.factor,
            "Voltage": energy.voltage,
            "Current": energy.current,
        }
    })
}

fn sts_block(state: &AppState, reading: &PowerReading, now: NaiveDateTime) -> serde_json::Value {
    let uptime = state.uptime_seconds();
    serde_json::json!({
        "Time": format_time(now),
        "Uptime": format_uptime(uptime),
        "UptimeSec": uptime,
        "POWER": if reading.power_on { "ON" } else { "OFF" },
    })
}

fn format_time(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Tasmota uptime notation, `<days>T<hh>:<mm>:<ss>`.
fn format_uptime(secs: u64) -> String {
    format!(
        "{}T{:02}:{:02}:{:02}",
        secs / 86_400,
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60
    )
}
