//! Tasmota console command surface: the `/cm?cmnd=` endpoint real Tasmota
//! firmware exposes, plus the plain REST switch endpoint.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::{error::ApiError, status, AppState, DeviceQuery};

/// Commands understood by the console endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TasmotaCommand {
    /// `Power [ON|OFF|TOGGLE]`. Without an argument the command only
    /// reads the current state.
    Power(Option<PowerAction>),
    /// `Status [level]`. Without a level, level 0.
    Status(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    On,
    Off,
    Toggle,
}

impl TasmotaCommand {
    /// Parse the text form of a console command: the command word plus an
    /// optional argument, whitespace separated, case-insensitive. Anything
    /// after the argument is ignored, like the firmware does.
    pub fn parse(input: &str) -> Result<Self, ApiError> {
        let mut parts = input.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| ApiError::BadRequest("command is required".to_string()))?;
        let argument = parts.next();

        match command.to_ascii_uppercase().as_str() {
            "POWER" => match argument.map(|a| a.to_ascii_uppercase()) {
                None => Ok(TasmotaCommand::Power(None)),
                Some(arg) => match arg.as_str() {
                    "ON" | "1" | "TRUE" => Ok(TasmotaCommand::Power(Some(PowerAction::On))),
                    "OFF" | "0" | "FALSE" => Ok(TasmotaCommand::Power(Some(PowerAction::Off))),
                    "TOGGLE" => Ok(TasmotaCommand::Power(Some(PowerAction::Toggle))),
                    other => Err(ApiError::BadRequest(format!(
                        "invalid power parameter: {other}"
                    ))),
                },
            },
            "STATUS" => match argument {
                None => Ok(TasmotaCommand::Status(0)),
                Some(arg) => {
                    let level: i32 = arg.parse().map_err(|_| {
                        ApiError::BadRequest(format!("invalid status level: {arg}"))
                    })?;
                    if !(0..=12).contains(&level) {
                        return Err(ApiError::BadRequest(
                            "status level must be between 0 and 12".to_string(),
                        ));
                    }
                    Ok(TasmotaCommand::Status(level as u8))
                }
            },
            other => Err(ApiError::BadRequest(format!("unknown command: {other}"))),
        }
    }
}

/// Query string of the console endpoint.
#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    pub cmnd: String,
    /// Target device; defaults to the primary device.
    pub device: Option<String>,
}

/// GET /cm - execute a Tasmota console command
pub async fn execute(
    State(state): State<AppState>,
    Query(query): Query<CommandQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let device_id = query
        .device
        .unwrap_or_else(|| state.primary_device_id.clone());

    match TasmotaCommand::parse(&query.cmnd)? {
        TasmotaCommand::Power(action) => {
            let power_on = apply_power_action(&state, &device_id, action)?;
            Ok(Json(power_payload(power_on)))
        }
        TasmotaCommand::Status(level) => {
            Ok(Json(status::status_payload(&state, &device_id, level)?))
        }
    }
}

/// POST /power/:state - REST switch endpoint (`on`, `off`, `toggle`)
pub async fn set_power(
    State(state): State<AppState>,
    Path(switch): Path<String>,
    Query(query): Query<DeviceQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let device_id = query
        .device
        .unwrap_or_else(|| state.primary_device_id.clone());

    let verb = switch.to_ascii_lowercase();
    let power_on = match verb.as_str() {
        "on" => {
            state.engine.set_power_state(&device_id, true)?;
            true
        }
        "off" => {
            state.engine.set_power_state(&device_id, false)?;
            false
        }
        "toggle" => state.engine.toggle_power_state(&device_id)?.0,
        other => {
            return Err(ApiError::BadRequest(format!(
                "invalid power state '{other}', use 'on', 'off' or 'toggle'"
            )))
        }
    };

    Ok(Json(serde_json::json!({
        "device_id": device_id,
        "power_state": power_on,
        "message": format!("Power turned {verb}"),
    })))
}

fn apply_power_action(
    state: &AppState,
    device_id: &str,
    action: Option<PowerAction>,
) -> Result<bool, ApiError> {
    let power_on = match action {
        None => state.engine.get_device_info(device_id)?.power_on,
        Some(PowerAction::On) => {
            state.engine.set_power_state(device_id, true)?;
            true
        }
        Some(PowerAction::Off) => {
            state.engine.set_power_state(device_id, false)?;
            false
        }
        Some(PowerAction::Toggle) => state.engine.toggle_power_state(device_id)?.0,
    };
    Ok(power_on)
}

fn power_payload(power_on: bool) -> serde_json::Value {
    serde_json::json!({ "POWER": if power_on { "ON" } else { "OFF" } })
}
