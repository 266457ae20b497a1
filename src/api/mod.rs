//! # HTTP Command Adapter
//!
//! Axum surface of the simulator: the Tasmota-compatible endpoints (`/cm`,
//! the status pages, `/power/:state`) plus the administrative fleet routes.
//! Handlers stay thin; they parse, call the engine and shape the response.

pub mod command;
pub mod devices;
pub mod error;
pub mod status;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::Config, engine::PowerEngine};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PowerEngine>,
    /// Device targeted when a request names none.
    pub primary_device_id: String,
    /// Configured display names by device identifier.
    pub device_names: Arc<HashMap<String, String>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<PowerEngine>, cfg: &Config) -> Self {
        let device_names = cfg
            .fleet()
            .iter()
            .map(|d| (d.id.clone(), d.friendly_name().to_string()))
            .collect();
        Self {
            engine,
            primary_device_id: cfg.primary_device_id(),
            device_names: Arc::new(device_names),
            started_at: Instant::now(),
        }
    }

    /// Display name for a device: the configured name, else the identifier.
    pub fn friendly_name(&self, device_id: &str) -> String {
        self.device_names
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| device_id.to_string())
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(device_id: &str) -> Self {
        let engine = Arc::new(PowerEngine::default().with_random_seed(17));
        engine
            .assign_profile(device_id, None, None)
            .expect("test device registers");
        Self {
            engine,
            primary_device_id: device_id.to_string(),
            device_names: Arc::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }
}

/// Query naming the target device. Tasmota-facing endpoints fall back to
/// the primary device when it is absent.
#[derive(Debug, Deserialize)]
pub struct DeviceQuery {
    pub device: Option<String>,
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    Router::new()
        .route("/cm", get(command::execute))
        .route("/", get(status::device_status))
        .route("/status", get(status::device_status))
        .route("/energy", get(status::energy))
        .route("/power-profile", get(status::power_profile))
        .route("/power/:state", post(command::set_power))
        .route(
            "/devices",
            get(devices::list_devices).post(devices::assign_device),
        )
        .route("/devices/:id", get(devices::get_device))
        .route("/profiles", get(devices::list_profiles))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    cfg.server.request_timeout_secs,
                ))),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
