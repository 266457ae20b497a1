//! # Telemetry Publisher
//!
//! Periodic consumption snapshots for every registered device, pushed to a
//! pluggable sink. Publishing is fire-and-forget: a failing sink is logged
//! and the sweep carries on, and re-publishing a snapshot is harmless
//! because messages carry absolute totals, not deltas.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{PowerEngine, PowerReading};

/// One telemetry report for one device.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMessage {
    pub device_id: String,
    pub power_state: bool,
    pub energy: EnergyReport,
    pub timestamp: NaiveDateTime,
}

impl TelemetryMessage {
    pub fn from_reading(reading: &PowerReading) -> Self {
        Self {
            device_id: reading.device_id.clone(),
            power_state: reading.power_on,
            energy: EnergyReport::from_reading(reading),
            timestamp: reading.timestamp,
        }
    }
}

/// Smart-meter energy block, in the field layout Tasmota firmware reports.
#[derive(Debug, Clone, Serialize)]
pub struct EnergyReport {
    /// Active power in watts.
    pub power: f64,
    /// Apparent power in volt-amperes.
    pub apparent_power: f64,
    /// Reactive power in volt-amperes reactive.
    pub reactive_power: f64,
    /// Power factor.
    pub factor: f64,
    /// Mains voltage in volts.
    pub voltage: f64,
    /// Current in amperes.
    pub current: f64,
    /// Accumulated energy in kilowatt-hours.
    pub total: f64,
    /// Estimated consumption today, in kilowatt-hours.
    pub today: f64,
    /// Estimated consumption yesterday, in kilowatt-hours.
    pub yesterday: f64,
}

impl EnergyReport {
    /// Derive the energy block from an engine reading. Apparent and
    /// reactive power are synthetic (fixed ratios of active power), and so
    /// are the daily estimates; the ledger total converts from watt-hours
    /// to kilowatt-hours here.
    pub fn from_reading(reading: &PowerReading) -> Self {
        let power = reading.watts;
        let apparent_power = power * 1.05;
        let factor = if apparent_power > 0.0 {
            rounded(power / apparent_power, 2)
        } else {
            0.0
        };
        let total_kwh = reading.energy_wh / 1000.0;
        Self {
            power: rounded(power, 2),
            apparent_power: rounded(apparent_power, 2),
            reactive_power: rounded(power * 0.1, 2),
            factor,
            voltage: rounded(reading.voltage, 1),
            current: rounded(reading.current_amps, 3),
            total: rounded(total_kwh, 3),
            today: rounded(total_kwh * 0.1, 3),
            yesterday: rounded(total_kwh * 0.08, 3),
        }
    }
}

fn rounded(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Where telemetry goes. Implementations must tolerate the publisher
/// calling them back-to-back for every device in the fleet.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish(&self, message: &TelemetryMessage) -> Result<()>;
}

/// Emits telemetry as structured log events under the `telemetry` target.
pub struct LogSink;

#[async_trait]
impl TelemetrySink for LogSink {
    async fn publish(&self, message: &TelemetryMessage) -> Result<()> {
        info!(
            target: "telemetry",
            device_id = %message.device_id,
            power_state = message.power_state,
            power_w = message.energy.power,
            voltage_v = message.energy.voltage,
            current_a = message.energy.current,
            total_kwh = message.energy.total,
            "telemetry report"
        );
        Ok(())
    }
}

/// Collects messages in memory for inspection.
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<TelemetryMessage>>,
}

impl MemorySink {
    pub fn messages(&self) -> Vec<TelemetryMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn publish(&self, message: &TelemetryMessage) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

/// Background publisher loop: one fleet sweep per tick.
pub fn spawn_telemetry_publisher(
    engine: Arc<PowerEngine>,
    sink: Arc<dyn TelemetrySink>,
    interval_seconds: u64,
) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
        loop {
            interval.tick().await;
            publish_fleet(&engine, sink.as_ref()).await;
        }
    });
}

/// Snapshot and publish every registered device once. Sink failures are
/// logged per device and never abort the sweep.
pub async fn publish_fleet(engine: &PowerEngine, sink: &dyn TelemetrySink) {
    for device_id in engine.device_ids() {
        let reading = match engine.get_power_consumption(&device_id) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(device_id, error = %e, "skipping telemetry for device");
                continue;
            }
        };
        let message = TelemetryMessage::from_reading(&reading);
        if let Err(e) = sink.publish(&message).await {
            warn!(device_id, error = %e, "telemetry publish failed");
        }
    }
}
