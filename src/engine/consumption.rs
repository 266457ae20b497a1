//! # Consumption Model
//!
//! Pure functions that turn (profile, on/off state, wall-clock time) into an
//! instantaneous power draw. Randomness adds realism, never reproducibility:
//! repeated calls at the same timestamp may differ, but the result always
//! stays inside the profile's declared range scaled by the multiplier tables
//! below.
//!
//! The pipeline for a device that is ON:
//!
//! 1. base draw `b` = range midpoint + jitter bounded by `variation_factor`
//!    (so `b` never leaves `[base_watts_min, base_watts_max]`),
//! 2. times the category's daily curve (if `time_of_day_enabled`),
//! 3. times the category's seasonal factor (if `seasonal_enabled`),
//! 4. replaced by a reduced draw during the off stretch of the duty cycle
//!    (if `cycle_minutes` is set),
//! 5. clamped to >= 0.
//!
//! A device that is OFF draws exactly `standby_watts` -- no jitter, no
//! curves. The multiplier magnitudes are policy tables, not physics; edit
//! them here, in one place.

use chrono::{Datelike, NaiveDateTime, Timelike};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::catalog::{DeviceCategory, PowerProfile};

/// Engine-level tuning knobs for the consumption model.
///
/// These are deployment policy (configurable via `[tuning]` in the config
/// file), not per-call parameters. Profiles may override `duty_fraction`
/// individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTuning {
    /// Nominal mains voltage reported in reading snapshots, in volts.
    pub nominal_voltage_v: f64,
    /// Amplitude of the random voltage variation around nominal, in volts.
    pub voltage_jitter_v: f64,
    /// Active fraction of a cycle window for profiles without their own
    /// `duty_fraction` override.
    pub duty_fraction: f64,
    /// Fraction of the base draw that survives the inactive stretch of a
    /// cycle (compressor off, fan still running).
    pub cycle_residual_fraction: f64,
}

impl Default for ModelTuning {
    fn default() -> Self {
        Self {
            nominal_voltage_v: 230.0,
            voltage_jitter_v: 5.0,
            duty_fraction: 0.7,
            cycle_residual_fraction: 0.1,
        }
    }
}

/// Instantaneous draw of a device in watts at wall-clock time `at`.
///
/// Never negative. For `power_on == false` this is exactly
/// `profile.standby_watts` regardless of `at`.
pub fn instantaneous_watts<R: Rng>(
    profile: &PowerProfile,
    power_on: bool,
    at: NaiveDateTime,
    tuning: &ModelTuning,
    rng: &mut R,
) -> f64 {
    if !power_on {
        return profile.standby_watts;
    }

    let half_span = (profile.base_watts_max - profile.base_watts_min) / 2.0;
    let jitter = rng.gen_range(-1.0..=1.0) * profile.variation_factor * half_span;
    let base = profile.midpoint_watts() + jitter;

    let mut watts = base;
    if profile.time_of_day_enabled {
        watts *= time_of_day_multiplier(profile.category, at.hour());
    }
    if profile.seasonal_enabled {
        watts *= seasonal_multiplier(profile.category, at.month());
    }

    if let Some(cycle_minutes) = profile.cycle_minutes {
        let duty = profile.duty_fraction.unwrap_or(tuning.duty_fraction);
        if cycle_phase(at, cycle_minutes) >= duty {
            // Inactive stretch: thermostat satisfied, compressor off.
            watts = profile.standby_watts + tuning.cycle_residual_fraction * base;
        }
    }

    watts.max(0.0)
}

/// Mains voltage sample around nominal, in volts.
pub fn sample_voltage<R: Rng>(tuning: &ModelTuning, rng: &mut R) -> f64 {
    tuning.nominal_voltage_v + rng.gen_range(-1.0..=1.0) * tuning.voltage_jitter_v
}

/// Daily usage curve by category and local hour.
///
/// Hours outside the listed windows run at 1.0. Categories without a curve
/// (heating, large appliances, motors, always-on) are flat; their rhythm
/// comes from cycling and seasons instead.
pub fn time_of_day_multiplier(category: DeviceCategory, hour: u32) -> f64 {
    match category {
        DeviceCategory::Lighting => match hour {
            6..=8 | 17..=23 => 1.2, // morning routine and evenings
            0..=5 => 0.3,           // night
            _ => 0.7,               // daylight
        },
        DeviceCategory::ApplianceSmall => match hour {
            7 | 8 | 12 | 13 | 18 | 19 => 1.3, // meal times
            0..=6 => 0.2,                     // night
            _ => 1.0,
        },
        DeviceCategory::Electronics => match hour {
            18..=23 => 1.4, // evening entertainment
            9..=17 => 1.1,  // work hours
            0..=6 => 0.3,   // night
            _ => 1.0,
        },
        _ => 1.0,
    }
}

/// Seasonal factor by category and calendar month.
///
/// Heating peaks in winter and nearly vanishes in summer; fan-like loads
/// (motors, electronics with ventilation) run inversely.
pub fn seasonal_multiplier(category: DeviceCategory, month: u32) -> f64 {
    match category {
        DeviceCategory::Heating => match month {
            12 | 1 | 2 => 1.5, // winter
            3 | 11 => 1.2,     // shoulder season
            6..=8 => 0.3,      // summer
            _ => 1.0,
        },
        DeviceCategory::Motor | DeviceCategory::Electronics => match month {
            6..=8 => 1.4, // summer
            5 | 9 => 1.1, // late spring, early fall
            _ => 0.6,
        },
        _ => 1.0,
    }
}

/// Position inside the cycle window, in `[0, 1)`.
///
/// Derived from minutes since the epoch so the phase is a deterministic
/// function of wall-clock time, independent of when the device registered.
pub fn cycle_phase(at: NaiveDateTime, cycle_minutes: f64) -> f64 {
    let minutes = at.and_utc().timestamp() as f64 / 60.0;
    minutes.rem_euclid(cycle_minutes) / cycle_minutes
}

/// Smallest and largest daily multiplier a category can see, over all hours.
/// Lets tests bound on-state draws without duplicating the curve tables.
pub fn daily_multiplier_bounds(category: DeviceCategory) -> (f64, f64) {
    (0..24)
        .map(|hour| time_of_day_multiplier(category, hour))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| {
            (lo.min(m), hi.max(m))
        })
}

/// Smallest and largest seasonal multiplier a category can see, over all
/// months.
pub fn seasonal_multiplier_bounds(category: DeviceCategory) -> (f64, f64) {
    (1..=12)
        .map(|month| seasonal_multiplier(category, month))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), m| {
            (lo.min(m), hi.max(m))
        })
}
