//! # Power Profile Catalog
//!
//! Static registry of consumption profiles grouped by device category. The
//! catalog is built once at process start (from the built-in defaults or a
//! TOML file), validated, and then shared read-only with the engine -- there
//! is no runtime mutation of profiles.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

use super::error::EngineError;

/// Behavioral category of a simulated device.
///
/// Categories partition the consumption rules: each category gets its own
/// time-of-day curve and seasonal response in the consumption model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeviceCategory {
    Lighting,
    Heating,
    ApplianceSmall,
    ApplianceLarge,
    Electronics,
    Motor,
    AlwaysOn,
}

/// Consumption template for a class of physical device.
///
/// Invariants (checked by [`ProfileCatalog::new`]):
/// `0 <= standby_watts <= base_watts_min <= base_watts_max`,
/// `variation_factor` in `[0, 1]`, `cycle_minutes` positive when present,
/// `duty_fraction` in `(0, 1]` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerProfile {
    pub category: DeviceCategory,
    /// Human label, unique within the catalog (case-insensitive).
    pub name: String,
    /// Minimum operating power when ON, in watts.
    pub base_watts_min: f64,
    /// Maximum operating power when ON, in watts.
    pub base_watts_max: f64,
    /// Draw while logically OFF, in watts.
    pub standby_watts: f64,
    /// Fractional jitter amplitude around the operating midpoint (0.0-1.0).
    #[serde(default = "default_variation_factor")]
    pub variation_factor: f64,
    /// Oscillation period for devices that burst within the ON state
    /// (compressors, thermostat-driven heaters). `None` = steady draw.
    #[serde(default)]
    pub cycle_minutes: Option<f64>,
    /// Per-profile override of the active fraction of a cycle window.
    /// `None` falls back to the engine tuning default.
    #[serde(default)]
    pub duty_fraction: Option<f64>,
    /// Whether the category's daily curve modulates this profile.
    #[serde(default = "default_true")]
    pub time_of_day_enabled: bool,
    /// Whether the category's seasonal factor modulates this profile.
    #[serde(default)]
    pub seasonal_enabled: bool,
    #[serde(default)]
    pub description: String,
}

fn default_variation_factor() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

impl PowerProfile {
    fn new(
        category: DeviceCategory,
        name: &str,
        base_watts_min: f64,
        base_watts_max: f64,
        standby_watts: f64,
    ) -> Self {
        Self {
            category,
            name: name.to_string(),
            base_watts_min,
            base_watts_max,
            standby_watts,
            variation_factor: default_variation_factor(),
            cycle_minutes: None,
            duty_fraction: None,
            time_of_day_enabled: true,
            seasonal_enabled: false,
            description: String::new(),
        }
    }

    fn variation(mut self, factor: f64) -> Self {
        self.variation_factor = factor;
        self
    }

    fn cycle(mut self, minutes: f64) -> Self {
        self.cycle_minutes = Some(minutes);
        self
    }

    fn seasonal(mut self) -> Self {
        self.seasonal_enabled = true;
        self
    }

    fn describe(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    /// Midpoint of the operating range, in watts.
    pub fn midpoint_watts(&self) -> f64 {
        (self.base_watts_min + self.base_watts_max) / 2.0
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid_profile("<unnamed>", "empty name"));
        }
        if self.base_watts_min < 0.0 || self.base_watts_max < 0.0 {
            return Err(EngineError::invalid_profile(
                &self.name,
                "negative operating power",
            ));
        }
        if self.base_watts_min > self.base_watts_max {
            return Err(EngineError::invalid_profile(
                &self.name,
                format!(
                    "base_watts_min {} exceeds base_watts_max {}",
                    self.base_watts_min, self.base_watts_max
                ),
            ));
        }
        if self.standby_watts < 0.0 || self.standby_watts > self.base_watts_min {
            return Err(EngineError::invalid_profile(
                &self.name,
                format!(
                    "standby_watts {} outside [0, base_watts_min {}]",
                    self.standby_watts, self.base_watts_min
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.variation_factor) {
            return Err(EngineError::invalid_profile(
                &self.name,
                format!("variation_factor {} outside [0, 1]", self.variation_factor),
            ));
        }
        if let Some(minutes) = self.cycle_minutes {
            if minutes <= 0.0 {
                return Err(EngineError::invalid_profile(
                    &self.name,
                    format!("non-positive cycle_minutes {minutes}"),
                ));
            }
        }
        if let Some(duty) = self.duty_fraction {
            if !(duty > 0.0 && duty <= 1.0) {
                return Err(EngineError::invalid_profile(
                    &self.name,
                    format!("duty_fraction {duty} outside (0, 1]"),
                ));
            }
        }
        Ok(())
    }
}

/// Immutable, validated collection of power profiles.
///
/// Constructed once and passed into the engine (no process-wide singleton),
/// so tests can supply custom catalogs.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    profiles: Vec<Arc<PowerProfile>>,
}

impl ProfileCatalog {
    /// Build a catalog from profile definitions, enforcing the per-profile
    /// invariants and name uniqueness. Declaration order is preserved and is
    /// the order used by the resolver for category defaults.
    pub fn new(profiles: Vec<PowerProfile>) -> Result<Self, EngineError> {
        for profile in &profiles {
            profile.validate()?;
        }
        for (i, profile) in profiles.iter().enumerate() {
            if profiles[..i]
                .iter()
                .any(|p| p.name.eq_ignore_ascii_case(&profile.name))
            {
                return Err(EngineError::invalid_profile(
                    &profile.name,
                    "duplicate profile name",
                ));
            }
        }
        Ok(Self {
            profiles: profiles.into_iter().map(Arc::new).collect(),
        })
    }

    /// The built-in catalog: the stock set of household devices shipped with
    /// the simulator.
    pub fn builtin() -> Self {
        Self::new(builtin_profiles()).expect("built-in profile catalog is valid")
    }

    /// All profiles in declaration order.
    pub fn profiles(&self) -> &[Arc<PowerProfile>] {
        &self.profiles
    }

    /// Look up a profile by name (case-insensitive).
    pub fn find_by_name(&self, name: &str) -> Option<Arc<PowerProfile>> {
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Profiles of one category, in declaration order.
    pub fn in_category(&self, category: DeviceCategory) -> Vec<Arc<PowerProfile>> {
        self.profiles
            .iter()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }

    /// First profile of a category -- the category's default assignment.
    pub fn category_default(&self, category: DeviceCategory) -> Option<Arc<PowerProfile>> {
        self.profiles
            .iter()
            .find(|p| p.category == category)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// The stock profile set: typical European household devices with measured
/// watt ranges. Heating devices cycle with their thermostats; the fridge
/// cycles with its compressor; the fan is a summer device.
fn builtin_profiles() -> Vec<PowerProfile> {
    use DeviceCategory::*;

    vec![
        // Lighting
        PowerProfile::new(Lighting, "LED Lampe", 8.0, 15.0, 0.2)
            .variation(0.05)
            .describe("Moderne LED-Beleuchtung"),
        PowerProfile::new(Lighting, "Halogen Lampe", 35.0, 50.0, 0.5)
            .variation(0.03)
            .describe("Traditionelle Halogenbeleuchtung"),
        PowerProfile::new(Lighting, "Smart Lampe", 6.0, 18.0, 1.5)
            .variation(0.15)
            .describe("Intelligente dimmbare LED-Lampe"),
        // Heating
        PowerProfile::new(Heating, "Heizlüfter", 1200.0, 2000.0, 2.0)
            .variation(0.2)
            .cycle(15.0)
            .seasonal()
            .describe("Elektrischer Heizlüfter"),
        PowerProfile::new(Heating, "Heizkörper", 800.0, 1500.0, 1.5)
            .variation(0.25)
            .cycle(20.0)
            .seasonal()
            .describe("Elektrischer Radiator"),
        PowerProfile::new(Heating, "Infrarotheizer", 600.0, 1200.0, 1.0)
            .variation(0.15)
            .cycle(25.0)
            .seasonal()
            .describe("Infrarot-Heizpanel"),
        // Small appliances
        PowerProfile::new(ApplianceSmall, "Kaffeemaschine", 800.0, 1200.0, 2.5)
            .variation(0.3)
            .describe("Filterkaffeemaschine"),
        PowerProfile::new(ApplianceSmall, "Wasserkocher", 1800.0, 2200.0, 0.8)
            .variation(0.1)
            .describe("Elektrischer Wasserkocher"),
        PowerProfile::new(ApplianceSmall, "Toaster", 800.0, 1400.0, 1.2)
            .variation(0.2)
            .describe("2-Scheiben Toaster"),
        // Large appliances
        PowerProfile::new(ApplianceLarge, "Mikrowelle", 1000.0, 1500.0, 3.0)
            .variation(0.2)
            .describe("Mikrowellenherd"),
        PowerProfile::new(ApplianceLarge, "Kühlschrank", 120.0, 200.0, 5.0)
            .variation(0.3)
            .cycle(45.0)
            .describe("Kühl-Gefrierkombination"),
        PowerProfile::new(ApplianceLarge, "Geschirrspüler", 1800.0, 2200.0, 4.0)
            .variation(0.4)
            .describe("Vollintegrierbarer Geschirrspüler"),
        // Electronics
        PowerProfile::new(Electronics, "TV LED", 80.0, 150.0, 0.8)
            .variation(0.2)
            .describe("LED-Fernseher 55 Zoll"),
        PowerProfile::new(Electronics, "Computer Desktop", 200.0, 400.0, 8.0)
            .variation(0.4)
            .describe("Desktop-PC mit Monitor"),
        PowerProfile::new(Electronics, "Router/Modem", 8.0, 15.0, 8.0)
            .variation(0.1)
            .describe("WLAN-Router"),
        // Motors
        PowerProfile::new(Motor, "Waschmaschine", 1800.0, 2500.0, 2.5)
            .variation(0.5)
            .describe("Frontlader-Waschmaschine"),
        PowerProfile::new(Motor, "Staubsauger", 1200.0, 1800.0, 1.0)
            .variation(0.3)
            .describe("Bodenstaubsauger"),
        PowerProfile::new(Motor, "Ventilator", 25.0, 75.0, 0.5)
            .variation(0.2)
            .seasonal()
            .describe("Deckenventilator"),
        // Always on
        PowerProfile::new(AlwaysOn, "Überwachungskamera", 3.0, 8.0, 3.0)
            .variation(0.1)
            .describe("IP-Überwachungskamera"),
        PowerProfile::new(AlwaysOn, "Smart Hub", 2.0, 5.0, 2.0)
            .variation(0.05)
            .describe("Smart Home Hub"),
    ]
}
