//! # Power Engine
//!
//! The simulation core behind every adapter: a registry of simulated plug
//! devices, each bound to a [`PowerProfile`], with an energy ledger that
//! advances whenever the device is observed or switched.
//!
//! Concurrency model: a read-write locked map of per-device records, each
//! behind its own mutex. The map lock is held only for lookup and insert;
//! all per-device work happens under that device's lock, so devices never
//! contend with each other. Engine operations are synchronous and CPU-only,
//! safe to call from async adapters without spawning.
//!
//! Every time-dependent operation has an `*_at` sibling taking an explicit
//! timestamp; the plain form passes the local wall clock. The `*_at` forms
//! are the deterministic seam the test suites drive.

pub mod catalog;
pub mod consumption;
pub mod error;
pub mod resolver;

pub use catalog::{DeviceCategory, PowerProfile, ProfileCatalog};
pub use consumption::ModelTuning;
pub use error::EngineError;
pub use resolver::AssignmentResolver;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use consumption::{instantaneous_watts, sample_voltage};

/// Per-device simulation state. Lives behind its own mutex inside the
/// engine's device map.
struct DeviceRecord {
    profile: Arc<PowerProfile>,
    power_on: bool,
    /// Accumulated consumption in watt-hours. Never decreases.
    energy_wh: f64,
    /// Draw sampled at `last_update`, carried forward by the ledger until
    /// the next observation.
    last_instant_watts: f64,
    last_update: NaiveDateTime,
    rng: StdRng,
}

impl DeviceRecord {
    fn new(profile: Arc<PowerProfile>, rng: StdRng, at: NaiveDateTime) -> Self {
        // New devices start switched off, drawing standby.
        let last_instant_watts = profile.standby_watts;
        Self {
            profile,
            power_on: false,
            energy_wh: 0.0,
            last_instant_watts,
            last_update: at,
            rng,
        }
    }

    /// Roll the energy ledger forward to `at` at the previously sampled
    /// draw. Out-of-order timestamps integrate as zero elapsed time; the
    /// ledger clock never rewinds.
    fn settle(&mut self, at: NaiveDateTime) {
        if at <= self.last_update {
            return;
        }
        let elapsed_hours = (at - self.last_update).num_seconds() as f64 / 3600.0;
        self.energy_wh += self.last_instant_watts * elapsed_hours;
        self.last_update = at;
    }

    /// Sample a fresh draw for the current state at `at`.
    fn resample(&mut self, at: NaiveDateTime, tuning: &ModelTuning) {
        self.last_instant_watts =
            instantaneous_watts(&self.profile, self.power_on, at, tuning, &mut self.rng);
    }
}

/// Point-in-time consumption snapshot of one device.
#[derive(Debug, Clone, Serialize)]
pub struct PowerReading {
    pub device_id: String,
    pub power_on: bool,
    /// Instantaneous draw in watts.
    pub watts: f64,
    /// Sampled mains voltage in volts.
    pub voltage: f64,
    /// Derived current in amperes (`watts / voltage`).
    pub current_amps: f64,
    /// Accumulated consumption in watt-hours since registration.
    pub energy_wh: f64,
    pub timestamp: NaiveDateTime,
}

/// Administrative view of one device. Produced without touching the
/// ledger or the RNG.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub profile_name: String,
    pub category: DeviceCategory,
    pub power_on: bool,
    /// Draw at the last observation, in watts.
    pub last_watts: f64,
    pub energy_wh: f64,
    pub last_update: NaiveDateTime,
}

/// Facade over catalog, resolver, consumption model and device state.
///
/// `assign_profile` is the only operation that registers a device; every
/// other operation fails with [`EngineError::DeviceNotFound`] for unknown
/// identifiers.
pub struct PowerEngine {
    catalog: Arc<ProfileCatalog>,
    resolver: AssignmentResolver,
    tuning: ModelTuning,
    random_seed: Option<u64>,
    devices: RwLock<HashMap<String, Arc<Mutex<DeviceRecord>>>>,
}

impl PowerEngine {
    pub fn new(catalog: ProfileCatalog) -> Self {
        let catalog = Arc::new(catalog);
        Self {
            resolver: AssignmentResolver::new(Arc::clone(&catalog)),
            catalog,
            tuning: ModelTuning::default(),
            random_seed: None,
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_tuning(mut self, tuning: ModelTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Seed device RNGs deterministically. Each device derives its own
    /// stream from this seed and its identifier, so readings are
    /// reproducible per device regardless of registration order.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    pub fn tuning(&self) -> &ModelTuning {
        &self.tuning
    }

    /// Register `device_id` or rebind an existing registration.
    ///
    /// Resolution follows [`AssignmentResolver::resolve`]. First
    /// registration starts the device switched off with an empty ledger.
    /// Rebinding settles the ledger at the old profile's draw, then keeps
    /// both the accumulated energy and the switch state.
    pub fn assign_profile(
        &self,
        device_id: &str,
        name: Option<&str>,
        category: Option<DeviceCategory>,
    ) -> Result<Arc<PowerProfile>, EngineError> {
        self.assign_profile_at(device_id, name, category, Local::now().naive_local())
    }

    pub fn assign_profile_at(
        &self,
        device_id: &str,
        name: Option<&str>,
        category: Option<DeviceCategory>,
        at: NaiveDateTime,
    ) -> Result<Arc<PowerProfile>, EngineError> {
        let profile = self.resolver.resolve(device_id, name, category)?;

        let existing = self.devices.read().get(device_id).cloned();
        match existing {
            Some(record) => {
                let mut record = record.lock();
                record.settle(at);
                record.profile = Arc::clone(&profile);
                record.resample(at, &self.tuning);
            }
            None => {
                let record = DeviceRecord::new(Arc::clone(&profile), self.device_rng(device_id), at);
                self.devices
                    .write()
                    .entry(device_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(record)));
            }
        }

        info!(
            device_id,
            profile = %profile.name,
            category = %profile.category,
            "assigned power profile"
        );
        Ok(profile)
    }

    /// Switch a device on or off and return its new instantaneous draw in
    /// watts. The ledger is settled at the old draw before the flip.
    pub fn set_power_state(&self, device_id: &str, power_on: bool) -> Result<f64, EngineError> {
        self.set_power_state_at(device_id, power_on, Local::now().naive_local())
    }

    pub fn set_power_state_at(
        &self,
        device_id: &str,
        power_on: bool,
        at: NaiveDateTime,
    ) -> Result<f64, EngineError> {
        let record = self.lookup(device_id)?;
        let mut record = record.lock();
        record.settle(at);
        record.power_on = power_on;
        record.resample(at, &self.tuning);
        debug!(device_id, power_on, watts = record.last_instant_watts, "switched power state");
        Ok(record.last_instant_watts)
    }

    /// Flip the switch state atomically and return the new state with its
    /// draw. Equivalent to read-then-set, but under one device lock.
    pub fn toggle_power_state(&self, device_id: &str) -> Result<(bool, f64), EngineError> {
        self.toggle_power_state_at(device_id, Local::now().naive_local())
    }

    pub fn toggle_power_state_at(
        &self,
        device_id: &str,
        at: NaiveDateTime,
    ) -> Result<(bool, f64), EngineError> {
        let record = self.lookup(device_id)?;
        let mut record = record.lock();
        record.settle(at);
        record.power_on = !record.power_on;
        record.resample(at, &self.tuning);
        debug!(
            device_id,
            power_on = record.power_on,
            watts = record.last_instant_watts,
            "toggled power state"
        );
        Ok((record.power_on, record.last_instant_watts))
    }

    /// Observe a device: settle the ledger, sample a fresh draw and
    /// voltage, and return the snapshot.
    pub fn get_power_consumption(&self, device_id: &str) -> Result<PowerReading, EngineError> {
        self.get_power_consumption_at(device_id, Local::now().naive_local())
    }

    pub fn get_power_consumption_at(
        &self,
        device_id: &str,
        at: NaiveDateTime,
    ) -> Result<PowerReading, EngineError> {
        let record = self.lookup(device_id)?;
        let mut record = record.lock();
        record.settle(at);
        record.resample(at, &self.tuning);
        let voltage = sample_voltage(&self.tuning, &mut record.rng);
        let watts = record.last_instant_watts;
        let current_amps = if voltage > 0.0 { watts / voltage } else { 0.0 };
        Ok(PowerReading {
            device_id: device_id.to_string(),
            power_on: record.power_on,
            watts,
            voltage,
            current_amps,
            energy_wh: record.energy_wh,
            timestamp: at,
        })
    }

    /// Inspect a device without advancing the ledger or consuming
    /// randomness. Repeated calls return identical snapshots until some
    /// other operation intervenes.
    pub fn get_device_info(&self, device_id: &str) -> Result<DeviceInfo, EngineError> {
        let record = self.lookup(device_id)?;
        let record = record.lock();
        Ok(DeviceInfo {
            device_id: device_id.to_string(),
            profile_name: record.profile.name.clone(),
            category: record.profile.category,
            power_on: record.power_on,
            last_watts: record.last_instant_watts,
            energy_wh: record.energy_wh,
            last_update: record.last_update,
        })
    }

    /// Profile a device is currently bound to.
    pub fn device_profile(&self, device_id: &str) -> Result<Arc<PowerProfile>, EngineError> {
        let record = self.lookup(device_id)?;
        let record = record.lock();
        Ok(Arc::clone(&record.profile))
    }

    /// Registered device identifiers, sorted for stable iteration.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lookup(&self, device_id: &str) -> Result<Arc<Mutex<DeviceRecord>>, EngineError> {
        self.devices
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| EngineError::DeviceNotFound(device_id.to_string()))
    }

    /// Per-device RNG: derived from the engine seed and the identifier so
    /// two devices never share a stream, or from entropy when unseeded.
    fn device_rng(&self, device_id: &str) -> StdRng {
        match self.random_seed {
            Some(base) => {
                let mut hasher = DefaultHasher::new();
                device_id.hash(&mut hasher);
                StdRng::seed_from_u64(base.wrapping_add(hasher.finish()))
            }
            None => StdRng::from_entropy(),
        }
    }
}

impl Default for PowerEngine {
    fn default() -> Self {
        Self::new(ProfileCatalog::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::consumption::seasonal_multiplier;
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn seeded_engine() -> PowerEngine {
        PowerEngine::default().with_random_seed(42)
    }

    /// Catalog with a single constant-draw profile, for exact ledger math.
    fn constant_load_engine() -> PowerEngine {
        let profiles: Vec<PowerProfile> = serde_json::from_value(serde_json::json!([
            {
                "category": "electronics",
                "name": "Konstantlast",
                "base_watts_min": 100.0,
                "base_watts_max": 100.0,
                "standby_watts": 1.0,
                "variation_factor": 0.0,
                "time_of_day_enabled": false
            }
        ]))
        .unwrap();
        PowerEngine::new(ProfileCatalog::new(profiles).unwrap()).with_random_seed(1)
    }

    #[test]
    fn test_assign_registers_device_switched_off() {
        let engine = seeded_engine();
        let t0 = at(2024, 3, 1, 8, 0);
        let profile = engine
            .assign_profile_at("tv_livingroom", None, None, t0)
            .unwrap();
        assert_eq!(profile.name, "TV LED");

        let info = engine.get_device_info("tv_livingroom").unwrap();
        assert!(!info.power_on);
        assert_eq!(info.energy_wh, 0.0);
        assert_eq!(info.last_watts, profile.standby_watts);
        assert_eq!(info.last_update, t0);
    }

    #[test]
    fn test_rebind_preserves_ledger_and_switch_state() {
        let engine = constant_load_engine();
        let t0 = at(2024, 3, 1, 8, 0);
        engine.assign_profile_at("plug_01", None, None, t0).unwrap();
        engine
            .set_power_state_at("plug_01", true, t0)
            .unwrap();

        // One hour at 100 W.
        let t1 = at(2024, 3, 1, 9, 0);
        let reading = engine.get_power_consumption_at("plug_01", t1).unwrap();
        assert!((reading.energy_wh - 100.0).abs() < 1e-6);

        // Rebind to the same profile by explicit name: nothing resets.
        engine
            .assign_profile_at("plug_01", Some("Konstantlast"), None, t1)
            .unwrap();
        let info = engine.get_device_info("plug_01").unwrap();
        assert!(info.power_on);
        assert!((info.energy_wh - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_set_power_state_on_unknown_device_fails() {
        let engine = seeded_engine();
        let err = engine
            .set_power_state_at("ghost_plug", true, at(2024, 1, 1, 0, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::DeviceNotFound(id) if id == "ghost_plug"));
    }

    #[test]
    fn test_get_device_info_on_unknown_device_fails() {
        let engine = seeded_engine();
        let err = engine.get_device_info("ghost_plug").unwrap_err();
        assert!(matches!(err, EngineError::DeviceNotFound(_)));
    }

    #[test]
    fn test_energy_is_watts_times_hours() {
        let engine = constant_load_engine();
        let t0 = at(2024, 3, 1, 8, 0);
        engine.assign_profile_at("plug_01", None, None, t0).unwrap();

        let watts = engine.set_power_state_at("plug_01", true, t0).unwrap();
        assert!((watts - 100.0).abs() < 1e-9);

        // 30 minutes at 100 W = 50 Wh.
        let r1 = engine
            .get_power_consumption_at("plug_01", at(2024, 3, 1, 8, 30))
            .unwrap();
        assert!((r1.energy_wh - 50.0).abs() < 1e-6);

        // Another 90 minutes at 100 W, then off.
        engine
            .set_power_state_at("plug_01", false, at(2024, 3, 1, 10, 0))
            .unwrap();
        // Two hours of 1 W standby on top.
        let r2 = engine
            .get_power_consumption_at("plug_01", at(2024, 3, 1, 12, 0))
            .unwrap();
        assert!((r2.energy_wh - (50.0 + 150.0 + 2.0)).abs() < 1e-6);
        assert!(!r2.power_on);
        assert!((r2.watts - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ledger_never_decreases_under_interleaved_ops() {
        let engine = seeded_engine();
        let t0 = at(2024, 6, 1, 0, 0);
        engine
            .assign_profile_at("fridge_cellar", None, None, t0)
            .unwrap();

        let mut last_energy = 0.0;
        for step in 1..=48u32 {
            let t = t0 + chrono::Duration::minutes(step as i64 * 10);
            if step % 5 == 0 {
                engine
                    .set_power_state_at("fridge_cellar", step % 2 == 0, t)
                    .unwrap();
            }
            let reading = engine.get_power_consumption_at("fridge_cellar", t).unwrap();
            assert!(
                reading.energy_wh >= last_energy,
                "ledger went backwards at step {step}"
            );
            last_energy = reading.energy_wh;
        }
    }

    #[test]
    fn test_device_info_is_pure() {
        let engine = seeded_engine();
        engine
            .assign_profile_at("camera_front_door", None, None, at(2024, 2, 1, 12, 0))
            .unwrap();

        let first = engine.get_device_info("camera_front_door").unwrap();
        let second = engine.get_device_info("camera_front_door").unwrap();
        assert_eq!(first.energy_wh, second.energy_wh);
        assert_eq!(first.last_watts, second.last_watts);
        assert_eq!(first.last_update, second.last_update);
    }

    #[test]
    fn test_fan_heater_draws_winter_scaled_heating_power() {
        let engine = seeded_engine();
        // Epoch minute count divisible by 15: the profile's cycle is in its
        // active stretch at this instant.
        let noon_in_december = at(2024, 12, 15, 12, 0);
        let profile = engine
            .assign_profile_at("fan_heater_kitchen", None, None, noon_in_december)
            .unwrap();
        assert_eq!(profile.name, "Heizlüfter");

        engine
            .set_power_state_at("fan_heater_kitchen", true, noon_in_december)
            .unwrap();
        let reading = engine
            .get_power_consumption_at("fan_heater_kitchen", noon_in_december)
            .unwrap();

        let winter = seasonal_multiplier(DeviceCategory::Heating, 12);
        assert!(reading.watts >= profile.base_watts_min * winter - 1e-9);
        assert!(reading.watts <= profile.base_watts_max * winter + 1e-9);
        assert!(reading.power_on);
        assert!(reading.voltage >= 225.0 && reading.voltage <= 235.0);
        let expected_current = reading.watts / reading.voltage;
        assert!((reading.current_amps - expected_current).abs() < 1e-9);
    }

    #[test]
    fn test_toggle_flips_state_and_reports_draw() {
        let engine = seeded_engine();
        let t0 = at(2024, 5, 1, 10, 0);
        engine.assign_profile_at("plug_01", None, None, t0).unwrap();

        let (on, watts_on) = engine.toggle_power_state_at("plug_01", t0).unwrap();
        assert!(on);
        assert!(watts_on > 0.0);

        let (off, watts_off) = engine
            .toggle_power_state_at("plug_01", at(2024, 5, 1, 10, 5))
            .unwrap();
        assert!(!off);
        let profile = engine.catalog().find_by_name("TV LED").unwrap();
        assert_eq!(watts_off, profile.standby_watts);
    }

    #[test]
    fn test_device_ids_are_sorted() {
        let engine = seeded_engine();
        let t0 = at(2024, 1, 1, 0, 0);
        for id in ["zulu_plug", "alpha_plug", "mike_plug"] {
            engine.assign_profile_at(id, None, None, t0).unwrap();
        }
        assert_eq!(
            engine.device_ids(),
            vec!["alpha_plug", "mike_plug", "zulu_plug"]
        );
    }

    #[test]
    fn test_seeded_engines_reproduce_readings() {
        let t0 = at(2024, 7, 1, 15, 0);
        let t1 = at(2024, 7, 1, 15, 30);
        let mut readings = Vec::new();
        for _ in 0..2 {
            let engine = PowerEngine::default().with_random_seed(7);
            engine.assign_profile_at("tv_livingroom", None, None, t0).unwrap();
            engine.set_power_state_at("tv_livingroom", true, t0).unwrap();
            readings.push(engine.get_power_consumption_at("tv_livingroom", t1).unwrap());
        }
        assert_eq!(readings[0].watts, readings[1].watts);
        assert_eq!(readings[0].voltage, readings[1].voltage);
        assert_eq!(readings[0].energy_wh, readings[1].energy_wh);
    }

    proptest! {
        /// The ledger is monotone under arbitrary op sequences, including
        /// out-of-order timestamps.
        #[test]
        fn prop_ledger_is_monotone(
            offsets in proptest::collection::vec(0i64..10_000, 1..40),
            flips in proptest::collection::vec(any::<bool>(), 1..40),
        ) {
            let engine = seeded_engine();
            let t0 = at(2024, 1, 1, 0, 0);
            engine.assign_profile_at("washing_machine", None, None, t0).unwrap();

            let mut last_energy = 0.0;
            for (i, offset) in offsets.iter().enumerate() {
                let t = t0 + chrono::Duration::seconds(*offset);
                if i % 3 == 0 {
                    let on = flips[i % flips.len()];
                    engine.set_power_state_at("washing_machine", on, t).unwrap();
                }
                let reading = engine.get_power_consumption_at("washing_machine", t).unwrap();
                prop_assert!(reading.energy_wh >= last_energy);
                last_energy = reading.energy_wh;
            }
        }
    }
}
