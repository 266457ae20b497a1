//! # Assignment Resolver
//!
//! Maps a device identifier, plus optional explicit hints from the caller,
//! onto a catalog profile. Resolution is deterministic: the same inputs
//! against the same catalog always pick the same profile. Hints are strict
//! and fail loudly; hint-free resolution is a best-effort classification
//! that always lands somewhere, with generic electronics as the final net.

use std::sync::Arc;

use tracing::debug;

use super::catalog::{DeviceCategory, PowerProfile, ProfileCatalog};
use super::error::EngineError;

/// One row of the inference table: identifier substrings that select a
/// category, name refinements inside it, and the profile an unrefined hit
/// falls back to.
struct CategoryRule {
    category: DeviceCategory,
    /// Any of these substrings in the lowercased identifier selects the row.
    keywords: &'static [&'static str],
    /// First refinement whose keywords hit names the profile.
    refinements: &'static [(&'static [&'static str], &'static str)],
    /// Profile for hits no refinement claims. `None` = category default.
    unrefined: Option<&'static str>,
}

/// Row order is load-bearing: a "fan_heater" is a heater, not a fan,
/// because the heating row is scanned before the motor row.
const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: DeviceCategory::Lighting,
        keywords: &["lamp", "light", "beleuchtung", "led", "bulb"],
        refinements: &[
            (&["led", "smart"], "Smart Lampe"),
            (&["halogen"], "Halogen Lampe"),
        ],
        unrefined: Some("LED Lampe"),
    },
    CategoryRule {
        category: DeviceCategory::Heating,
        keywords: &["heater", "heizung", "radiator", "heating"],
        refinements: &[
            (&["lüfter", "fan"], "Heizlüfter"),
            (&["infrarot", "infrared"], "Infrarotheizer"),
        ],
        unrefined: Some("Heizkörper"),
    },
    CategoryRule {
        category: DeviceCategory::ApplianceSmall,
        keywords: &["coffee", "kaffee", "toaster", "kettle", "wasserkocher"],
        refinements: &[
            (&["coffee", "kaffee"], "Kaffeemaschine"),
            (&["kettle", "wasserkocher"], "Wasserkocher"),
        ],
        unrefined: Some("Toaster"),
    },
    CategoryRule {
        category: DeviceCategory::ApplianceLarge,
        keywords: &[
            "microwave",
            "mikrowelle",
            "fridge",
            "kühlschrank",
            "dishwasher",
            "geschirrspüler",
        ],
        refinements: &[
            (&["microwave", "mikrowelle"], "Mikrowelle"),
            (&["fridge", "kühlschrank"], "Kühlschrank"),
        ],
        unrefined: Some("Geschirrspüler"),
    },
    CategoryRule {
        category: DeviceCategory::Electronics,
        keywords: &["tv", "computer", "pc", "monitor", "router", "modem"],
        refinements: &[
            (&["tv", "fernseher"], "TV LED"),
            (&["computer", "pc", "desktop"], "Computer Desktop"),
            (&["router", "modem"], "Router/Modem"),
        ],
        unrefined: None,
    },
    CategoryRule {
        category: DeviceCategory::Motor,
        keywords: &[
            "washing",
            "waschmaschine",
            "vacuum",
            "staubsauger",
            "fan",
            "ventilator",
        ],
        refinements: &[
            (&["washing", "waschmaschine"], "Waschmaschine"),
            (&["vacuum", "staubsauger"], "Staubsauger"),
        ],
        unrefined: Some("Ventilator"),
    },
    CategoryRule {
        category: DeviceCategory::AlwaysOn,
        keywords: &["camera", "kamera", "hub", "sensor"],
        refinements: &[(&["camera", "kamera"], "Überwachungskamera")],
        unrefined: Some("Smart Hub"),
    },
];

/// Picks profiles for devices. Holds a shared handle to the catalog it
/// resolves against; swapping catalogs means building a new resolver.
#[derive(Debug, Clone)]
pub struct AssignmentResolver {
    catalog: Arc<ProfileCatalog>,
}

impl AssignmentResolver {
    pub fn new(catalog: Arc<ProfileCatalog>) -> Self {
        Self { catalog }
    }

    /// Resolve a device identifier to a profile.
    ///
    /// An explicit `name` must exist in the catalog (`ProfileNotFound`
    /// otherwise) and wins over everything else. An explicit `category`
    /// picks that category's first profile by declaration order
    /// (`CategoryHasNoProfiles` if the catalog has none). Without hints the
    /// keyword table classifies the identifier; identifiers it cannot place
    /// resolve to generic electronics.
    pub fn resolve(
        &self,
        device_id: &str,
        name: Option<&str>,
        category: Option<DeviceCategory>,
    ) -> Result<Arc<PowerProfile>, EngineError> {
        if let Some(name) = name {
            return self
                .catalog
                .find_by_name(name)
                .ok_or_else(|| EngineError::ProfileNotFound(name.to_string()));
        }
        if let Some(category) = category {
            return self
                .catalog
                .category_default(category)
                .ok_or(EngineError::CategoryHasNoProfiles(category));
        }

        let id = device_id.to_lowercase();
        for rule in CATEGORY_RULES {
            if !rule.keywords.iter().any(|kw| id.contains(kw)) {
                continue;
            }
            let refined = rule
                .refinements
                .iter()
                .find(|(kws, _)| kws.iter().any(|kw| id.contains(kw)))
                .map(|(_, profile)| *profile)
                .or(rule.unrefined);
            if let Some(profile) = refined.and_then(|n| self.catalog.find_by_name(n)) {
                debug!(device_id, profile = %profile.name, "inferred profile from identifier");
                return Ok(profile);
            }
            // Custom catalog without the refined name: stay in the category
            // if it has anything at all, otherwise keep scanning.
            if let Some(profile) = self.catalog.category_default(rule.category) {
                debug!(device_id, profile = %profile.name, "inferred category default");
                return Ok(profile);
            }
        }
        self.generic_fallback(&id)
    }

    /// Final net for identifiers the table cannot place: generic
    /// electronics, or the catalog's first profile if a custom catalog
    /// carries no electronics at all.
    fn generic_fallback(&self, device_id: &str) -> Result<Arc<PowerProfile>, EngineError> {
        let profile = self
            .catalog
            .category_default(DeviceCategory::Electronics)
            .or_else(|| self.catalog.profiles().first().cloned())
            .ok_or(EngineError::CategoryHasNoProfiles(DeviceCategory::Electronics))?;
        debug!(device_id, profile = %profile.name, "no keyword match, using fallback profile");
        Ok(profile)
    }
}
