use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::engine::{DeviceCategory, ModelTuning, PowerProfile, ProfileCatalog};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub tuning: ModelTuning,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}
impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub interval_seconds: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for reproducible consumption readings. Unset = entropy.
    pub random_seed: Option<u64>,
    /// TOML file replacing the built-in profile catalog.
    pub catalog_file: Option<PathBuf>,
    /// Switch a random subset of the fleet on at startup.
    pub randomize_initial_state: bool,
    /// Device registered when no `[[devices]]` entries are configured.
    pub default_device_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            random_seed: None,
            catalog_file: None,
            randomize_initial_state: false,
            default_device_id: "tasmota_sim_1".to_string(),
        }
    }
}

/// One simulated plug. `profile` and `category` are resolver hints; with
/// both omitted the identifier decides.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub id: String,
    pub name: Option<String>,
    pub profile: Option<String>,
    pub category: Option<DeviceCategory>,
}

impl DeviceSpec {
    pub fn friendly_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    profile: Vec<PowerProfile>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("TSIM__").split("__"));
        Ok(figment.extract()?)
    }

    /// Configured fleet, or the single default device when `[[devices]]`
    /// is absent.
    pub fn fleet(&self) -> Vec<DeviceSpec> {
        if self.devices.is_empty() {
            return vec![DeviceSpec {
                id: self.engine.default_device_id.clone(),
                name: None,
                profile: None,
                category: None,
            }];
        }
        self.devices.clone()
    }

    /// Device the Tasmota endpoints target when a request names none: the
    /// first configured one.
    pub fn primary_device_id(&self) -> String {
        self.devices
            .first()
            .map(|d| d.id.clone())
            .unwrap_or_else(|| self.engine.default_device_id.clone())
    }

    /// Profile catalog for the engine: the built-in set, or the file named
    /// by `engine.catalog_file` (TOML, `[[profile]]` tables).
    pub fn build_catalog(&self) -> Result<ProfileCatalog> {
        match &self.engine.catalog_file {
            None => Ok(ProfileCatalog::builtin()),
            Some(path) => load_catalog_file(path),
        }
    }
}

/// Parse a standalone catalog file into a validated catalog.
pub fn load_catalog_file(path: &Path) -> Result<ProfileCatalog> {
    let file: CatalogFile = Figment::new()
        .merge(Toml::file_exact(path))
        .extract()
        .with_context(|| format!("reading profile catalog {}", path.display()))?;
    Ok(ProfileCatalog::new(file.profile)?)
}
