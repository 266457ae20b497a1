//! # Administrative CLI
//!
//! Subcommands for operating the simulator. `serve` runs the HTTP adapter;
//! `profiles` and `resolve` answer locally from the catalog; `device`,
//! `power` and `assign` drive a running instance over HTTP.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config;
use crate::engine::{AssignmentResolver, DeviceCategory, ProfileCatalog};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Simulated Tasmota smart plugs with realistic power draw",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the simulator HTTP server (the default).
    Serve,
    /// List the power profile catalog.
    Profiles(CatalogOptions),
    /// Show which profile a device identifier would receive.
    Resolve(ResolveOptions),
    /// Show a device registered on a running instance.
    Device(DeviceOptions),
    /// Switch a device on a running instance.
    Power(PowerOptions),
    /// Register a device or rebind its profile on a running instance.
    Assign(AssignOptions),
}

/// Catalog source for the local commands.
#[derive(Debug, Args)]
pub struct CatalogOptions {
    /// Profile catalog TOML file. Defaults to the built-in catalog.
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ResolveOptions {
    /// Device identifier to resolve.
    pub device_id: String,
    /// Exact profile name, bypassing inference.
    #[arg(long)]
    pub profile: Option<String>,
    /// Category hint (snake_case, e.g. appliance_small).
    #[arg(long)]
    pub category: Option<DeviceCategory>,
    #[command(flatten)]
    pub catalog: CatalogOptions,
}

/// Target instance for the remote commands.
#[derive(Debug, Args)]
pub struct HostOptions {
    /// Base URL of the running simulator.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub host: String,
}

impl HostOptions {
    fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }
}

#[derive(Debug, Args)]
pub struct DeviceOptions {
    /// Device identifier.
    pub device_id: String,
    #[command(flatten)]
    pub host: HostOptions,
}

#[derive(Debug, Args)]
pub struct PowerOptions {
    /// One of: on, off, toggle.
    pub action: String,
    /// Target device. The server's primary device applies when omitted.
    #[arg(long)]
    pub device: Option<String>,
    #[command(flatten)]
    pub host: HostOptions,
}

#[derive(Debug, Args)]
pub struct AssignOptions {
    /// Device identifier to register or rebind.
    pub device_id: String,
    /// Exact profile name, bypassing inference.
    #[arg(long)]
    pub profile: Option<String>,
    /// Category hint (snake_case).
    #[arg(long)]
    pub category: Option<DeviceCategory>,
    #[command(flatten)]
    pub host: HostOptions,
}

/// Print the catalog, one profile per line.
pub fn profiles(options: CatalogOptions) -> Result<()> {
    let catalog = load_catalog(&options)?;
    for profile in catalog.profiles() {
        println!(
            "{:<22} {:<16} {:>6.0}-{:<6.0} W  standby {:>5.1} W  {}",
            profile.name,
            profile.category.to_string(),
            profile.base_watts_min,
            profile.base_watts_max,
            profile.standby_watts,
            profile.description
        );
    }
    Ok(())
}

/// Resolve a device identifier against the catalog without registering it.
pub fn resolve(options: ResolveOptions) -> Result<()> {
    let catalog = load_catalog(&options.catalog)?;
    let resolver = AssignmentResolver::new(Arc::new(catalog));
    let profile = resolver.resolve(
        &options.device_id,
        options.profile.as_deref(),
        options.category,
    )?;
    println!(
        "{} -> {} ({})",
        options.device_id, profile.name, profile.category
    );
    Ok(())
}

/// Fetch and print one device from a running instance.
pub async fn device(options: DeviceOptions) -> Result<()> {
    let url = format!("{}/devices/{}", options.host.base_url(), options.device_id);
    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;
    let info = read_json(response).await?;

    println!("Device:       {}", field_str(&info, "device_id"));
    println!(
        "Profile:      {} ({})",
        field_str(&info, "profile_name"),
        field_str(&info, "category")
    );
    println!(
        "Power State:  {}",
        if info["power_on"].as_bool().unwrap_or(false) {
            "ON"
        } else {
            "OFF"
        }
    );
    println!(
        "Last Draw:    {:.1} W",
        info["last_watts"].as_f64().unwrap_or(0.0)
    );
    println!(
        "Total Energy: {:.3} kWh",
        info["energy_wh"].as_f64().unwrap_or(0.0) / 1000.0
    );
    Ok(())
}

/// Switch a device on a running instance and print the server's answer.
pub async fn power(options: PowerOptions) -> Result<()> {
    let action = options.action.to_lowercase();
    if !matches!(action.as_str(), "on" | "off" | "toggle") {
        bail!(
            "power action must be on, off or toggle, got '{}'",
            options.action
        );
    }
    let url = format!("{}/power/{}", options.host.base_url(), action);
    let mut request = reqwest::Client::new().post(&url);
    if let Some(device) = &options.device {
        request = request.query(&[("device", device.as_str())]);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let body = read_json(response).await?;
    println!(
        "{}: {}",
        field_str(&body, "device_id"),
        field_str(&body, "message")
    );
    Ok(())
}

/// Register or rebind a device on a running instance.
pub async fn assign(options: AssignOptions) -> Result<()> {
    let url = format!("{}/devices", options.host.base_url());
    let body = serde_json::json!({
        "device_id": options.device_id,
        "profile": options.profile,
        "category": options.category.map(|c| c.to_string()),
    });
    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("POST {url}"))?;
    let info = read_json(response).await?;
    println!(
        "{} -> {} ({})",
        field_str(&info, "device_id"),
        field_str(&info, "profile_name"),
        field_str(&info, "category")
    );
    Ok(())
}

fn load_catalog(options: &CatalogOptions) -> Result<ProfileCatalog> {
    match &options.catalog {
        Some(path) => config::load_catalog_file(path),
        None => Ok(ProfileCatalog::builtin()),
    }
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .context("decoding server response")?;
    if !status.is_success() {
        bail!("server answered {status}: {body}");
    }
    Ok(body)
}

fn field_str<'a>(value: &'a serde_json::Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("?")
}
