use anyhow::Result;
use clap::Parser;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tasmota_sim::{api, cli, config::Config, engine::PowerEngine, publisher, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();
    match parsed.command {
        None | Some(cli::Command::Serve) => serve().await,
        Some(cli::Command::Profiles(opts)) => cli::profiles(opts),
        Some(cli::Command::Resolve(opts)) => cli::resolve(opts),
        Some(cli::Command::Device(opts)) => cli::device(opts).await,
        Some(cli::Command::Power(opts)) => cli::power(opts).await,
        Some(cli::Command::Assign(opts)) => cli::assign(opts).await,
    }
}

async fn serve() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;
    let catalog = cfg.build_catalog()?;

    let mut engine = PowerEngine::new(catalog).with_tuning(cfg.tuning.clone());
    if let Some(seed) = cfg.engine.random_seed {
        engine = engine.with_random_seed(seed);
    }
    let engine = Arc::new(engine);

    bootstrap_fleet(&engine, &cfg)?;

    let app_state = api::AppState::new(Arc::clone(&engine), &cfg);
    let app = api::router(app_state, &cfg);

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("binding to 0.0.0.0 - the simulator accepts commands from the whole network");
    }

    info!(%addr, devices = engine.device_ids().len(), "starting tasmota-sim");

    if cfg.telemetry.enabled {
        publisher::spawn_telemetry_publisher(
            Arc::clone(&engine),
            Arc::new(publisher::LogSink),
            cfg.telemetry.interval_seconds,
        );
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}

/// Register the configured fleet, then optionally switch a random subset on
/// so a fresh start does not report a fully dark household.
fn bootstrap_fleet(engine: &PowerEngine, cfg: &Config) -> Result<()> {
    for spec in cfg.fleet() {
        let profile = engine.assign_profile(&spec.id, spec.profile.as_deref(), spec.category)?;
        info!(device_id = %spec.id, profile = %profile.name, "registered device");
    }

    if cfg.engine.randomize_initial_state {
        let mut rng = match cfg.engine.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        for device_id in engine.device_ids() {
            if rng.gen_bool(0.5) {
                engine.set_power_state(&device_id, true)?;
            }
        }
    }
    Ok(())
}
