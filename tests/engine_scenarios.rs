//! End-to-End Simulation Scenarios
//!
//! Exercises the stack across module seams:
//! - HTTP surface: routing, console command parsing, error mapping
//! - Engine semantics over simulated timelines
//! - Telemetry publisher sweeps
//! - Catalog files replacing the built-in profiles

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use tokio::task::JoinSet;
use tower::ServiceExt;

use tasmota_sim::api::{self, AppState};
use tasmota_sim::config::{
    load_catalog_file, Config, DeviceSpec, EngineConfig, ServerConfig, TelemetryConfig,
};
use tasmota_sim::engine::{DeviceCategory, EngineError, ModelTuning, PowerEngine};
use tasmota_sim::publisher::{publish_fleet, MemorySink};

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            request_timeout_secs: 5,
        },
        telemetry: TelemetryConfig {
            interval_seconds: 60,
            enabled: false,
        },
        engine: EngineConfig::default(),
        tuning: ModelTuning::default(),
        devices: vec![DeviceSpec {
            id: "plug_a".to_string(),
            name: Some("Desk Plug".to_string()),
            profile: None,
            category: None,
        }],
    }
}

fn test_app() -> (Router, Arc<PowerEngine>) {
    let cfg = test_config();
    let engine = Arc::new(PowerEngine::default().with_random_seed(11));
    for spec in cfg.fleet() {
        engine
            .assign_profile(&spec.id, spec.profile.as_deref(), spec.category)
            .expect("configured fleet registers");
    }
    let state = AppState::new(Arc::clone(&engine), &cfg);
    (api::router(state, &cfg), engine)
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// Test: Console power commands round-trip through the engine
#[tokio::test]
async fn test_cm_power_command_round_trip() {
    let (app, _engine) = test_app();

    let response = get(&app, "/cm?cmnd=Power%20ON").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "POWER": "ON" })
    );

    // Bare Power reads back without switching.
    let response = get(&app, "/cm?cmnd=Power").await;
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "POWER": "ON" })
    );

    let response = get(&app, "/cm?cmnd=power%20toggle").await;
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "POWER": "OFF" })
    );
}

/// Test: Malformed console commands answer 400 with the error shape
#[tokio::test]
async fn test_cm_rejects_invalid_commands() {
    let (app, _engine) = test_app();

    for cmnd in ["Power%20MAYBE", "Status%2013", "Status%20abc", "Reboot"] {
        let response = get(&app, &format!("/cm?cmnd={cmnd}")).await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "cmnd {cmnd} must be rejected"
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "BadRequest");
        assert!(body["message"].is_string());
    }
}

/// Test: Status levels answer the firmware payload blocks
#[tokio::test]
async fn test_cm_status_levels() {
    let (app, _engine) = test_app();

    let response = get(&app, "/cm?cmnd=Status%2011").await;
    let body = body_json(response).await;
    assert_eq!(body["StatusSTS"]["POWER"], "OFF");
    assert!(body["StatusSTS"]["Uptime"].is_string());

    let response = get(&app, "/cm?cmnd=Status%208").await;
    let body = body_json(response).await;
    assert!(body["StatusSNS"]["ENERGY"]["Total"].is_number());

    // Bare Status is the abbreviated level 0 overview.
    let response = get(&app, "/cm?cmnd=Status").await;
    let body = body_json(response).await;
    assert_eq!(body["Status"]["DeviceName"], "Desk Plug");
    assert_eq!(body["Status"]["Topic"], "plug_a");
    assert!(body["StatusSTS"].is_object());
    assert!(body["StatusSNS"].is_object());

    // In range for real firmware, but backed by nothing here.
    let response = get(&app, "/cm?cmnd=Status%205").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: REST switch endpoint mirrors the firmware response shape
#[tokio::test]
async fn test_power_endpoint_matches_firmware_shape() {
    let (app, _engine) = test_app();

    let response = post(&app, "/power/on").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["power_state"], true);
    assert_eq!(body["message"], "Power turned on");

    let response = post(&app, "/power/toggle").await;
    let body = body_json(response).await;
    assert_eq!(body["power_state"], false);
    assert_eq!(body["message"], "Power turned toggle");

    let response = post(&app, "/power/banana").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: Admin lifecycle - register by inference, rebind, list, errors
#[tokio::test]
async fn test_admin_device_lifecycle() {
    let (app, _engine) = test_app();

    let response = post_json(
        &app,
        "/devices",
        serde_json::json!({ "device_id": "washing_machine_1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["profile_name"], "Waschmaschine");
    assert_eq!(body["category"], "motor");
    assert_eq!(body["power_on"], false);

    // Switch it on, then rebind: the switch state survives the rebind.
    let response = post(&app, "/power/on?device=washing_machine_1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = post_json(
        &app,
        "/devices",
        serde_json::json!({ "device_id": "washing_machine_1", "profile": "Staubsauger" }),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["profile_name"], "Staubsauger");
    assert_eq!(body["power_on"], true);

    let response = get(&app, "/devices").await;
    let body = body_json(response).await;
    assert_eq!(body["total"], 2);

    let response = get(&app, "/devices/washing_machine_1").await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/devices/ghost_plug").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NotFound");

    let response = post_json(
        &app,
        "/devices",
        serde_json::json!({ "device_id": "x", "category": "warp_drive" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Test: Summary pages and catalog listing
#[tokio::test]
async fn test_status_pages_and_profiles() {
    let (app, _engine) = test_app();

    for uri in ["/", "/status?device=plug_a"] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        let body = body_json(response).await;
        assert_eq!(body["status"], "Online");
        assert_eq!(body["device_name"], "Desk Plug");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    let response = get(&app, "/energy").await;
    let body = body_json(response).await;
    for key in ["power", "apparent_power", "factor", "voltage", "current", "total"] {
        assert!(body[key].is_number(), "energy block missing {key}");
    }

    // plug_a carries no keyword, so it falls back to the electronics default.
    let response = get(&app, "/power-profile").await;
    let body = body_json(response).await;
    assert_eq!(body["profile_name"], "TV LED");
    assert_eq!(body["profile_category"], "electronics");
    assert_eq!(body["has_cycling"], false);

    let response = get(&app, "/profiles").await;
    let body = body_json(response).await;
    assert_eq!(body["total"], 20);

    let response = get(&app, "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Test: A simulated day accumulates a plausible, monotone ledger
#[tokio::test]
async fn test_simulated_day_accumulates_energy() {
    let engine = PowerEngine::default().with_random_seed(3);
    let t0 = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    engine
        .assign_profile_at("fridge_kitchen", None, None, t0)
        .unwrap();
    engine.set_power_state_at("fridge_kitchen", true, t0).unwrap();

    let mut last_total = 0.0;
    for hour in 1..=24 {
        let at = t0 + chrono::Duration::hours(hour);
        let reading = engine.get_power_consumption_at("fridge_kitchen", at).unwrap();
        assert!(
            reading.energy_wh >= last_total,
            "ledger shrank at hour {hour}: {} -> {}",
            last_total,
            reading.energy_wh
        );
        last_total = reading.energy_wh;
    }

    // A compressor fridge draws something every hour but never runs at
    // full tilt around the clock.
    assert!(last_total > 0.0);
    assert!(last_total < 200.0 * 24.0, "fridge drew {last_total} Wh");
}

/// Test: A catalog file replaces the built-in profiles entirely
#[tokio::test]
async fn test_catalog_file_replaces_builtin() {
    let path = std::env::temp_dir().join(format!("tasmota_sim_catalog_{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[[profile]]
category = "lighting"
name = "Kellerlampe"
base_watts_min = 10.0
base_watts_max = 20.0
standby_watts = 0.5
"#,
    )
    .unwrap();

    let catalog = load_catalog_file(&path).unwrap();
    assert_eq!(catalog.profiles().len(), 1);

    let engine = PowerEngine::new(catalog);
    // No electronics in this catalog: the generic fallback degrades to the
    // first declared profile.
    let profile = engine.assign_profile("mystery_box", None, None).unwrap();
    assert_eq!(profile.name, "Kellerlampe");

    let err = engine
        .assign_profile("x", None, Some(DeviceCategory::Motor))
        .unwrap_err();
    assert!(matches!(err, EngineError::CategoryHasNoProfiles(_)));

    // Invalid definitions are rejected at load time.
    std::fs::write(
        &path,
        r#"
[[profile]]
category = "lighting"
name = "Kaputt"
base_watts_min = 10.0
base_watts_max = 20.0
standby_watts = 50.0
"#,
    )
    .unwrap();
    assert!(load_catalog_file(&path).is_err());

    std::fs::remove_file(&path).ok();
}

/// Test: One publisher sweep reaches the whole fleet
#[tokio::test]
async fn test_publisher_sweep_covers_fleet() {
    let engine = Arc::new(PowerEngine::default().with_random_seed(5));
    for id in ["plug_a", "plug_b", "heater_attic"] {
        engine.assign_profile(id, None, None).unwrap();
    }
    engine.set_power_state("heater_attic", true).unwrap();

    let sink = MemorySink::default();
    publish_fleet(&engine, &sink).await;

    let messages = sink.messages();
    assert_eq!(messages.len(), 3);
    let heater = messages
        .iter()
        .find(|m| m.device_id == "heater_attic")
        .unwrap();
    assert!(heater.power_state);
    assert!(heater.energy.power > 0.0);
    let idle = messages.iter().find(|m| m.device_id == "plug_a").unwrap();
    assert!(!idle.power_state);
}

/// Test: Concurrent commands against shared devices neither deadlock nor
/// lose registrations
#[tokio::test]
async fn test_concurrent_commands_do_not_deadlock() {
    let engine = Arc::new(PowerEngine::default().with_random_seed(9));
    for i in 0..8 {
        engine.assign_profile(&format!("plug_{i}"), None, None).unwrap();
    }

    let mut tasks = JoinSet::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            let device_id = format!("plug_{}", i % 8);
            for _ in 0..100 {
                let _ = engine.toggle_power_state(&device_id);
                let _ = engine.get_power_consumption(&device_id);
                let _ = engine.get_device_info(&device_id);
            }
        });
    }
    while tasks.join_next().await.is_some() {}

    assert_eq!(engine.device_ids().len(), 8);
    for id in engine.device_ids() {
        let info = engine.get_device_info(&id).unwrap();
        assert!(info.energy_wh >= 0.0);
    }
}

/// Test: The shipped configuration file parses and names the default device
#[test]
fn test_default_config_file_loads() {
    let cfg = Config::load().expect("config/default.toml parses");
    assert_eq!(cfg.server.port, 8080);
    assert!(cfg.telemetry.enabled);
    assert_eq!(cfg.primary_device_id(), "tasmota_sim_1");
    assert_eq!(cfg.fleet().len(), 1);
}
