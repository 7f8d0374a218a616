//! epx-daemon entry point.
//!
//! Thin by intent: sets up tracing, loads config, builds the shared state,
//! wires middleware, and starts the HTTP server. All route handlers live in
//! `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use epx_config::{
    load_layered_yaml, report_unused_keys, ConfigMode, LoadedConfig, ProctorSettings,
    UnusedKeyPolicy,
};
use epx_daemon::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Production injects env
    // vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config_from_env()?;
    let report = report_unused_keys(ConfigMode::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config carries keys the daemon never reads");
    }

    let settings = ProctorSettings::from_config_json(&loaded.config_json)
        .context("invalid proctoring settings")?;
    let key = settings.classifier.resolve_api_key();
    if key.value.is_none() {
        warn!(
            env_var = %key.env_var,
            "classifier api key not set; similarity and AI detection will return neutral results"
        );
    }

    let addr = bind_addr_from_env()
        .or_else(|| settings.daemon.addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));

    info!(config_hash = %loaded.config_hash, "config loaded");
    let shared = Arc::new(state::AppState::from_settings(
        settings,
        loaded.config_hash,
        key.value,
    ));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("epx-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `EPX_CONFIG` holds a comma-separated list of YAML layers (base first).
/// Unset means built-in defaults.
fn load_config_from_env() -> anyhow::Result<LoadedConfig> {
    match std::env::var("EPX_CONFIG") {
        Ok(raw) if !raw.trim().is_empty() => {
            let paths: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            load_layered_yaml(&paths).context("failed to load EPX_CONFIG layers")
        }
        _ => LoadedConfig::defaults(),
    }
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("EPX_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            warn!(error = %e, "ctrl-c handler unavailable; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
