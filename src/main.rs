//! Ollamao gateway - main entry point
//!
//! This binary loads the YAML configuration, builds the router, and runs the
//! HTTP server.

use anyhow::Result;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use chrono::Local;
use ollamao::{
    api::{chat_completions, health, list_models, metrics_handler, AppState, UpstreamClient},
    core::{init_metrics, request_id_middleware, track_metrics, GatewayConfig},
    services::ModelRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing() {
    // Suppress noisy HTTP library logs regardless of the RUST_LOG setting;
    // a plain "debug" filter would otherwise let hyper chunk traces through.
    let base_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,ollamao=debug".to_string());
    let filter_str = format!("{},hyper=warn,h2=warn,reqwest=warn", base_filter);
    let filter = tracing_subscriber::EnvFilter::new(filter_str);

    let no_color = std::env::var("NO_COLOR").is_ok();
    if no_color {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(LocalTime)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_timer(LocalTime))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    init_tracing();
    init_metrics();

    let config_dir =
        std::env::var("OLLAMAO_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    tracing::info!(config_dir = %config_dir, "Loading configuration");
    let config = GatewayConfig::load(std::path::Path::new(&config_dir))?;

    let registry = ModelRegistry::new(&config);
    registry.log_models();
    tracing::info!(keys = config.keys.len(), "Loaded API keys");

    // One shared connection pool for all backends
    let http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()?;
    let upstream = UpstreamClient::new(
        http_client,
        Duration::from_secs(config.stream_idle_timeout_secs),
    );

    let state = Arc::new(AppState { registry, upstream });
    let app = build_router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Starting Ollamao gateway on {}", addr);
    tracing::info!("OpenAI API: /v1/chat/completions, /v1/models");
    tracing::info!("Health endpoint: /health");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build router with all endpoints
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_metrics))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
