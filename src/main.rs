//! Study Companion - document summaries, chat and quizzes over a
//! generative model
//!
//! An axum server hosting the study session state machine. Each session
//! streams model replies into its conversation and pushes every change to
//! subscribers over SSE.

mod api;
mod attachment;
mod conversation;
mod gateway;
mod prompts;
mod quiz;
mod reducer;
mod runtime;
mod session;

use api::{create_router, AppState};
use attachment::DEFAULT_MAX_BYTES;
use gateway::{build_gateway, GatewayConfig};
use runtime::SessionManager;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "study_companion=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("STUDY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let max_upload_bytes = std::env::var("STUDY_MAX_UPLOAD_MB")
        .ok()
        .and_then(|mb| mb.parse::<usize>().ok())
        .map_or(DEFAULT_MAX_BYTES, |mb| mb.saturating_mul(1024 * 1024));

    let session_ttl = std::env::var("STUDY_SESSION_IDLE_MINUTES")
        .ok()
        .and_then(|m| m.parse::<u64>().ok())
        .filter(|m| *m > 0)
        .map_or(Duration::from_secs(60 * 60), |m| {
            Duration::from_secs(m.saturating_mul(60))
        });

    // Initialize model gateway
    let gateway_config = GatewayConfig::from_env();
    let gateway = build_gateway(&gateway_config);
    tracing::info!(
        model = %gateway.model_id(),
        proxied = gateway_config.gateway.is_some(),
        max_upload_bytes,
        "Model gateway initialized"
    );

    // Create router
    let state = AppState::new(gateway, max_upload_bytes);
    SessionManager::spawn_reaper(&state.sessions, session_ttl);
    tracing::info!(idle_minutes = session_ttl.as_secs() / 60, "Session reaper started");

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Study Companion server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
