use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use liargame::{api, broadcast, llm, state::AppState, throttle::Throttle, types::GameConfig, ws};

const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liargame=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Liar Game server...");

    let game_config = match GameConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        seats = game_config.seat_count,
        phases = ?game_config.phases,
        gating = ?game_config.gating,
        generated_counterpart = game_config.generate_counterpart,
        "Game config loaded"
    );

    // Initialize LLM providers
    let llm_config = llm::LlmConfig::from_env();
    let llm_manager = match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!("LLM providers initialized successfully");
            manager
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM providers: {}. AI seats will use scripted lines.",
                e
            );
            llm::LlmManager::offline()
        }
    };

    let state = Arc::new(
        AppState::new(game_config, llm_manager, llm_config).with_throttle(Throttle::from_env()),
    );

    // Spawn background task for removing abandoned rooms
    broadcast::spawn_idle_room_reaper(state.clone(), broadcast::SWEEP_INTERVAL);

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api::router())
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = std::env::var("LIAR_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
