//! RAGShield - Detection & Response for RAG Systems
//! Serves the protected query pipeline, analyst quarantine actions,
//! blast-radius reports, and the live event feed

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragshield::config::Config;
use ragshield::handlers;
use ragshield::state::AppState;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "ragshield=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RAGShield - Detection & Response for RAG Systems");

    let config = Config::from_env();
    let addr = config.api_addr.clone();

    let state = Arc::new(AppState::new(config).await.unwrap());

    // Load golden reference, probe the generator, log the start event
    match state.initialize().await {
        Ok(true) => tracing::info!("Ollama connected"),
        Ok(false) => tracing::warn!("Ollama unavailable; continuing without generation"),
        Err(err) => tracing::error!("startup logging failed: {}", err),
    }

    // Build router
    let app = Router::new()
        // API routes
        .route("/api/query", post(handlers::run_query))
        .route("/api/query/unsafe", post(handlers::run_query_unsafe))
        .route("/api/events", get(handlers::get_events))
        .route("/api/events/stream", get(handlers::stream_events))
        .route("/api/quarantine", get(handlers::list_quarantine))
        .route("/api/quarantine/:qid", get(handlers::get_quarantine_record))
        .route("/api/quarantine/:qid/confirm", post(handlers::confirm_malicious))
        .route("/api/quarantine/:qid/restore", post(handlers::restore_document))
        .route("/api/blast-radius/:doc_id", get(handlers::blast_radius))
        .route("/api/demo/reset", post(handlers::demo_reset))
        .route("/api/status", get(handlers::get_status))
        // Serve static dashboard files
        .nest_service("/", ServeDir::new("static"))
        // CORS
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
        // State
        .with_state(state);

    tracing::info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
