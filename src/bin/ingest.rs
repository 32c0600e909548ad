//! Corpus ingestion entry point
//! Run once at startup or after a demo reset:
//!   ragshield-ingest

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragshield::config::Config;
use ragshield::ingest::ingest_corpus;
use ragshield::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ragshield=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("RAGShield corpus ingestion from {}", config.corpus_dir().display());

    let state = AppState::new(config).await.unwrap();
    match ingest_corpus(&state).await {
        Ok(total) => tracing::info!("Corpus ingestion complete: {} documents", total),
        Err(err) => {
            tracing::error!("Corpus ingestion failed: {}", err);
            std::process::exit(1);
        }
    }
}
