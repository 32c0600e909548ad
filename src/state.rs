//! Application state
//! One context object owning every subsystem, built once at startup and
//! shared by handlers; tests build their own against a temp directory

use tokio::sync::broadcast;

use crate::blast_radius::BlastRadiusAnalyzer;
use crate::config::Config;
use crate::error::Result;
use crate::events::{Event, EventLogger};
use crate::integrity::IntegrityEngine;
use crate::llm::LlmClient;
use crate::store::VectorStore;
use crate::vault::QuarantineVault;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: VectorStore,
    pub llm: LlmClient,
    pub engine: IntegrityEngine,
    pub vault: QuarantineVault,
    pub events: EventLogger,
    pub blast: BlastRadiusAnalyzer,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store = VectorStore::open(config.store_dir(), config.embedding_dim).await?;
        let llm = LlmClient::new(&config.ollama_base_url, &config.ollama_model);
        let engine = IntegrityEngine::new(config.integrity_threshold);
        let vault = QuarantineVault::new(config.vault_dir());
        let events = EventLogger::new(config.event_log_file());
        let blast = BlastRadiusAnalyzer::new(config.lineage_log_file());

        Ok(Self {
            config,
            store,
            llm,
            engine,
            vault,
            events,
            blast,
        })
    }

    /// Live event feed for SSE subscribers
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}
