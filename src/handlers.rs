//! HTTP Handlers
//!
//! Endpoints:
//! - POST /api/query: execute protected RAG query
//! - POST /api/query/unsafe: demo-only unprotected query
//! - GET /api/events: fetch recent events
//! - GET /api/events/stream: SSE stream of new events
//! - GET /api/quarantine: list quarantined documents
//! - POST /api/quarantine/{id}/confirm: confirm malicious
//! - POST /api/quarantine/{id}/restore: restore false positive
//! - GET /api/blast-radius/{doc_id}: impact analysis
//! - POST /api/demo/reset: clear state for demo
//! - GET /api/status: system health check

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;

use crate::blast_radius::BlastRadiusReport;
use crate::error::ShieldError;
use crate::events::{Event, EventCategory, EventLevel, QuarantineAction};
use crate::pipeline::QueryOutcome;
use crate::state::AppState;
use crate::vault::{QuarantineRecord, QuarantineState};

/// Error envelope for the API
pub struct ApiError(ShieldError);

impl From<ShieldError> for ApiError {
    fn from(err: ShieldError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            ShieldError::NotFound(_) => StatusCode::NOT_FOUND,
            ShieldError::InvalidTransition(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
}

/// POST /api/query
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let user_id = payload.user_id.unwrap_or_else(|| "default-user".to_string());
    let k = payload.k.unwrap_or(state.config.retrieval_k);
    let outcome = state.query(&payload.query, &user_id, k).await?;
    Ok(Json(outcome))
}

/// POST /api/query/unsafe
pub async fn run_query_unsafe(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let user_id = payload.user_id.unwrap_or_else(|| "default-user".to_string());
    let k = payload.k.unwrap_or(state.config.retrieval_k);
    let outcome = state.query_unsafe(&payload.query, &user_id, k).await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct EventsParams {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
}

/// GET /api/events
pub async fn get_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsParams>,
) -> Result<Json<EventsResponse>, ApiError> {
    let level = match params.level.as_deref() {
        Some(raw) => Some(parse_level(raw)?),
        None => None,
    };
    let events = state.events.read_events(params.limit.unwrap_or(100), level).await;
    Ok(Json(EventsResponse { events }))
}

fn parse_level(raw: &str) -> Result<EventLevel, ApiError> {
    match raw.to_lowercase().as_str() {
        "information" => Ok(EventLevel::Information),
        "warning" => Ok(EventLevel::Warning),
        "error" => Ok(EventLevel::Error),
        "critical" => Ok(EventLevel::Critical),
        other => Err(ShieldError::NotFound(format!("unknown event level: {other}")).into()),
    }
}

/// GET /api/events/stream
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.subscribe_events();
    let stream = BroadcastStream::new(rx).filter_map(|event| async move {
        let event = event.ok()?;
        let sse = SseEvent::default().json_data(&event).ok()?;
        Some(Ok(sse))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
pub struct QuarantineListParams {
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Serialize)]
pub struct QuarantineListResponse {
    pub records: Vec<QuarantineRecord>,
}

/// GET /api/quarantine
pub async fn list_quarantine(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuarantineListParams>,
) -> Result<Json<QuarantineListResponse>, ApiError> {
    let filter = match params.state.as_deref() {
        Some(raw) => Some(parse_state(raw)?),
        None => None,
    };
    let records = state.vault.list_quarantined(filter).await;
    Ok(Json(QuarantineListResponse { records }))
}

fn parse_state(raw: &str) -> Result<QuarantineState, ApiError> {
    match raw.to_uppercase().as_str() {
        "QUARANTINED" => Ok(QuarantineState::Quarantined),
        "CONFIRMED_MALICIOUS" => Ok(QuarantineState::ConfirmedMalicious),
        "RESTORED" => Ok(QuarantineState::Restored),
        other => Err(ShieldError::NotFound(format!("unknown quarantine state: {other}")).into()),
    }
}

/// GET /api/quarantine/{qid}
pub async fn get_quarantine_record(
    State(state): State<Arc<AppState>>,
    Path(quarantine_id): Path<String>,
) -> Result<Json<QuarantineRecord>, ApiError> {
    state
        .vault
        .get_record(&quarantine_id)
        .await
        .map(Json)
        .ok_or_else(|| ShieldError::NotFound(quarantine_id).into())
}

#[derive(Deserialize)]
pub struct AnalystAction {
    pub analyst: String,
    #[serde(default)]
    pub notes: String,
}

/// POST /api/quarantine/{qid}/confirm
pub async fn confirm_malicious(
    State(state): State<Arc<AppState>>,
    Path(quarantine_id): Path<String>,
    Json(action): Json<AnalystAction>,
) -> Result<Json<QuarantineRecord>, ApiError> {
    let record = state
        .vault
        .confirm_malicious(&quarantine_id, &action.analyst, &action.notes)
        .await?;

    state
        .events
        .log_quarantine_action(
            &record.quarantine_id,
            &record.doc_id,
            &action.notes,
            QuarantineAction::Confirmed,
            Some(&action.analyst),
            None,
        )
        .await?;

    Ok(Json(record))
}

/// POST /api/quarantine/{qid}/restore
pub async fn restore_document(
    State(state): State<Arc<AppState>>,
    Path(quarantine_id): Path<String>,
    Json(action): Json<AnalystAction>,
) -> Result<Json<QuarantineRecord>, ApiError> {
    let record = state
        .vault
        .restore_document(&quarantine_id, &action.analyst, &action.notes, &state.store)
        .await?;

    state
        .events
        .log_quarantine_action(
            &record.quarantine_id,
            &record.doc_id,
            &action.notes,
            QuarantineAction::Restored,
            Some(&action.analyst),
            None,
        )
        .await?;

    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct BlastRadiusParams {
    #[serde(default)]
    pub lookback_hours: Option<i64>,
}

/// GET /api/blast-radius/{doc_id}
pub async fn blast_radius(
    State(state): State<Arc<AppState>>,
    Path(doc_id): Path<String>,
    Query(params): Query<BlastRadiusParams>,
) -> Result<Json<BlastRadiusReport>, ApiError> {
    let lookback = params
        .lookback_hours
        .unwrap_or(state.config.lineage_lookback_hours);

    state
        .events
        .log_event(Event {
            event_id: 3001,
            timestamp: Utc::now(),
            level: EventLevel::Information,
            category: EventCategory::BlastRadius,
            message: format!("Blast radius assessment requested for {}", doc_id),
            user_id: None,
            session_id: None,
            details: serde_json::Map::from_iter([
                ("doc_id".to_string(), json!(doc_id)),
                ("lookback_hours".to_string(), json!(lookback)),
            ]),
        })
        .await?;

    let report = state.blast.analyze_impact(&doc_id, lookback, &state.vault).await;

    state
        .events
        .log_blast_radius(
            &doc_id,
            &report.severity,
            report.affected_queries,
            report.affected_users.len(),
            None,
        )
        .await?;

    Ok(Json(report))
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub status: String,
}

/// POST /api/demo/reset
pub async fn demo_reset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResetResponse>, ApiError> {
    state.reset().await?;
    Ok(Json(ResetResponse {
        status: "reset".to_string(),
    }))
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub document_count: usize,
    pub quarantine_count: usize,
    pub event_count: usize,
    pub lineage_count: usize,
    pub ollama_connected: bool,
}

/// GET /api/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        document_count: state.store.get_document_count().await,
        quarantine_count: state.vault.quarantine_count().await,
        event_count: state.events.event_count().await,
        lineage_count: state.blast.lineage_count().await,
        ollama_connected: state.llm.check_status().await,
    })
}
