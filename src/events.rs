//! Event logger
//! Append-only JSONL sink with Windows Event Viewer style event IDs
//!
//! Event ID ranges (stable wire contract, SIEM rules key off these):
//! - 1001-1999 integrity (1001 passed, 1002 flagged, 1003 quarantined)
//! - 2001-2999 quarantine (2001 initiated, 2002 confirmed, 2003 restored,
//!   2004 state changed)
//! - 3001-3999 blast radius (3001 requested, 3002 high impact, 3003 done)
//! - 4001-4999 system (4001 start, 4002 trust degradation, 4003 ingestion,
//!   4004 reset)

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};

use crate::error::Result;
use crate::integrity::IntegritySignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Information,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    Integrity,
    Quarantine,
    BlastRadius,
    System,
}

/// A single structured event, one JSONL line on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u32,
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub category: EventCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Quarantine lifecycle actions, mapped to the 2001-2004 event ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineAction {
    Initiated,
    Confirmed,
    Restored,
    StateChanged,
}

impl QuarantineAction {
    fn event_id(self) -> u32 {
        match self {
            Self::Initiated => 2001,
            Self::Confirmed => 2002,
            Self::Restored => 2003,
            Self::StateChanged => 2004,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Confirmed => "confirmed",
            Self::Restored => "restored",
            Self::StateChanged => "state_changed",
        }
    }
}

/// Append-only JSONL logger.
///
/// One async mutex per sink keeps concurrent writers from interleaving
/// partial lines; the parent directory is recreated lazily on every write so
/// a demo reset never breaks subsequent logging. Each appended event is also
/// fanned out to live subscribers.
pub struct EventLogger {
    log_path: PathBuf,
    lock: Mutex<()>,
    live_tx: broadcast::Sender<Event>,
}

impl EventLogger {
    pub fn new(log_path: PathBuf) -> Self {
        let (live_tx, _) = broadcast::channel(1000);
        Self {
            log_path,
            lock: Mutex::new(()),
            live_tx,
        }
    }

    /// Subscribe to live events (SSE feed)
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.live_tx.subscribe()
    }

    /// Append one event as a single JSONL line
    pub async fn log_event(&self, event: Event) -> Result<()> {
        let line = serde_json::to_string(&event)?;

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        drop(_guard);

        let _ = self.live_tx.send(event);
        Ok(())
    }

    /// Integrity check result: 1001 passed (Information) or 1003
    /// quarantine triggered (Error)
    pub async fn log_integrity_check(
        &self,
        query_id: &str,
        query_text: &str,
        doc_id: &str,
        signals: &IntegritySignals,
        threshold: f64,
        quarantined: bool,
        user_id: &str,
    ) -> Result<()> {
        let (event_id, level, message) = if quarantined {
            (
                1003,
                EventLevel::Error,
                format!("Query triggered quarantine - document {} flagged", doc_id),
            )
        } else {
            (
                1001,
                EventLevel::Information,
                format!("Query processed - integrity checks passed for {}", doc_id),
            )
        };

        let details = json!({
            "query_id": query_id,
            "query_text": truncate(query_text, 100),
            "doc_id": doc_id,
            "integrity_scores": {
                "trust": signals.trust_score,
                "red_flag": signals.red_flag_score,
                "anomaly": signals.anomaly_score,
                "semantic_drift": signals.semantic_drift_score,
                "combined": signals.combined_score(),
            },
            "quarantined": quarantined,
            "low_signals": signals.low_signals(threshold),
        });

        self.log_event(Event {
            event_id,
            timestamp: Utc::now(),
            level,
            category: EventCategory::Integrity,
            message,
            user_id: Some(user_id.to_string()),
            session_id: None,
            details: as_map(details),
        })
        .await
    }

    /// Quarantine lifecycle action (2001-2004)
    pub async fn log_quarantine_action(
        &self,
        quarantine_id: &str,
        doc_id: &str,
        reason: &str,
        action: QuarantineAction,
        analyst: Option<&str>,
        integrity_signals: Option<&IntegritySignals>,
    ) -> Result<()> {
        let level = if action == QuarantineAction::Initiated {
            EventLevel::Warning
        } else {
            EventLevel::Information
        };

        let mut details = as_map(json!({
            "quarantine_id": quarantine_id,
            "doc_id": doc_id,
            "reason": reason,
            "action": action.label(),
            "analyst": analyst,
        }));
        if let Some(signals) = integrity_signals {
            details.insert("integrity_signals".to_string(), json!(signals));
        }

        self.log_event(Event {
            event_id: action.event_id(),
            timestamp: Utc::now(),
            level,
            category: EventCategory::Quarantine,
            message: format!("Document {}: {}", action.label(), doc_id),
            user_id: Some(analyst.unwrap_or("system").to_string()),
            session_id: None,
            details,
        })
        .await
    }

    /// Blast radius outcome: 3002 for HIGH/CRITICAL (Warning), else 3003
    pub async fn log_blast_radius(
        &self,
        doc_id: &str,
        severity: &str,
        affected_queries: usize,
        affected_users: usize,
        analyst: Option<&str>,
    ) -> Result<()> {
        let (event_id, level) = if severity == "HIGH" || severity == "CRITICAL" {
            (3002, EventLevel::Warning)
        } else {
            (3003, EventLevel::Information)
        };

        self.log_event(Event {
            event_id,
            timestamp: Utc::now(),
            level,
            category: EventCategory::BlastRadius,
            message: format!("Blast radius analysis: {} - Severity: {}", doc_id, severity),
            user_id: Some(analyst.unwrap_or("system").to_string()),
            session_id: None,
            details: as_map(json!({
                "doc_id": doc_id,
                "severity": severity,
                "affected_queries": affected_queries,
                "affected_users": affected_users,
            })),
        })
        .await
    }

    /// System-level event (4001 start, 4003 ingestion, 4004 reset, ...)
    pub async fn log_system_event(
        &self,
        event_id: u32,
        message: &str,
        details: serde_json::Value,
    ) -> Result<()> {
        self.log_event(Event {
            event_id,
            timestamp: Utc::now(),
            level: EventLevel::Information,
            category: EventCategory::System,
            message: message.to_string(),
            user_id: None,
            session_id: None,
            details: as_map(details),
        })
        .await
    }

    /// Most recent events first, parsed from the end of the file backward.
    /// Malformed lines are skipped; a torn last line never aborts the scan.
    pub async fn read_events(&self, limit: usize, level: Option<EventLevel>) -> Vec<Event> {
        let content = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };

        let mut events = Vec::new();
        for line in content.lines().rev() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Event>(line) else {
                continue;
            };
            if level.map(|l| event.level == l).unwrap_or(true) {
                events.push(event);
                if events.len() >= limit {
                    break;
                }
            }
        }
        events
    }

    /// Total events logged
    pub async fn event_count(&self) -> usize {
        match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content.lines().filter(|l| !l.trim().is_empty()).count(),
            Err(_) => 0,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn as_map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
