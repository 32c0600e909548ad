//! Blast radius analysis
//! Who was served a document, and when?
//!
//! Every query appends one lineage line; impact reports are reconstructed
//! from that log on demand.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::BLAST_RADIUS_THRESHOLDS;
use crate::error::Result;
use crate::integrity::IntegritySignals;
use crate::vault::QuarantineVault;

/// Outcome of a served query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionTaken {
    Allow,
    Partial,
    Quarantine,
}

/// One append-only lineage record per served query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLineage {
    pub query_id: String,
    pub query_text: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub retrieved_docs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_signals: Option<HashMap<String, IntegritySignals>>,
    pub action_taken: ActionTaken,
}

/// A query that retrieved the document under analysis
#[derive(Debug, Clone, Serialize)]
pub struct AffectedQuery {
    pub query_id: String,
    pub query_text: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub action_taken: ActionTaken,
}

/// Impact report for a document over the lookback window
#[derive(Debug, Clone, Serialize)]
pub struct BlastRadiusReport {
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub affected_queries: usize,
    pub affected_users: HashSet<String>,
    pub time_window_start: DateTime<Utc>,
    pub time_window_end: DateTime<Utc>,
    pub severity: String,
    pub recommended_actions: Vec<String>,
    pub query_details: Vec<AffectedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_signals: Option<IntegritySignals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine_reason: Option<String>,
}

/// Tracks query lineage and reconstructs the impact of poisoned documents
pub struct BlastRadiusAnalyzer {
    lineage_log: PathBuf,
    lock: Mutex<()>,
}

impl BlastRadiusAnalyzer {
    pub fn new(lineage_log: PathBuf) -> Self {
        Self {
            lineage_log,
            lock: Mutex::new(()),
        }
    }

    /// Record one served query. At-least-once: a crash mid-write leaves a
    /// torn line which the read path drops.
    pub async fn log_query(
        &self,
        query_id: &str,
        query_text: &str,
        user_id: &str,
        retrieved_docs: Vec<String>,
        integrity_signals: Option<HashMap<String, IntegritySignals>>,
        action_taken: ActionTaken,
    ) -> Result<()> {
        let lineage = QueryLineage {
            query_id: query_id.to_string(),
            query_text: query_text.to_string(),
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            retrieved_docs,
            integrity_signals,
            action_taken,
        };
        let line = serde_json::to_string(&lineage)?;

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.lineage_log.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.lineage_log)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Scan the lineage log for queries that retrieved `doc_id` within the
    /// lookback window and classify the impact.
    pub async fn analyze_impact(
        &self,
        doc_id: &str,
        lookback_hours: i64,
        vault: &QuarantineVault,
    ) -> BlastRadiusReport {
        let content = match tokio::fs::read_to_string(&self.lineage_log).await {
            Ok(content) => content,
            Err(_) => return Self::empty_report(doc_id),
        };

        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let mut query_details: Vec<AffectedQuery> = Vec::new();
        let mut affected_users: HashSet<String> = HashSet::new();
        let mut earliest = DateTime::<Utc>::MAX_UTC;
        let mut latest = DateTime::<Utc>::MIN_UTC;

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(lineage) = serde_json::from_str::<QueryLineage>(line) else {
                continue; // torn or malformed line
            };
            if !lineage.retrieved_docs.iter().any(|d| d == doc_id) {
                continue;
            }
            if lineage.timestamp < cutoff {
                continue;
            }

            affected_users.insert(lineage.user_id.clone());
            earliest = earliest.min(lineage.timestamp);
            latest = latest.max(lineage.timestamp);
            query_details.push(AffectedQuery {
                query_id: lineage.query_id,
                query_text: lineage.query_text,
                user_id: lineage.user_id,
                timestamp: lineage.timestamp,
                action_taken: lineage.action_taken,
            });
        }

        if query_details.is_empty() {
            return Self::empty_report(doc_id);
        }

        let severity = calculate_severity(query_details.len(), affected_users.len());
        let recommended_actions =
            recommendations(severity, affected_users.len(), doc_id);

        // Enrich from the vault entry, when one exists
        let mut file_path = None;
        let mut integrity_signals = None;
        let mut quarantine_reason = None;
        if let Some(q_dir) = vault.find_dir_for_doc(doc_id).await {
            file_path = Some(q_dir.join("content.txt").to_string_lossy().to_string());
            if let Ok(bytes) = tokio::fs::read(q_dir.join("record.json")).await {
                if let Ok(record) =
                    serde_json::from_slice::<crate::vault::QuarantineRecord>(&bytes)
                {
                    integrity_signals = Some(record.integrity_scores);
                    quarantine_reason = Some(record.reason);
                }
            }
        }

        BlastRadiusReport {
            doc_id: doc_id.to_string(),
            file_path,
            affected_queries: query_details.len(),
            affected_users,
            time_window_start: earliest,
            time_window_end: latest,
            severity: severity.to_string(),
            recommended_actions,
            query_details,
            integrity_signals,
            quarantine_reason,
        }
    }

    fn empty_report(doc_id: &str) -> BlastRadiusReport {
        let now = Utc::now();
        BlastRadiusReport {
            doc_id: doc_id.to_string(),
            file_path: None,
            affected_queries: 0,
            affected_users: HashSet::new(),
            time_window_start: now,
            time_window_end: now,
            severity: "LOW".to_string(),
            recommended_actions: vec!["No affected queries found.".to_string()],
            query_details: Vec::new(),
            integrity_signals: None,
            quarantine_reason: None,
        }
    }

    /// Total queries logged
    pub async fn lineage_count(&self) -> usize {
        match tokio::fs::read_to_string(&self.lineage_log).await {
            Ok(content) => content.lines().filter(|l| !l.trim().is_empty()).count(),
            Err(_) => 0,
        }
    }
}

/// Threshold table scan, most-severe first. CRITICAL and HIGH match on
/// queries or users alone; MEDIUM needs both.
fn calculate_severity(query_count: usize, user_count: usize) -> &'static str {
    for &(name, queries, users) in BLAST_RADIUS_THRESHOLDS {
        let hit = if name == "MEDIUM" {
            query_count >= queries && user_count >= users
        } else {
            query_count >= queries || user_count >= users
        };
        if hit {
            return name;
        }
    }
    "LOW"
}

fn recommendations(severity: &str, user_count: usize, doc_id: &str) -> Vec<String> {
    let mut actions = vec![
        format!("Review query lineage log for document {}", doc_id),
        format!(
            "Notify {} affected user(s) about potentially compromised guidance",
            user_count
        ),
    ];

    if severity == "HIGH" || severity == "CRITICAL" {
        actions.extend([
            "Conduct full security audit of recent actions".to_string(),
            "Review any remediation steps taken based on this document".to_string(),
            "Consider investigating document source for additional compromised content"
                .to_string(),
            "Escalate to security incident response team".to_string(),
        ]);
    }

    if severity == "CRITICAL" {
        actions.extend([
            "Initiate emergency response protocol".to_string(),
            "Audit all user sessions in affected time window".to_string(),
            "Consider temporary suspension of affected document source".to_string(),
        ]);
    }

    actions
}
