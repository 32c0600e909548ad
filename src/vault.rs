//! Quarantine vault
//! Filesystem-backed state machine with a full audit trail
//!
//! Directory structure:
//! quarantine_vault/
//!     Q-{timestamp}-{doc_id}/
//!         content.txt
//!         metadata.json
//!         record.json
//!         audit.jsonl

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{Result, ShieldError};
use crate::integrity::IntegritySignals;
use crate::store::{DocMetadata, VectorStore};

/// Lifecycle states. QUARANTINED is the only state with outgoing
/// transitions; the other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuarantineState {
    Quarantined,
    ConfirmedMalicious,
    Restored,
}

impl QuarantineState {
    fn label(self) -> &'static str {
        match self {
            Self::Quarantined => "QUARANTINED",
            Self::ConfirmedMalicious => "CONFIRMED_MALICIOUS",
            Self::Restored => "RESTORED",
        }
    }
}

/// One audit trail entry, mirrored to audit.jsonl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_state: Option<QuarantineState>,
}

/// Full record for a quarantined document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub quarantine_id: String,
    pub doc_id: String,
    pub state: QuarantineState,
    pub quarantined_at: DateTime<Utc>,
    pub reason: String,
    pub integrity_scores: IntegritySignals,
    pub original_content: String,
    pub metadata: DocMetadata,
    pub audit_trail: Vec<AuditEntry>,
}

impl QuarantineRecord {
    fn add_audit_entry(
        &mut self,
        action: &str,
        actor: &str,
        notes: &str,
        previous_state: Option<QuarantineState>,
    ) {
        self.audit_trail.push(AuditEntry {
            timestamp: Utc::now(),
            action: action.to_string(),
            actor: actor.to_string(),
            notes: notes.to_string(),
            previous_state,
        });
    }
}

/// Manages quarantined documents on disk.
///
/// State transitions are serialized by a vault-wide mutex so record.json and
/// audit.jsonl stay consistent for any single quarantine id.
pub struct QuarantineVault {
    vault_dir: PathBuf,
    lock: Mutex<()>,
}

impl QuarantineVault {
    pub fn new(vault_dir: PathBuf) -> Self {
        Self {
            vault_dir,
            lock: Mutex::new(()),
        }
    }

    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    fn record_dir(&self, quarantine_id: &str) -> PathBuf {
        self.vault_dir.join(quarantine_id)
    }

    /// Move a document into the vault: preserve content and metadata,
    /// create the record, start the audit trail.
    ///
    /// The caller keeps documents from being quarantined twice; the
    /// vector-store is_quarantined flag is that guard.
    pub async fn quarantine_document(
        &self,
        doc_id: &str,
        content: &str,
        metadata: &DocMetadata,
        integrity_signals: IntegritySignals,
        reason: &str,
    ) -> Result<QuarantineRecord> {
        let _guard = self.lock.lock().await;

        let quarantined_at = Utc::now();
        let quarantine_id = format!(
            "Q-{}-{}",
            quarantined_at.format("%Y%m%d%H%M%S"),
            doc_id
        );

        let q_dir = self.record_dir(&quarantine_id);
        tokio::fs::create_dir_all(&q_dir).await?;

        tokio::fs::write(q_dir.join("content.txt"), content).await?;
        tokio::fs::write(
            q_dir.join("metadata.json"),
            serde_json::to_vec_pretty(metadata)?,
        )
        .await?;

        let mut record = QuarantineRecord {
            quarantine_id: quarantine_id.clone(),
            doc_id: doc_id.to_string(),
            state: QuarantineState::Quarantined,
            quarantined_at,
            reason: reason.to_string(),
            integrity_scores: integrity_signals,
            original_content: content.to_string(),
            metadata: metadata.clone(),
            audit_trail: Vec::new(),
        };
        record.add_audit_entry("QUARANTINED", "system", reason, None);

        self.write_record(&q_dir, &record).await?;
        self.append_audit(&q_dir, &record.audit_trail[record.audit_trail.len() - 1])
            .await?;

        Ok(record)
    }

    /// Analyst confirms the document is malicious
    pub async fn confirm_malicious(
        &self,
        quarantine_id: &str,
        analyst: &str,
        notes: &str,
    ) -> Result<QuarantineRecord> {
        let _guard = self.lock.lock().await;
        self.transition(quarantine_id, QuarantineState::ConfirmedMalicious, analyst, notes)
            .await
    }

    /// Analyst marks the document a false positive and restores it.
    /// The vector-store flag is cleared in the same logical action.
    pub async fn restore_document(
        &self,
        quarantine_id: &str,
        analyst: &str,
        notes: &str,
        store: &VectorStore,
    ) -> Result<QuarantineRecord> {
        let record = {
            let _guard = self.lock.lock().await;
            self.transition(quarantine_id, QuarantineState::Restored, analyst, notes)
                .await?
        };

        store.restore(&record.doc_id).await?;
        Ok(record)
    }

    async fn transition(
        &self,
        quarantine_id: &str,
        to: QuarantineState,
        analyst: &str,
        notes: &str,
    ) -> Result<QuarantineRecord> {
        let q_dir = self.record_dir(quarantine_id);
        if !q_dir.is_dir() {
            return Err(ShieldError::NotFound(quarantine_id.to_string()));
        }

        let mut record = self.load_record(&q_dir).await?;
        if record.state != QuarantineState::Quarantined {
            return Err(ShieldError::InvalidTransition(format!(
                "{} is already {}",
                quarantine_id,
                record.state.label()
            )));
        }

        let previous = record.state;
        record.state = to;
        record.add_audit_entry(to.label(), analyst, notes, Some(previous));

        self.write_record(&q_dir, &record).await?;
        self.append_audit(&q_dir, &record.audit_trail[record.audit_trail.len() - 1])
            .await?;

        Ok(record)
    }

    /// All records, newest first, optionally filtered by state.
    /// Unreadable entries are skipped.
    pub async fn list_quarantined(
        &self,
        state: Option<QuarantineState>,
    ) -> Vec<QuarantineRecord> {
        let mut records = Vec::new();

        let Ok(mut entries) = tokio::fs::read_dir(&self.vault_dir).await else {
            return records;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("Q-") {
                continue;
            }
            let Ok(record) = self.load_record(&path).await else {
                continue;
            };
            if state.map(|s| record.state == s).unwrap_or(true) {
                records.push(record);
            }
        }

        records.sort_by(|a, b| b.quarantined_at.cmp(&a.quarantined_at));
        records
    }

    /// Single record lookup; None when the directory or record is missing
    pub async fn get_record(&self, quarantine_id: &str) -> Option<QuarantineRecord> {
        let q_dir = self.record_dir(quarantine_id);
        if !q_dir.is_dir() {
            return None;
        }
        self.load_record(&q_dir).await.ok()
    }

    /// Total number of vault entries, any state
    pub async fn quarantine_count(&self) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.vault_dir).await else {
            return 0;
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.path().is_dir() && entry.file_name().to_string_lossy().starts_with("Q-") {
                count += 1;
            }
        }
        count
    }

    /// Find the vault directory for a doc_id, if any quarantine exists
    pub async fn find_dir_for_doc(&self, doc_id: &str) -> Option<PathBuf> {
        let suffix = format!("-{}", doc_id);
        let Ok(mut entries) = tokio::fs::read_dir(&self.vault_dir).await else {
            return None;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() && entry.file_name().to_string_lossy().ends_with(&suffix) {
                return Some(path);
            }
        }
        None
    }

    async fn load_record(&self, q_dir: &Path) -> Result<QuarantineRecord> {
        let bytes = tokio::fs::read(q_dir.join("record.json")).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_record(&self, q_dir: &Path, record: &QuarantineRecord) -> Result<()> {
        tokio::fs::write(q_dir.join("record.json"), serde_json::to_vec_pretty(record)?).await?;
        Ok(())
    }

    async fn append_audit(&self, q_dir: &Path, entry: &AuditEntry) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(q_dir.join("audit.jsonl"))
            .await?;
        file.write_all(serde_json::to_string(entry)?.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}
