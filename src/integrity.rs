//! Integrity engine
//! Combines the four signals and applies the quarantine trigger rule
//!
//! Signals and weights:
//! 1. Trust (0.25) - source reputation
//! 2. Red flag (0.35) - keyword detection, highest weight
//! 3. Anomaly (0.15) - statistical outlier detection
//! 4. Semantic drift (0.25) - golden corpus similarity
//!
//! Trigger rule: 2 of 4 signals below threshold -> quarantine. One poor
//! signal is not enough; two independent concerns are.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyScorer;
use crate::config::SIGNAL_WEIGHTS;
use crate::drift::SemanticDriftDetector;
use crate::red_flags::RedFlagDetector;
use crate::store::{DocMetadata, RetrievedDocument, StoredDocument};
use crate::trust::TrustScorer;

/// The four integrity scores for a document, each in [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegritySignals {
    pub trust_score: f64,
    pub red_flag_score: f64,
    pub anomaly_score: f64,
    pub semantic_drift_score: f64,
}

impl IntegritySignals {
    /// Weighted combination of the four signals
    pub fn combined_score(&self) -> f64 {
        SIGNAL_WEIGHTS.trust * self.trust_score
            + SIGNAL_WEIGHTS.red_flag * self.red_flag_score
            + SIGNAL_WEIGHTS.anomaly * self.anomaly_score
            + SIGNAL_WEIGHTS.semantic * self.semantic_drift_score
    }

    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("trust", self.trust_score),
            ("red_flag", self.red_flag_score),
            ("anomaly", self.anomaly_score),
            ("semantic_drift", self.semantic_drift_score),
        ]
    }

    /// True iff at least 2 of the 4 signals are strictly below `threshold`
    pub fn should_quarantine(&self, threshold: f64) -> bool {
        self.named().iter().filter(|(_, v)| *v < threshold).count() >= 2
    }

    /// Names and two-decimal values of signals below `threshold`
    pub fn low_signals(&self, threshold: f64) -> Vec<String> {
        self.named()
            .iter()
            .filter(|(_, v)| *v < threshold)
            .map(|(name, v)| format!("{} ({:.2})", name, v))
            .collect()
    }

    fn low_signal_count(&self, threshold: f64) -> usize {
        self.named().iter().filter(|(_, v)| *v < threshold).count()
    }
}

/// Severity classification for reports; the trigger rule never consults it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Clean,
    Suspicious,
    Malicious,
    Critical,
}

/// Per-signal breakdown plus the combined score
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub trust: f64,
    pub red_flag: f64,
    pub anomaly: f64,
    pub semantic_drift: f64,
    pub combined: f64,
}

/// Red flag detail attached to reports
#[derive(Debug, Clone, Serialize)]
pub struct RedFlagBreakdown {
    pub detected: BTreeMap<String, Vec<String>>,
    pub total_count: usize,
    pub categories_affected: usize,
}

/// Detailed integrity report for dashboards and logs
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub doc_id: String,
    pub scores: ScoreBreakdown,
    pub should_quarantine: bool,
    pub low_signals: Vec<String>,
    pub red_flags: RedFlagBreakdown,
    pub severity: Severity,
}

/// Runs all four scorers and applies the trigger rule
pub struct IntegrityEngine {
    threshold: f64,
    trust: TrustScorer,
    red_flags: RedFlagDetector,
    anomaly: AnomalyScorer,
    drift: SemanticDriftDetector,
}

impl IntegrityEngine {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            trust: TrustScorer::new(),
            red_flags: RedFlagDetector::new(),
            anomaly: AnomalyScorer::new(),
            drift: SemanticDriftDetector::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn drift_detector(&self) -> &SemanticDriftDetector {
        &self.drift
    }

    /// Compute all four signals. No short-circuit: every signal is always
    /// evaluated so reports and logs stay complete.
    pub fn evaluate_document(
        &self,
        content: &str,
        metadata: &DocMetadata,
        embedding: Option<&[f32]>,
        corpus: &[StoredDocument],
    ) -> IntegritySignals {
        let trust_score = self.trust.score(metadata);
        let red_flag_score = self.red_flags.score(content, Some(metadata));
        let anomaly_score = self.anomaly.score(metadata, corpus, &self.trust);
        let semantic_drift_score = self.drift.score(embedding);

        IntegritySignals {
            trust_score,
            red_flag_score,
            anomaly_score,
            semantic_drift_score,
        }
    }

    /// Evaluate a batch of retrieved documents against one corpus snapshot
    pub fn evaluate_batch(
        &self,
        documents: &[RetrievedDocument],
        corpus: &[StoredDocument],
    ) -> HashMap<String, IntegritySignals> {
        documents
            .iter()
            .map(|doc| {
                let signals = self.evaluate_document(
                    &doc.content,
                    &doc.metadata,
                    Some(&doc.embedding),
                    corpus,
                );
                (doc.doc_id.clone(), signals)
            })
            .collect()
    }

    /// Bundle scores, trigger outcome, red flag matches, and severity
    pub fn detailed_report(
        &self,
        doc_id: &str,
        content: &str,
        signals: &IntegritySignals,
    ) -> IntegrityReport {
        let (detected, total_count) = self.red_flags.detect_flags(content);
        let categories_affected = detected.len();

        IntegrityReport {
            doc_id: doc_id.to_string(),
            scores: ScoreBreakdown {
                trust: signals.trust_score,
                red_flag: signals.red_flag_score,
                anomaly: signals.anomaly_score,
                semantic_drift: signals.semantic_drift_score,
                combined: signals.combined_score(),
            },
            should_quarantine: signals.should_quarantine(self.threshold),
            low_signals: signals.low_signals(self.threshold),
            red_flags: RedFlagBreakdown {
                detected,
                total_count,
                categories_affected,
            },
            severity: self.severity(signals),
        }
    }

    /// Severity mapping for reports, not for the trigger
    pub fn severity(&self, signals: &IntegritySignals) -> Severity {
        let combined = signals.combined_score();
        if combined >= 0.7 {
            Severity::Clean
        } else if combined >= 0.5 {
            Severity::Suspicious
        } else if signals.low_signal_count(self.threshold) >= 3 {
            Severity::Critical
        } else {
            Severity::Malicious
        }
    }
}
