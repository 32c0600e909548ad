//! Signal 1: Trust score
//! Source reputation lookup against a fixed table

use crate::config::trust_sources;
use crate::store::DocMetadata;

/// Assigns a trust score in [0,1] based on document source.
///
/// Resolution order: exact source match, partial source match (first entry
/// in table order), category match, then the "unknown" default.
#[derive(Debug, Clone)]
pub struct TrustScorer {
    table: Vec<(String, f64)>,
}

impl TrustScorer {
    pub fn new() -> Self {
        Self {
            table: trust_sources(),
        }
    }

    pub fn with_table(table: Vec<(String, f64)>) -> Self {
        Self { table }
    }

    pub fn score(&self, metadata: &DocMetadata) -> f64 {
        let source = if metadata.source.is_empty() {
            "unknown".to_string()
        } else {
            metadata.source.to_lowercase()
        };

        if let Some((_, score)) = self.table.iter().find(|(k, _)| *k == source) {
            return *score;
        }

        // Partial match covers subdomains and keyword-tagged sources
        for (key, score) in &self.table {
            if source.contains(key.as_str()) || key.contains(source.as_str()) {
                return *score;
            }
        }

        if let Some((_, score)) = self.table.iter().find(|(k, _)| *k == metadata.category) {
            return *score;
        }

        self.table
            .iter()
            .find(|(k, _)| k == "unknown")
            .map(|(_, s)| *s)
            .unwrap_or(0.3)
    }
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::new()
    }
}
