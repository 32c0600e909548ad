//! Signal 3: Anomaly score
//! Source frequency and trust variance against the corpus distribution

use crate::store::{DocMetadata, StoredDocument};
use crate::trust::TrustScorer;

/// Flags documents from unusual source clusters or with trust scores far
/// from the corpus mean.
#[derive(Debug, Clone, Default)]
pub struct AnomalyScorer;

impl AnomalyScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score in [0,1]: 1.0 is normal, low values are statistical outliers.
    /// Corpora under 3 documents are too small to judge.
    pub fn score(
        &self,
        doc_metadata: &DocMetadata,
        corpus: &[StoredDocument],
        trust: &TrustScorer,
    ) -> f64 {
        if corpus.len() < 3 {
            return 1.0;
        }

        let doc_source = if doc_metadata.source.is_empty() {
            "unknown"
        } else {
            doc_metadata.source.as_str()
        };

        let matching = corpus
            .iter()
            .filter(|d| source_of(&d.metadata) == doc_source)
            .count();
        let doc_frequency = matching as f64 / corpus.len() as f64;

        // Sources under 20% of the corpus score proportionally lower
        let frequency_score = (doc_frequency / 0.2).min(1.0);

        let trust_scores: Vec<f64> = corpus.iter().map(|d| trust.score(&d.metadata)).collect();
        let variance_score = if trust_scores.len() >= 3 {
            let mean = trust_scores.iter().sum::<f64>() / trust_scores.len() as f64;
            let var = trust_scores
                .iter()
                .map(|t| (t - mean).powi(2))
                .sum::<f64>()
                / (trust_scores.len() - 1) as f64;
            let std = var.sqrt();
            if std > 0.0 {
                let doc_trust = trust.score(doc_metadata);
                let z = (doc_trust - mean).abs() / std;
                (1.0 - z / 3.0).max(0.0)
            } else {
                1.0
            }
        } else {
            1.0
        };

        frequency_score * 0.6 + variance_score * 0.4
    }
}

fn source_of(metadata: &DocMetadata) -> &str {
    if metadata.source.is_empty() {
        "unknown"
    } else {
        metadata.source.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, source: &str) -> StoredDocument {
        StoredDocument {
            doc_id: id.to_string(),
            content: String::new(),
            metadata: DocMetadata {
                source: source.to_string(),
                ..Default::default()
            },
            embedding: vec![],
        }
    }

    #[test]
    fn test_small_corpus_is_neutral() {
        let scorer = AnomalyScorer::new();
        let trust = TrustScorer::new();
        let corpus = vec![doc("a", "clean"), doc("b", "clean")];
        assert_eq!(scorer.score(&corpus[0].metadata, &corpus, &trust), 1.0);
    }

    #[test]
    fn test_dominant_source_scores_high() {
        let scorer = AnomalyScorer::new();
        let trust = TrustScorer::new();
        let corpus: Vec<StoredDocument> =
            (0..10).map(|i| doc(&format!("d{i}"), "clean")).collect();
        let score = scorer.score(&corpus[0].metadata, &corpus, &trust);
        // Uniform corpus: frequency saturated, zero variance
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rare_source_scores_lower() {
        let scorer = AnomalyScorer::new();
        let trust = TrustScorer::new();
        let mut corpus: Vec<StoredDocument> =
            (0..9).map(|i| doc(&format!("d{i}"), "nvd.nist.gov")).collect();
        corpus.push(doc("odd", "poisoned"));

        let rare = scorer.score(&corpus[9].metadata, &corpus, &trust);
        let common = scorer.score(&corpus[0].metadata, &corpus, &trust);
        assert!(rare < common);
        // 1 of 10 -> frequency component (0.1/0.2)*0.6 = 0.3 at most
        assert!(rare < 0.5);
    }

    #[test]
    fn test_severity_monotone_in_frequency() {
        let scorer = AnomalyScorer::new();
        let trust = TrustScorer::new();
        let corpus: Vec<StoredDocument> = (0..5)
            .map(|i| doc(&format!("d{i}"), "clean"))
            .chain(std::iter::once(doc("x", "internal_kb")))
            .collect();
        let freq_1_of_6 = scorer.score(&corpus[5].metadata, &corpus, &trust);
        let freq_5_of_6 = scorer.score(&corpus[0].metadata, &corpus, &trust);
        assert!(freq_1_of_6 <= freq_5_of_6);
    }
}
