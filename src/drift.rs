//! Signal 4: Semantic drift
//! Embedding similarity against a cached golden reference set

use std::sync::{Arc, RwLock};

use crate::embed::cosine_similarity;
use crate::store::StoredDocument;

/// Compares document embeddings to the golden corpus baseline.
///
/// The cache is written at startup and on reset/reload; scorers read an
/// immutable snapshot, so scoring itself never blocks on I/O.
pub struct SemanticDriftDetector {
    golden: RwLock<Arc<Vec<Vec<f32>>>>,
}

impl SemanticDriftDetector {
    pub fn new() -> Self {
        Self {
            golden: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Rebuild the reference set from the corpus. Golden documents are
    /// preferred; if none exist, clean documents serve as the baseline.
    pub fn load_reference(&self, corpus: &[StoredDocument]) {
        let mut golden: Vec<Vec<f32>> = corpus
            .iter()
            .filter(|d| d.metadata.category == "golden" || d.metadata.source.contains("golden"))
            .filter(|d| !d.embedding.is_empty() && has_norm(&d.embedding))
            .map(|d| d.embedding.clone())
            .collect();

        if golden.is_empty() {
            golden = corpus
                .iter()
                .filter(|d| d.metadata.category == "clean")
                .filter(|d| !d.embedding.is_empty() && has_norm(&d.embedding))
                .map(|d| d.embedding.clone())
                .collect();
        }

        let mut slot = match self.golden.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Arc::new(golden);
    }

    pub fn reference_len(&self) -> usize {
        self.snapshot().len()
    }

    /// Score in [0,1]: the maximum cosine similarity to any reference
    /// vector, shifted from [-1,1]. One close golden neighbor certifies the
    /// document. Neutral 0.5 when no baseline or no usable embedding.
    pub fn score(&self, doc_embedding: Option<&[f32]>) -> f64 {
        let golden = self.snapshot();
        let embedding = match doc_embedding {
            Some(e) if !e.is_empty() && has_norm(e) => e,
            _ => return 0.5,
        };
        if golden.is_empty() {
            return 0.5;
        }

        let max_sim = golden
            .iter()
            .filter(|g| has_norm(g))
            .map(|g| cosine_similarity(embedding, g))
            .fold(f32::NEG_INFINITY, f32::max);

        if max_sim == f32::NEG_INFINITY {
            return 0.5;
        }
        (max_sim as f64 + 1.0) / 2.0
    }

    fn snapshot(&self) -> Arc<Vec<Vec<f32>>> {
        match self.golden.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for SemanticDriftDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn has_norm(v: &[f32]) -> bool {
    v.iter().any(|&x| x != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use crate::store::DocMetadata;

    fn doc(id: &str, category: &str, source: &str, embedding: Vec<f32>) -> StoredDocument {
        StoredDocument {
            doc_id: id.to_string(),
            content: String::new(),
            metadata: DocMetadata {
                category: category.to_string(),
                source: source.to_string(),
                ..Default::default()
            },
            embedding,
        }
    }

    #[test]
    fn test_neutral_without_reference() {
        let detector = SemanticDriftDetector::new();
        assert_eq!(detector.score(Some(&[1.0, 0.0])), 0.5);
    }

    #[test]
    fn test_neutral_without_embedding() {
        let detector = SemanticDriftDetector::new();
        detector.load_reference(&[doc("g", "golden", "golden", vec![1.0, 0.0])]);
        assert_eq!(detector.score(None), 0.5);
        assert_eq!(detector.score(Some(&[0.0, 0.0])), 0.5);
    }

    #[test]
    fn test_identical_embedding_scores_one() {
        let detector = SemanticDriftDetector::new();
        let embedder = HashEmbedder::new(384);
        let golden = embedder.embed("keep the firewall enabled");
        detector.load_reference(&[doc("g", "golden", "golden", golden.clone())]);
        let score = detector.score(Some(&golden));
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_max_not_mean() {
        let detector = SemanticDriftDetector::new();
        detector.load_reference(&[
            doc("g1", "golden", "golden", vec![1.0, 0.0]),
            doc("g2", "golden", "golden", vec![-1.0, 0.0]),
        ]);
        // Opposite reference vectors would average to 0.5; max picks the close one
        let score = detector.score(Some(&[1.0, 0.0]));
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_clean_fallback_when_no_golden() {
        let detector = SemanticDriftDetector::new();
        detector.load_reference(&[
            doc("c1", "clean", "clean", vec![0.0, 1.0]),
            doc("p1", "poisoned", "poisoned", vec![1.0, 0.0]),
        ]);
        assert_eq!(detector.reference_len(), 1);
        let score = detector.score(Some(&[0.0, 1.0]));
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_golden_source_substring_included() {
        let detector = SemanticDriftDetector::new();
        detector.load_reference(&[doc("g", "reference", "golden-baseline", vec![1.0, 0.0])]);
        assert_eq!(detector.reference_len(), 1);
    }

    #[test]
    fn test_zero_norm_reference_vectors_skipped() {
        let detector = SemanticDriftDetector::new();
        detector.load_reference(&[
            doc("g1", "golden", "golden", vec![0.0, 0.0]),
            doc("g2", "golden", "golden", vec![1.0, 0.0]),
        ]);
        assert_eq!(detector.reference_len(), 1);
    }
}
