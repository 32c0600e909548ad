//! Vector store
//! In-process cosine-similarity store with quarantine-aware retrieval and
//! JSON persistence under the store directory

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::embed::{cosine_similarity, HashEmbedder};
use crate::error::Result;

/// Document metadata. The recognized fields are typed; anything else an
/// ingester attaches survives round-trips in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMetadata {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub cve_ids: String,
    #[serde(default)]
    pub is_quarantined: bool,
    #[serde(default)]
    pub quarantine_id: String,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A document as stored, embedding included
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub doc_id: String,
    pub content: String,
    pub metadata: DocMetadata,
    pub embedding: Vec<f32>,
}

/// A retrieval hit
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocument {
    pub doc_id: String,
    pub content: String,
    pub metadata: DocMetadata,
    pub distance: f32,
    pub embedding: Vec<f32>,
}

/// Single-key equality constraint, the only filter shape the store accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub value: String,
}

impl MetadataFilter {
    fn matches(&self, metadata: &DocMetadata) -> bool {
        match self.key.as_str() {
            "source" => metadata.source == self.value,
            "category" => metadata.category == self.value,
            "filename" => metadata.filename == self.value,
            "cve_ids" => metadata.cve_ids == self.value,
            other => metadata
                .extra
                .get(other)
                .and_then(|v| v.as_str())
                .map(|v| v == self.value)
                .unwrap_or(false),
        }
    }
}

/// Quarantine-aware vector store.
///
/// Documents are soft-deleted only: quarantine flips a metadata flag, the
/// content and embedding stay put so restore is a flag clear.
pub struct VectorStore {
    embedder: HashEmbedder,
    docs: RwLock<HashMap<String, StoredDocument>>,
    store_dir: PathBuf,
}

impl VectorStore {
    /// Open the store, loading any persisted snapshot
    pub async fn open(store_dir: PathBuf, embedding_dim: usize) -> Result<Self> {
        let store = Self {
            embedder: HashEmbedder::new(embedding_dim),
            docs: RwLock::new(HashMap::new()),
            store_dir,
        };

        let snapshot = store.snapshot_path();
        if let Ok(bytes) = tokio::fs::read(&snapshot).await {
            match serde_json::from_slice::<Vec<StoredDocument>>(&bytes) {
                Ok(loaded) => {
                    let mut docs = store.docs.write().await;
                    for doc in loaded {
                        docs.insert(doc.doc_id.clone(), doc);
                    }
                }
                Err(err) => {
                    tracing::warn!("discarding unreadable store snapshot: {}", err);
                }
            }
        }

        Ok(store)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.store_dir.join("documents.json")
    }

    /// Add a document; content is embedded here so ingesters stay dumb
    pub async fn ingest(
        &self,
        doc_id: &str,
        content: &str,
        mut metadata: DocMetadata,
    ) -> Result<()> {
        metadata.is_quarantined = false;
        metadata.quarantine_id = String::new();

        let embedding = self.embedder.embed(content);
        let doc = StoredDocument {
            doc_id: doc_id.to_string(),
            content: content.to_string(),
            metadata,
            embedding,
        };

        self.docs.write().await.insert(doc_id.to_string(), doc);
        self.persist().await
    }

    /// Retrieve up to `k` documents for a query.
    ///
    /// All candidates are ranked by distance first, then quarantine and
    /// metadata filters are applied, so filtering never starves `k`.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        exclude_quarantined: bool,
        filter: Option<&MetadataFilter>,
    ) -> Vec<RetrievedDocument> {
        let query_embedding = self.embedder.embed(query);

        let docs = self.docs.read().await;
        let mut candidates: Vec<(&StoredDocument, f32)> = docs
            .values()
            .map(|doc| {
                let distance = 1.0 - cosine_similarity(&query_embedding, &doc.embedding);
                (doc, distance)
            })
            .collect();
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut results = Vec::with_capacity(k);
        for (doc, distance) in candidates {
            if exclude_quarantined && doc.metadata.is_quarantined {
                continue;
            }
            if let Some(f) = filter {
                if !f.matches(&doc.metadata) {
                    continue;
                }
            }
            results.push(RetrievedDocument {
                doc_id: doc.doc_id.clone(),
                content: doc.content.clone(),
                metadata: doc.metadata.clone(),
                distance,
                embedding: doc.embedding.clone(),
            });
            if results.len() >= k {
                break;
            }
        }

        results
    }

    /// Soft-delete: flag the document out of active retrieval
    pub async fn mark_quarantined(&self, doc_id: &str, quarantine_id: &str) -> Result<()> {
        {
            let mut docs = self.docs.write().await;
            if let Some(doc) = docs.get_mut(doc_id) {
                doc.metadata.is_quarantined = true;
                doc.metadata.quarantine_id = quarantine_id.to_string();
            }
        }
        self.persist().await
    }

    /// Clear the quarantine flag, returning the document to active retrieval
    pub async fn restore(&self, doc_id: &str) -> Result<()> {
        {
            let mut docs = self.docs.write().await;
            if let Some(doc) = docs.get_mut(doc_id) {
                doc.metadata.is_quarantined = false;
                doc.metadata.quarantine_id = String::new();
            }
        }
        self.persist().await
    }

    pub async fn is_quarantined(&self, doc_id: &str) -> bool {
        self.docs
            .read()
            .await
            .get(doc_id)
            .map(|d| d.metadata.is_quarantined)
            .unwrap_or(false)
    }

    /// Full corpus snapshot, embeddings included
    pub async fn get_all_documents(&self) -> Vec<StoredDocument> {
        self.docs.read().await.values().cloned().collect()
    }

    pub async fn get_document_count(&self) -> usize {
        self.docs.read().await.len()
    }

    /// Drop everything, including the persisted snapshot
    pub async fn reset(&self) -> Result<()> {
        self.docs.write().await.clear();
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.store_dir).await?;
        let docs = self.docs.read().await;
        let mut snapshot: Vec<&StoredDocument> = docs.values().collect();
        snapshot.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        let bytes = serde_json::to_vec(&snapshot)?;

        let mut file = tokio::fs::File::create(self.snapshot_path()).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metadata(source: &str, category: &str) -> DocMetadata {
        DocMetadata {
            source: source.to_string(),
            category: category.to_string(),
            ..Default::default()
        }
    }

    async fn store(dir: &TempDir) -> VectorStore {
        VectorStore::open(dir.path().join("vector_store"), 384)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .ingest("doc-1", "MySQL security hardening guide", metadata("clean", "clean"))
            .await
            .unwrap();
        store
            .ingest("doc-2", "Kernel scheduler internals", metadata("clean", "clean"))
            .await
            .unwrap();

        let results = store.retrieve("MySQL security", 1, true, None).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "doc-1");
    }

    #[tokio::test]
    async fn test_quarantined_docs_are_excluded() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .ingest("doc-1", "disable firewall for testing", metadata("poisoned", "poisoned"))
            .await
            .unwrap();
        store.mark_quarantined("doc-1", "Q-x-doc-1").await.unwrap();

        assert!(store.is_quarantined("doc-1").await);
        let results = store.retrieve("firewall", 5, true, None).await;
        assert!(results.is_empty());

        let unsafe_results = store.retrieve("firewall", 5, false, None).await;
        assert_eq!(unsafe_results.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_clears_flag() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .ingest("doc-y", "patch guidance", metadata("clean", "clean"))
            .await
            .unwrap();
        store.mark_quarantined("doc-y", "Q-x-doc-y").await.unwrap();
        store.restore("doc-y").await.unwrap();

        assert!(!store.is_quarantined("doc-y").await);
        let results = store.retrieve("patch guidance", 5, true, None).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_filter_restricts_results() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut m1 = metadata("nvd.nist.gov", "clean");
        m1.cve_ids = "CVE-2024-0004".to_string();
        let mut m2 = metadata("nvd.nist.gov", "clean");
        m2.cve_ids = "CVE-2024-0005".to_string();

        store.ingest("doc-4", "CVE-2024-0004 advisory", m1).await.unwrap();
        store.ingest("doc-5", "CVE-2024-0005 advisory", m2).await.unwrap();

        let filter = MetadataFilter {
            key: "cve_ids".to_string(),
            value: "CVE-2024-0004".to_string(),
        };
        let results = store.retrieve("mitigation", 5, true, Some(&filter)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "doc-4");
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir).await;
            store
                .ingest("doc-1", "persisted content", metadata("clean", "clean"))
                .await
                .unwrap();
        }
        let reopened = store(&dir).await;
        assert_eq!(reopened.get_document_count().await, 1);
    }
}
