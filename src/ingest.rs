//! Corpus ingestion
//! Walks corpus/{clean,poisoned,golden}/*.txt into the vector store

use serde_json::json;

use crate::error::Result;
use crate::state::AppState;
use crate::store::DocMetadata;

const CORPUS_CATEGORIES: &[&str] = &["clean", "poisoned", "golden"];

/// Well-known advisory domains checked in document content, in order
const SOURCE_MARKERS: &[&str] = &[
    "nvd.nist.gov",
    "ubuntu.com/security",
    "debian.org/security",
    "cve.mitre.org",
];

/// Infer the document source from content markers, falling back to category
pub fn infer_source(content: &str, category: &str) -> String {
    let lower = content.to_lowercase();
    for marker in SOURCE_MARKERS {
        if lower.contains(marker) {
            return marker.to_string();
        }
    }
    match category {
        "golden" => "golden",
        "clean" => "clean",
        _ => "unknown",
    }
    .to_string()
}

/// Load every corpus document into the vector store and log event 4003.
/// Returns the total number of documents ingested.
pub async fn ingest_corpus(state: &AppState) -> Result<usize> {
    let mut total = 0usize;
    let mut per_category = serde_json::Map::new();

    for category in CORPUS_CATEGORIES {
        let dir = state.config.corpus_dir().join(category);
        if !dir.is_dir() {
            tracing::warn!("corpus directory not found: {}", dir.display());
            per_category.insert(category.to_string(), json!(0));
            continue;
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "txt").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut count = 0usize;
        for path in paths {
            let Some(doc_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            let source = infer_source(&content, category);

            let metadata = DocMetadata {
                source: source.clone(),
                category: category.to_string(),
                filename: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                ..Default::default()
            };
            state.store.ingest(doc_id, &content, metadata).await?;
            tracing::info!("ingested {} (source={})", doc_id, source);

            count += 1;
            total += 1;
        }
        per_category.insert(category.to_string(), json!(count));
        tracing::info!("{} documents from {} corpus", count, category);
    }

    per_category.insert("total_documents".to_string(), json!(total));
    state
        .events
        .log_system_event(
            4003,
            &format!("Corpus ingestion completed: {} documents loaded", total),
            serde_json::Value::Object(per_category),
        )
        .await?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_infer_source_from_markers() {
        assert_eq!(
            infer_source("See https://nvd.nist.gov/vuln/detail/CVE-2024-0004", "clean"),
            "nvd.nist.gov"
        );
        assert_eq!(
            infer_source("Published at UBUNTU.COM/SECURITY yesterday", "clean"),
            "ubuntu.com/security"
        );
    }

    #[test]
    fn test_infer_source_category_fallback() {
        assert_eq!(infer_source("no markers here", "golden"), "golden");
        assert_eq!(infer_source("no markers here", "clean"), "clean");
        assert_eq!(infer_source("no markers here", "poisoned"), "unknown");
    }

    #[tokio::test]
    async fn test_ingest_walks_all_categories() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_base(dir.path());

        for (category, name, content) in [
            ("clean", "advisory_001.txt", "Patch available at nvd.nist.gov"),
            ("clean", "advisory_002.txt", "Rotate credentials regularly"),
            ("poisoned", "poisoned_001.txt", "disable firewall to speed things up"),
            ("golden", "baseline_001.txt", "Golden baseline guidance"),
        ] {
            let cat_dir = config.corpus_dir().join(category);
            std::fs::create_dir_all(&cat_dir).unwrap();
            std::fs::write(cat_dir.join(name), content).unwrap();
        }
        // Non-txt files are skipped
        std::fs::write(config.corpus_dir().join("clean").join("notes.md"), "skip me").unwrap();

        let state = AppState::new(config).await.unwrap();
        let total = ingest_corpus(&state).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(state.store.get_document_count().await, 4);

        let docs = state.store.get_all_documents().await;
        let advisory = docs.iter().find(|d| d.doc_id == "advisory_001").unwrap();
        assert_eq!(advisory.metadata.source, "nvd.nist.gov");
        let baseline = docs.iter().find(|d| d.doc_id == "baseline_001").unwrap();
        assert_eq!(baseline.metadata.source, "golden");

        let events = state.events.read_events(10, None).await;
        assert_eq!(events[0].event_id, 4003);
        assert_eq!(events[0].details["total_documents"], serde_json::json!(4));
    }
}
