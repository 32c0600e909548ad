//! Query preprocessing
//! Term boosting for identifiers plus exact-match metadata filters

use serde::Serialize;

use crate::entities::{extract_cve_ids, has_cve_id};
use crate::store::MetadataFilter;

/// Query intent, for routing and dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    CveLookup,
    Comparison,
    General,
}

/// Repeat each CVE ID `boost_factor` times ahead of the original query.
/// Embedding models weight frequent terms higher, which biases retrieval
/// toward exact-identifier documents.
pub fn augment_query(query: &str, boost_factor: usize) -> String {
    let cve_ids = extract_cve_ids(query);
    if cve_ids.is_empty() {
        return query.to_string();
    }

    let mut boosted: Vec<&str> = Vec::with_capacity(cve_ids.len() * boost_factor + 1);
    for cve_id in &cve_ids {
        for _ in 0..boost_factor {
            boosted.push(cve_id);
        }
    }
    format!("{} {}", boosted.join(" "), query)
}

/// Exact-equality constraint on the first CVE ID, if any. Only the first is
/// used: the store holds a single CVE per document.
pub fn create_metadata_filter(query: &str) -> Option<MetadataFilter> {
    let cve_ids = extract_cve_ids(query);
    cve_ids.into_iter().next().map(|cve| MetadataFilter {
        key: "cve_ids".to_string(),
        value: cve,
    })
}

/// Full preprocessing: (augmented query, optional exact-match filter)
pub fn process_query(query: &str, boost_factor: usize) -> (String, Option<MetadataFilter>) {
    let filter = create_metadata_filter(query);
    let augmented = augment_query(query, boost_factor);
    (augmented, filter)
}

/// Coarse intent classification
pub fn query_type(query: &str) -> QueryType {
    if has_cve_id(query) {
        let lower = query.to_lowercase();
        if ["compare", "vs", "versus", "difference"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            return QueryType::Comparison;
        }
        return QueryType::CveLookup;
    }
    QueryType::General
}
