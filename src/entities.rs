//! Entity extraction
//! Pulls CVE identifiers out of queries and document text

use std::sync::LazyLock;

use regex::Regex;

// CVE-YYYY-N{1,7}, e.g. CVE-2024-0004, cve-2022-1
static CVE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)CVE-\d{4}-\d{1,7}").expect("static CVE pattern"));

/// Extract CVE IDs, uppercased, first-occurrence order, deduplicated
pub fn extract_cve_ids(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for m in CVE_PATTERN.find_iter(text) {
        let normalized = m.as_str().to_uppercase();
        if seen.insert(normalized.clone()) {
            result.push(normalized);
        }
    }
    result
}

pub fn has_cve_id(text: &str) -> bool {
    CVE_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_single_cve() {
        assert_eq!(extract_cve_ids("How to fix CVE-2024-0004?"), vec!["CVE-2024-0004"]);
    }

    #[test]
    fn test_extract_multiple_cves() {
        assert_eq!(
            extract_cve_ids("CVE-2024-0001 and CVE-2024-0002 are related"),
            vec!["CVE-2024-0001", "CVE-2024-0002"]
        );
    }

    #[test]
    fn test_lowercase_is_normalized() {
        assert_eq!(extract_cve_ids("Check cve-2024-0004 for details"), vec!["CVE-2024-0004"]);
    }

    #[test]
    fn test_mixed_case() {
        assert_eq!(
            extract_cve_ids("Compare CVE-2024-0001 with cve-2024-0002"),
            vec!["CVE-2024-0001", "CVE-2024-0002"]
        );
    }

    #[test]
    fn test_duplicates_removed_order_preserved() {
        assert_eq!(
            extract_cve_ids("CVE-2024-0004 is critical. CVE-2024-0004 affects MySQL."),
            vec!["CVE-2024-0004"]
        );
    }

    #[test]
    fn test_varying_digit_lengths() {
        assert_eq!(
            extract_cve_ids("CVE-2024-1 and CVE-2024-12345 and CVE-2024-1234567"),
            vec!["CVE-2024-1", "CVE-2024-12345", "CVE-2024-1234567"]
        );
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let first = extract_cve_ids("cve-2024-0004 and CVE-2024-0005");
        let again = extract_cve_ids(&first.join(" "));
        assert_eq!(first, again);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_cve_ids("").is_empty());
        assert!(extract_cve_ids("No CVEs here").is_empty());
    }

    #[test]
    fn test_punctuation_around_ids() {
        for text in ["(CVE-2024-0004)", "[CVE-2024-0004]", "CVE-2024-0004!", "CVE-2024-0004."] {
            assert_eq!(extract_cve_ids(text), vec!["CVE-2024-0004"]);
        }
    }

    #[test]
    fn test_has_cve_id() {
        assert!(has_cve_id("CVE-2024-0004"));
        assert!(!has_cve_id("General security question"));
    }
}
