//! Signal 2: Red flag detection
//! Multi-layer keyword matching with cross-category amplification

use std::collections::BTreeMap;

use crate::config::red_flag_table;
use crate::store::DocMetadata;

/// Lines in golden documents matching these patterns are instructional
/// negatives ("NEVER disable the firewall"), not policy violations.
const GOLDEN_EXEMPT_PATTERNS: &[&str] = &["never ", "warning:", "- never", "do not "];

/// Detects malicious patterns in document content.
///
/// Categories: security_downgrade, dangerous_permissions, severity_downplay,
/// unsafe_operations, social_engineering.
#[derive(Debug, Clone)]
pub struct RedFlagDetector {
    categories: Vec<(String, Vec<String>)>,
}

impl RedFlagDetector {
    pub fn new() -> Self {
        Self {
            categories: red_flag_table(),
        }
    }

    /// Score in [0,1]: 1.0 is clean, each flag hurts and flags spread
    /// across categories hurt more.
    pub fn score(&self, content: &str, metadata: Option<&DocMetadata>) -> f64 {
        let filtered;
        let content = if metadata.map(|m| m.category == "golden").unwrap_or(false) {
            filtered = filter_golden_warnings(content);
            filtered.as_str()
        } else {
            content
        };

        let content_lower = content.to_lowercase();
        let mut total_flags = 0usize;
        let mut categories_with_flags = 0usize;

        for (_, keywords) in &self.categories {
            let category_flags = keywords
                .iter()
                .filter(|kw| content_lower.contains(&kw.to_lowercase()))
                .count();
            if category_flags > 0 {
                categories_with_flags += 1;
                total_flags += category_flags;
            }
        }

        let max_flags: usize = self.categories.iter().map(|(_, kws)| kws.len()).sum();
        if max_flags == 0 {
            return 1.0;
        }

        // 1.5x amplifier makes each flag hurt more than its raw ratio
        let flag_ratio = total_flags as f64 / max_flags as f64;
        let mut base = 1.0 - flag_ratio * 1.5;

        if categories_with_flags >= 4 {
            base *= 0.60;
        } else if categories_with_flags >= 3 {
            base *= 0.70;
        } else if categories_with_flags >= 2 {
            base *= 0.80;
        }

        base.max(0.0)
    }

    /// Matched keywords by category for reports and logs.
    /// Does not apply the golden-corpus exemption.
    pub fn detect_flags(&self, content: &str) -> (BTreeMap<String, Vec<String>>, usize) {
        let content_lower = content.to_lowercase();
        let mut detected = BTreeMap::new();
        let mut total = 0usize;

        for (category, keywords) in &self.categories {
            let found: Vec<String> = keywords
                .iter()
                .filter(|kw| content_lower.contains(&kw.to_lowercase()))
                .cloned()
                .collect();
            if !found.is_empty() {
                total += found.len();
                detected.insert(category.clone(), found);
            }
        }

        (detected, total)
    }
}

impl Default for RedFlagDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn filter_golden_warnings(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let line_lower = line.to_lowercase();
            let line_lower = line_lower.trim();
            !GOLDEN_EXEMPT_PATTERNS
                .iter()
                .any(|pat| line_lower.contains(pat))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
