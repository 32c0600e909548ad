//! Central configuration
//! Paths, thresholds, signal weights, and the trust/red-flag tables

use std::path::PathBuf;

/// Weights for the four integrity signals (must sum to 1.0)
#[derive(Debug, Clone, Copy)]
pub struct SignalWeights {
    pub trust: f64,
    pub red_flag: f64,
    pub anomaly: f64,
    pub semantic: f64,
}

impl SignalWeights {
    pub fn sum(&self) -> f64 {
        self.trust + self.red_flag + self.anomaly + self.semantic
    }
}

/// Fixed signal weights: red-flag detection carries the most weight
pub const SIGNAL_WEIGHTS: SignalWeights = SignalWeights {
    trust: 0.25,
    red_flag: 0.35,
    anomaly: 0.15,
    semantic: 0.25,
};

/// Blast radius severity thresholds, scanned most-severe first.
/// CRITICAL and HIGH match on queries OR users; MEDIUM requires both.
pub const BLAST_RADIUS_THRESHOLDS: &[(&str, usize, usize)] = &[
    ("CRITICAL", 20, 10),
    ("HIGH", 5, 3),
    ("MEDIUM", 1, 1),
];

/// System configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub api_addr: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub embedding_dim: usize,
    pub integrity_threshold: f64,
    pub quarantine_warning_threshold: f64,
    pub lineage_lookback_hours: i64,
    pub query_boost_factor: usize,
    pub retrieval_k: usize,
}

impl Config {
    /// Configuration rooted at `base_dir`; all on-disk state lives below it
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            api_addr: "0.0.0.0:8000".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "mistral".to_string(),
            embedding_dim: 384,
            integrity_threshold: 0.5,
            quarantine_warning_threshold: 0.7,
            lineage_lookback_hours: 24,
            query_boost_factor: 3,
            retrieval_k: 5,
        }
    }

    /// Configuration from environment, falling back to `./data`
    pub fn from_env() -> Self {
        let base = std::env::var("RAGSHIELD_BASE").unwrap_or_else(|_| "data".to_string());
        let mut cfg = Self::with_base(base);
        if let Ok(addr) = std::env::var("RAGSHIELD_ADDR") {
            cfg.api_addr = addr;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            cfg.ollama_base_url = url;
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            cfg.ollama_model = model;
        }
        cfg
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn event_log_file(&self) -> PathBuf {
        self.logs_dir().join("events.jsonl")
    }

    pub fn lineage_log_file(&self) -> PathBuf {
        self.logs_dir().join("query_lineage.jsonl")
    }

    pub fn vault_dir(&self) -> PathBuf {
        self.base_dir.join("quarantine_vault")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("vector_store")
    }

    pub fn corpus_dir(&self) -> PathBuf {
        self.base_dir.join("corpus")
    }
}

/// Source reputation table. Order matters: partial matches resolve to the
/// first entry in insertion order.
pub fn trust_sources() -> Vec<(String, f64)> {
    [
        ("nvd.nist.gov", 1.0),
        ("cve.mitre.org", 1.0),
        ("ubuntu.com/security", 0.9),
        ("redhat.com/security", 0.9),
        ("debian.org/security", 0.9),
        ("microsoft.com/security", 0.85),
        ("github.com/advisories", 0.8),
        ("internal_kb", 0.9),
        ("golden", 0.95),
        ("clean", 0.85),
        ("unknown", 0.3),
        ("poisoned", 0.1), // demo corpora
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Red flag keyword table, partitioned into five categories
pub fn red_flag_table() -> Vec<(String, Vec<String>)> {
    let table: &[(&str, &[&str])] = &[
        (
            "security_downgrade",
            &[
                "disable firewall",
                "turn off waf",
                "skip security scan",
                "stop firewalld",
                "systemctl stop",
                "ufw disable",
                "temporarily disable security",
                "bypass security",
                "disable antivirus",
            ],
        ),
        (
            "dangerous_permissions",
            &[
                "chmod 777",
                "chmod -r 777",
                "chmod -R 777",
                "permissive permissions",
                "world-writable",
                "grant full access",
                "0777",
            ],
        ),
        (
            "severity_downplay",
            &[
                "low priority",
                "not urgent",
                "ignore this cve",
                "can be deferred",
                "no immediate action",
                "largely mitigated",
                "low-medium severity",
                "adequate protection",
                "next maintenance window",
            ],
        ),
        (
            "unsafe_operations",
            &[
                "skip verification",
                "bypass check",
                "disable validation",
                "without security modules",
                "run as root",
                "disable selinux",
                "disable apparmor",
                "ignore warning",
            ],
        ),
        (
            "social_engineering",
            &[
                "trust this source",
                "urgent action required",
                "verify later",
                "verified by community",
                "everyone uses this",
                "no need to check",
                "pre-approved",
                "already validated",
            ],
        ),
    ];

    table
        .iter()
        .map(|(cat, kws)| {
            (
                cat.to_string(),
                kws.iter().map(|k| k.to_string()).collect(),
            )
        })
        .collect()
}
