//! Error types surfaced by the core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShieldError>;

/// Boundary failures of the detection-and-response core.
///
/// Read paths never surface `Malformed` for individual JSONL lines; those
/// are skipped. Analyst operations are the only callers that see `NotFound`.
#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("quarantine id not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),
}
