//! Unified error taxonomy for the scan lifecycle and conversion pipeline.

/// Application error type covering remote orchestration and conversion.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scan failed: {0}")]
    ScanFailed(String),

    #[error("Report generation failed: {0}")]
    ReportFailed(String),

    #[error("Timed out waiting for {waiting_for} after {waited_secs}s")]
    Timeout {
        waiting_for: String,
        waited_secs: u64,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provider error: {0}")]
    Provider(#[from] reqwest::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Zip(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Check if this error represents a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error represents a poll deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error represents a terminal remote scan failure.
    pub fn is_scan_failed(&self) -> bool {
        matches!(self, Self::ScanFailed(_))
    }
}
