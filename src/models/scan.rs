//! Scan lifecycle model: remote statuses, report formats, source settings.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a remote scan, as reported by the provider.
///
/// Only `Finished` is terminal-success; `Failed` and `Canceled` are
/// terminal-failure. Everything else keeps the poll loop running.
/// Unrecognized provider strings are preserved in `Unknown` and treated
/// as non-terminal so new engine stages do not break in-flight runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanStatus {
    New,
    PreScan,
    Queued,
    Scanning,
    PostScan,
    SourcePulling,
    Finished,
    Failed,
    Canceled,
    Unknown(String),
}

impl ScanStatus {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "new" => Self::New,
            "prescan" => Self::PreScan,
            "queued" => Self::Queued,
            "scanning" | "working" => Self::Scanning,
            "postscan" => Self::PostScan,
            "sourcepullinganddeployment" => Self::SourcePulling,
            "finished" => Self::Finished,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Unknown(name.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Canceled)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "{name}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Generation status of a requested report.
///
/// The provider can report failure distinctly from still-pending; `Failed`
/// aborts the run before any byte fetch. Unknown strings keep polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportStatus {
    InProcess,
    Created,
    Failed,
    Unknown(String),
}

impl ReportStatus {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "inprocess" | "in process" => Self::InProcess,
            "created" => Self::Created,
            "failed" | "deleted" => Self::Failed,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// Requested rendering format for a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Xml,
    Pdf,
    Csv,
    Rtf,
}

impl ReportFormat {
    /// File extension for the persisted report artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Pdf => "pdf",
            Self::Csv => "csv",
            Self::Rtf => "rtf",
        }
    }

    /// Format name as the provider's report registration API expects it.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Xml => "XML",
            Self::Pdf => "PDF",
            Self::Csv => "CSV",
            Self::Rtf => "RTF",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "pdf" => Ok(Self::Pdf),
            "csv" => Ok(Self::Csv),
            "rtf" => Ok(Self::Rtf),
            other => Err(format!("unsupported report format: {other}")),
        }
    }
}

/// Source-control binding applied to a project. Overwrite semantics on the
/// provider side, last write wins.
#[derive(Debug, Clone, Serialize)]
pub struct GitSourceSettings {
    pub url: String,
    pub branch: String,
    /// Personal access token; `None` means public/anonymous checkout.
    pub pat: Option<String>,
}

/// Best-effort per-severity result counts for a finished scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStatistics {
    #[serde(rename = "highSeverity", default)]
    pub high: u32,
    #[serde(rename = "mediumSeverity", default)]
    pub medium: u32,
    #[serde(rename = "lowSeverity", default)]
    pub low: u32,
    #[serde(rename = "infoSeverity", default)]
    pub info: u32,
}
