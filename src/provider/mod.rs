//! Remote collaborator seams.
//!
//! The orchestration and upload pipelines talk to the scanning service and
//! the downstream import service only through these traits, so runs can be
//! driven against mocks and the REST transport stays in one place.

pub mod rest;

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::scan::{
    GitSourceSettings, ReportFormat, ReportStatus, ScanStatistics, ScanStatus,
};

/// Scanning service operations, in lifecycle order.
#[async_trait]
pub trait SastProvider: Send + Sync {
    /// Resolve a team by hierarchical path. Teams are administrative
    /// boundaries and are never created by this client.
    async fn team_id_by_full_name(&self, team_full_name: &str)
        -> Result<Option<String>, AppError>;

    /// Look up a project by name within a team.
    async fn project_id_by_name(
        &self,
        project_name: &str,
        team_id: &str,
    ) -> Result<Option<i64>, AppError>;

    /// Create a project with default configuration. Racing creators get a
    /// `Conflict` error and must re-resolve by lookup.
    async fn create_project(&self, project_name: &str, team_id: &str) -> Result<i64, AppError>;

    /// Bind the project to a git source. Overwrite semantics.
    async fn set_git_source(
        &self,
        project_id: i64,
        settings: &GitSourceSettings,
    ) -> Result<(), AppError>;

    async fn set_data_retention(&self, project_id: i64, scans_to_keep: u32)
        -> Result<(), AppError>;

    async fn set_exclusions(
        &self,
        project_id: i64,
        exclude_folders: &str,
        exclude_files: &str,
    ) -> Result<(), AppError>;

    /// Resolve a scan preset by name. The id is used implicitly by scan
    /// creation through the project's stored configuration.
    async fn preset_id_by_name(&self, preset_name: &str) -> Result<Option<i64>, AppError>;

    async fn create_scan(&self, project_id: i64) -> Result<i64, AppError>;

    async fn scan_status(&self, scan_id: i64) -> Result<ScanStatus, AppError>;

    /// Best-effort severity statistics; `None` when the provider has none.
    async fn scan_statistics(&self, scan_id: i64) -> Result<Option<ScanStatistics>, AppError>;

    async fn register_report(&self, scan_id: i64, format: ReportFormat) -> Result<i64, AppError>;

    async fn report_status(&self, report_id: i64) -> Result<ReportStatus, AppError>;

    async fn report_bytes(&self, report_id: i64) -> Result<Vec<u8>, AppError>;

    /// Enumerate rule ids referenced by a completed scan's results. May
    /// contain duplicates; callers deduplicate.
    async fn rule_ids_for_scan(&self, scan_id: i64) -> Result<Vec<u64>, AppError>;

    /// Fetch a rule's documentation markup.
    async fn rule_documentation(&self, rule_id: u64) -> Result<String, AppError>;
}

/// One-time pre-signed write location for a packaged artifact. Fetched
/// fresh per upload, never cached or renewed.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub url: String,
}

/// Downstream ingestion service operations.
#[async_trait]
pub trait ImportProvider: Send + Sync {
    async fn create_upload_target(&self) -> Result<UploadTarget, AppError>;

    async fn upload_archive(&self, target: &UploadTarget, data: Vec<u8>) -> Result<(), AppError>;

    /// Register an import job referencing the uploaded archive, returning
    /// the assigned import identifier.
    async fn register_import(
        &self,
        destination_project_id: &str,
        target: &UploadTarget,
    ) -> Result<String, AppError>;
}
