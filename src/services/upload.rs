//! Result upload pipeline.
//!
//! Serializes the converted report, packages it as a single-entry zip
//! archive, and pushes it through the import service: fresh pre-signed
//! target, transfer, import registration.

use std::io::{Cursor, Write};

use tracing::info;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::errors::AppError;
use crate::parsers::sarif::SarifLog;
use crate::provider::ImportProvider;

/// Archive entry name the import service expects.
pub const REPORT_ENTRY_NAME: &str = "report.sarif";

pub struct UploadPipeline<I: ImportProvider> {
    provider: I,
}

impl<I: ImportProvider> UploadPipeline<I> {
    pub fn new(provider: I) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &I {
        &self.provider
    }

    /// Package and submit a report, returning the assigned import id.
    /// Every call requests a new upload target; targets are one-time
    /// write locations and are never reused.
    pub async fn upload(
        &self,
        report: &SarifLog,
        destination_project_id: &str,
    ) -> Result<String, AppError> {
        let serialized = serde_json::to_vec(report)?;
        let archive = build_archive(REPORT_ENTRY_NAME, &serialized)?;
        info!(archive_bytes = archive.len(), "report packaged");

        let target = self.provider.create_upload_target().await?;
        self.provider.upload_archive(&target, archive).await?;

        let import_id = self
            .provider
            .register_import(destination_project_id, &target)
            .await?;
        info!(%import_id, destination_project_id, "import registered");
        Ok(import_id)
    }
}

/// Build a single-entry zip archive in memory. Timestamp is pinned to the
/// zip format's epoch so identical content yields identical archive bytes.
pub fn build_archive(entry_name: &str, data: &[u8]) -> Result<Vec<u8>, AppError> {
    let fixed_time = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
        .map_err(|_| AppError::Zip("fixed archive timestamp out of range".to_string()))?;
    let options = FileOptions::<()>::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(fixed_time)
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(entry_name, options)
        .map_err(|e| AppError::Zip(e.to_string()))?;
    writer.write_all(data)?;
    let cursor = writer.finish().map_err(|e| AppError::Zip(e.to_string()))?;
    Ok(cursor.into_inner())
}
