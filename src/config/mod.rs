use std::env;
use std::path::PathBuf;

use crate::models::scan::ReportFormat;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sast_base_url: String,
    pub sast_token: String,
    pub odata_base_url: String,
    pub import_base_url: String,
    pub import_token: String,
    pub team_full_name: String,
    pub project_name: String,
    pub report_format: ReportFormat,
    pub git_url: String,
    pub git_branch: String,
    pub git_pat: Option<String>,
    pub report_folder: Option<PathBuf>,
    pub destination_project_id: String,
    pub poll_interval_secs: u64,
    pub poll_deadline_secs: u64,
    pub scans_to_keep: u32,
    pub preset_name: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        let sast_base_url = env::var("SAST_BASE_URL")?;
        Ok(Self {
            odata_base_url: env::var("SAST_ODATA_BASE_URL")
                .unwrap_or_else(|_| sast_base_url.clone()),
            sast_base_url,
            sast_token: env::var("SAST_TOKEN")?,
            import_base_url: env::var("IMPORT_BASE_URL")?,
            import_token: env::var("IMPORT_TOKEN")?,
            team_full_name: env::var("TEAM_FULL_NAME")?,
            project_name: env::var("PROJECT_NAME")?,
            report_format: env::var("REPORT_FORMAT")
                .unwrap_or_else(|_| "xml".to_string())
                .parse()
                .unwrap_or(ReportFormat::Xml),
            git_url: env::var("GIT_URL")?,
            git_branch: env::var("GIT_BRANCH")
                .unwrap_or_else(|_| "refs/heads/master".to_string()),
            git_pat: env::var("GIT_PAT").ok(),
            report_folder: env::var("REPORT_FOLDER").ok().map(PathBuf::from),
            destination_project_id: env::var("DESTINATION_PROJECT_ID")?,
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            poll_deadline_secs: env::var("POLL_DEADLINE_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .unwrap_or(3600),
            scans_to_keep: env::var("SCANS_TO_KEEP")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            preset_name: env::var("PRESET_NAME").unwrap_or_else(|_| "All".to_string()),
        })
    }
}
