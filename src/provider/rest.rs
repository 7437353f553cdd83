//! REST implementations of the provider seams.
//!
//! Bearer-token `reqwest` clients for the scanning service (REST + OData
//! surfaces) and the import service. Idempotent GETs retry a bounded number
//! of times with doubling delay on connectivity errors, 429 and 5xx;
//! creates (project, scan, report, import) are never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::errors::AppError;
use crate::models::scan::{
    GitSourceSettings, ReportFormat, ReportStatus, ScanStatistics, ScanStatus,
};
use crate::provider::{ImportProvider, SastProvider, UploadTarget};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Scanning service client.
pub struct RestSastProvider {
    http: reqwest::Client,
    base_url: String,
    odata_base_url: String,
    token: String,
}

impl RestSastProvider {
    pub fn new(base_url: &str, odata_base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            odata_base_url: odata_base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// GET with bounded retry. Returns the raw response so callers can map
    /// 404 to `None` where absence is a valid answer.
    async fn get_response(&self, url: &str) -> Result<reqwest::Response, AppError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1u32;
        loop {
            match self.http.get(url).bearer_auth(&self.token).send().await {
                Ok(resp)
                    if resp.status() == StatusCode::TOO_MANY_REQUESTS
                        || resp.status().is_server_error() =>
                {
                    if attempt >= RETRY_ATTEMPTS {
                        resp.error_for_status()?;
                        return Err(AppError::Internal("retry budget exhausted".to_string()));
                    }
                    warn!(url, status = %resp.status(), attempt, "retrying GET");
                }
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt >= RETRY_ATTEMPTS || !(e.is_connect() || e.is_timeout()) {
                        return Err(e.into());
                    }
                    warn!(url, error = %e, attempt, "retrying GET after transport error");
                }
            }
            tokio::time::sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let resp = self.get_response(url).await?.error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, AppError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            return Err(AppError::Conflict(format!("POST {url} returned 409")));
        }
        Ok(resp.error_for_status()?.json().await?)
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(), AppError> {
        self.http
            .post(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TeamDto {
    id: serde_json::Value,
    #[serde(rename = "fullName")]
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct IdDto {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PresetDto {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ScanDetailDto {
    status: NamedStatusDto,
}

#[derive(Debug, Deserialize)]
struct NamedStatusDto {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ReportRegistrationDto {
    #[serde(rename = "reportId")]
    report_id: i64,
}

#[derive(Debug, Deserialize)]
struct ReportStatusDto {
    status: ValuedStatusDto,
}

#[derive(Debug, Deserialize)]
struct ValuedStatusDto {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ODataResultsDto {
    value: Vec<ODataResultRowDto>,
}

#[derive(Debug, Deserialize)]
struct ODataResultRowDto {
    #[serde(rename = "QueryId")]
    query_id: u64,
}

/// Team ids are numeric on older servers and GUID strings on newer ones;
/// both are carried as opaque strings.
fn id_to_string(id: &serde_json::Value) -> String {
    match id.as_str() {
        Some(s) => s.to_string(),
        None => id.to_string(),
    }
}

#[async_trait]
impl SastProvider for RestSastProvider {
    async fn team_id_by_full_name(
        &self,
        team_full_name: &str,
    ) -> Result<Option<String>, AppError> {
        let url = format!("{}/cxrestapi/auth/teams", self.base_url);
        let teams: Vec<TeamDto> = self.get_json(&url).await?;
        Ok(teams
            .iter()
            .find(|t| t.full_name.eq_ignore_ascii_case(team_full_name))
            .map(|t| id_to_string(&t.id)))
    }

    async fn project_id_by_name(
        &self,
        project_name: &str,
        team_id: &str,
    ) -> Result<Option<i64>, AppError> {
        let url = format!(
            "{}/cxrestapi/projects?projectName={project_name}&teamId={team_id}",
            self.base_url
        );
        let resp = self.get_response(&url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let projects: Vec<IdDto> = resp.error_for_status()?.json().await?;
        Ok(projects.first().map(|p| p.id))
    }

    async fn create_project(&self, project_name: &str, team_id: &str) -> Result<i64, AppError> {
        let url = format!("{}/cxrestapi/projects", self.base_url);
        let body = json!({
            "name": project_name,
            "owningTeam": team_id,
            "isPublic": true,
        });
        let created: IdDto = self.post_json(&url, &body).await?;
        Ok(created.id)
    }

    async fn set_git_source(
        &self,
        project_id: i64,
        settings: &GitSourceSettings,
    ) -> Result<(), AppError> {
        let url = format!(
            "{}/cxrestapi/projects/{project_id}/sourceCode/remoteSettings/git",
            self.base_url
        );
        let mut body = json!({
            "url": settings.url,
            "branch": settings.branch,
        });
        if let Some(pat) = &settings.pat {
            body["authentication"] = json!("PAT");
            body["pat"] = json!(pat);
        }
        self.post_unit(&url, &body).await
    }

    async fn set_data_retention(
        &self,
        project_id: i64,
        scans_to_keep: u32,
    ) -> Result<(), AppError> {
        let url = format!(
            "{}/cxrestapi/projects/{project_id}/dataRetentionSettings",
            self.base_url
        );
        self.post_unit(&url, &json!({ "scansToKeep": scans_to_keep }))
            .await
    }

    async fn set_exclusions(
        &self,
        project_id: i64,
        exclude_folders: &str,
        exclude_files: &str,
    ) -> Result<(), AppError> {
        let url = format!(
            "{}/cxrestapi/projects/{project_id}/sourceCode/excludeSettings",
            self.base_url
        );
        let body = json!({
            "excludeFoldersPattern": exclude_folders,
            "excludeFilesPattern": exclude_files,
        });
        self.post_unit(&url, &body).await
    }

    async fn preset_id_by_name(&self, preset_name: &str) -> Result<Option<i64>, AppError> {
        let url = format!("{}/cxrestapi/sast/presets", self.base_url);
        let presets: Vec<PresetDto> = self.get_json(&url).await?;
        Ok(presets
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(preset_name))
            .map(|p| p.id))
    }

    async fn create_scan(&self, project_id: i64) -> Result<i64, AppError> {
        let url = format!("{}/cxrestapi/sast/scans", self.base_url);
        let body = json!({
            "projectId": project_id,
            "isIncremental": false,
            "isPublic": true,
            "forceScan": true,
        });
        let created: IdDto = self.post_json(&url, &body).await?;
        Ok(created.id)
    }

    async fn scan_status(&self, scan_id: i64) -> Result<ScanStatus, AppError> {
        let url = format!("{}/cxrestapi/sast/scans/{scan_id}", self.base_url);
        let detail: ScanDetailDto = self.get_json(&url).await?;
        Ok(ScanStatus::from_name(&detail.status.name))
    }

    async fn scan_statistics(&self, scan_id: i64) -> Result<Option<ScanStatistics>, AppError> {
        let url = format!(
            "{}/cxrestapi/sast/scans/{scan_id}/resultsStatistics",
            self.base_url
        );
        let resp = self.get_response(&url).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let stats: ScanStatistics = resp.error_for_status()?.json().await?;
        Ok(Some(stats))
    }

    async fn register_report(
        &self,
        scan_id: i64,
        format: ReportFormat,
    ) -> Result<i64, AppError> {
        let url = format!("{}/cxrestapi/reports/sastScan", self.base_url);
        let body = json!({
            "reportType": format.provider_name(),
            "scanId": scan_id,
        });
        let registered: ReportRegistrationDto = self.post_json(&url, &body).await?;
        Ok(registered.report_id)
    }

    async fn report_status(&self, report_id: i64) -> Result<ReportStatus, AppError> {
        let url = format!(
            "{}/cxrestapi/reports/sastScan/{report_id}/status",
            self.base_url
        );
        let status: ReportStatusDto = self.get_json(&url).await?;
        Ok(ReportStatus::from_name(&status.status.value))
    }

    async fn report_bytes(&self, report_id: i64) -> Result<Vec<u8>, AppError> {
        let url = format!("{}/cxrestapi/reports/sastScan/{report_id}", self.base_url);
        let resp = self.get_response(&url).await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    async fn rule_ids_for_scan(&self, scan_id: i64) -> Result<Vec<u64>, AppError> {
        let url = format!(
            "{}/Cxwebinterface/odata/v1/Scans({scan_id})/Results?$select=QueryId",
            self.odata_base_url
        );
        let rows: ODataResultsDto = self.get_json(&url).await?;
        Ok(rows.value.into_iter().map(|r| r.query_id).collect())
    }

    async fn rule_documentation(&self, rule_id: u64) -> Result<String, AppError> {
        let url = format!(
            "{}/cxrestapi/queries/{rule_id}/cxDescription",
            self.base_url
        );
        let resp = self.get_response(&url).await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

/// Import service client.
pub struct RestImportProvider {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestImportProvider {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadUrlDto {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ImportDto {
    #[serde(rename = "importId")]
    import_id: String,
}

#[async_trait]
impl ImportProvider for RestImportProvider {
    async fn create_upload_target(&self) -> Result<UploadTarget, AppError> {
        let url = format!("{}/api/uploads", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;
        let target: UploadUrlDto = resp.json().await?;
        Ok(UploadTarget { url: target.url })
    }

    async fn upload_archive(&self, target: &UploadTarget, data: Vec<u8>) -> Result<(), AppError> {
        // Pre-signed target: no bearer auth on the transfer itself.
        self.http
            .put(&target.url)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .body(data)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn register_import(
        &self,
        destination_project_id: &str,
        target: &UploadTarget,
    ) -> Result<String, AppError> {
        let url = format!("{}/api/byor/imports", self.base_url);
        let body = json!({
            "projectId": destination_project_id,
            "uploadUrl": target.url,
        });
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let import: ImportDto = resp.json().await?;
        Ok(import.import_id)
    }
}
