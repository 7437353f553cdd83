//! Scan lifecycle orchestration.
//!
//! Drives the remote scanning service from team resolution through report
//! persistence, strictly sequentially. Both poll loops are bounded by a
//! caller-supplied deadline and suspend only at the sleep point, so
//! dropping the future cancels a run cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::scan::{GitSourceSettings, ReportFormat, ReportStatus, ScanStatus};
use crate::provider::SastProvider;

/// Poll loop timing. The reference interval is 10 seconds; the deadline
/// bounds each loop independently.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(3600),
        }
    }
}

/// Caller-supplied parameters for one orchestration run.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub team_full_name: String,
    pub project_name: String,
    pub report_format: ReportFormat,
    pub git_url: String,
    pub branch: String,
    pub pat: Option<String>,
    pub report_folder: Option<PathBuf>,
}

/// Result of a completed run: identifiers, the persisted artifact path and
/// the raw report.
#[derive(Debug)]
pub struct ScanOutcome {
    pub project_id: i64,
    pub scan_id: i64,
    pub report_path: PathBuf,
    pub report_bytes: Vec<u8>,
    pub report_text: String,
}

pub struct ScanOrchestrator<P: SastProvider> {
    provider: P,
    poll: PollConfig,
    scans_to_keep: u32,
    preset_name: String,
}

impl<P: SastProvider> ScanOrchestrator<P> {
    pub fn new(provider: P, poll: PollConfig) -> Self {
        Self {
            provider,
            poll,
            scans_to_keep: 3,
            preset_name: "All".to_string(),
        }
    }

    pub fn with_retention(mut self, scans_to_keep: u32) -> Self {
        self.scans_to_keep = scans_to_keep;
        self
    }

    pub fn with_preset(mut self, preset_name: &str) -> Self {
        self.preset_name = preset_name.to_string();
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run the full lifecycle: resolve, configure, scan, report, persist.
    pub async fn run(&self, request: &ScanRequest) -> Result<ScanOutcome, AppError> {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            team = %request.team_full_name,
            project = %request.project_name,
            format = ?request.report_format,
            git_url = %request.git_url,
            branch = %request.branch,
            "starting scan run"
        );

        let team_id = self
            .provider
            .team_id_by_full_name(&request.team_full_name)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("team {} does not exist", request.team_full_name))
            })?;
        info!(team_id = %team_id, "team resolved");

        let project_id = self.ensure_project(&request.project_name, &team_id).await?;

        self.provider
            .set_git_source(
                project_id,
                &GitSourceSettings {
                    url: request.git_url.clone(),
                    branch: request.branch.clone(),
                    pat: request.pat.clone(),
                },
            )
            .await?;
        self.provider
            .set_data_retention(project_id, self.scans_to_keep)
            .await?;
        self.provider.set_exclusions(project_id, "", "").await?;

        match self.provider.preset_id_by_name(&self.preset_name).await? {
            Some(preset_id) => info!(preset = %self.preset_name, preset_id, "preset resolved"),
            None => warn!(
                preset = %self.preset_name,
                "preset not found, scan uses the project's stored configuration"
            ),
        }

        let scan_id = self.provider.create_scan(project_id).await?;
        info!(scan_id, "scan created");

        self.wait_for_scan(scan_id).await?;

        // Best-effort observability; absence or failure never aborts the run.
        match self.provider.scan_statistics(scan_id).await {
            Ok(Some(stats)) => info!(
                high = stats.high,
                medium = stats.medium,
                low = stats.low,
                informational = stats.info,
                "scan statistics"
            ),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "scan statistics unavailable"),
        }

        let report_id = self
            .provider
            .register_report(scan_id, request.report_format)
            .await?;
        info!(report_id, "report registered");

        self.wait_for_report(report_id).await?;

        let report_bytes = self.provider.report_bytes(report_id).await?;

        let folder = resolve_report_folder(request.report_folder.as_deref());
        let file_name = report_file_name(
            &request.project_name,
            Utc::now(),
            request.report_format.extension(),
        );
        let report_path = folder.join(file_name);
        tokio::fs::write(&report_path, &report_bytes).await?;
        info!(path = %report_path.display(), bytes = report_bytes.len(), "report persisted");

        let report_text = String::from_utf8_lossy(&report_bytes).into_owned();

        Ok(ScanOutcome {
            project_id,
            scan_id,
            report_path,
            report_bytes,
            report_text,
        })
    }

    /// Idempotent project resolution: lookup, then create, treating a
    /// creation conflict as "someone else won the race" and re-resolving.
    async fn ensure_project(&self, name: &str, team_id: &str) -> Result<i64, AppError> {
        if let Some(id) = self.provider.project_id_by_name(name, team_id).await? {
            info!(project_id = id, "reusing existing project");
            return Ok(id);
        }
        match self.provider.create_project(name, team_id).await {
            Ok(id) => {
                info!(project_id = id, "project created");
                Ok(id)
            }
            Err(AppError::Conflict(_)) => self
                .provider
                .project_id_by_name(name, team_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "project {name} not resolvable after creation conflict"
                    ))
                }),
            Err(e) => Err(e),
        }
    }

    async fn wait_for_scan(&self, scan_id: i64) -> Result<(), AppError> {
        let deadline = Instant::now() + self.poll.deadline;
        loop {
            let status = self.provider.scan_status(scan_id).await?;
            info!(scan_id, status = %status, "scan status");
            match status {
                ScanStatus::Finished => return Ok(()),
                s if s.is_failure() => {
                    return Err(AppError::ScanFailed(format!("scan {scan_id} reached {s}")))
                }
                _ => {}
            }
            self.sleep_or_timeout(deadline, &format!("scan {scan_id} status"))
                .await?;
        }
    }

    async fn wait_for_report(&self, report_id: i64) -> Result<(), AppError> {
        let deadline = Instant::now() + self.poll.deadline;
        loop {
            match self.provider.report_status(report_id).await? {
                ReportStatus::Created => return Ok(()),
                ReportStatus::Failed => {
                    return Err(AppError::ReportFailed(format!(
                        "report {report_id} generation failed"
                    )))
                }
                ReportStatus::InProcess => {}
                ReportStatus::Unknown(name) => {
                    warn!(report_id, status = %name, "unrecognized report status, still waiting");
                }
            }
            self.sleep_or_timeout(deadline, &format!("report {report_id} generation"))
                .await?;
        }
    }

    /// Wait one interval, or fail with `Timeout` when the next wake would
    /// pass the deadline. The only suspension point in either poll loop.
    async fn sleep_or_timeout(&self, deadline: Instant, waiting_for: &str) -> Result<(), AppError> {
        if Instant::now() + self.poll.interval >= deadline {
            return Err(AppError::Timeout {
                waiting_for: waiting_for.to_string(),
                waited_secs: self.poll.deadline.as_secs(),
            });
        }
        tokio::time::sleep(self.poll.interval).await;
        Ok(())
    }
}

/// Report artifact name: `<project>_<YYYY_MM_DD_HH_MM_SS>.<ext>`.
pub fn report_file_name(project_name: &str, at: DateTime<Utc>, extension: &str) -> String {
    format!(
        "{project_name}_{}.{extension}",
        at.format("%Y_%m_%d_%H_%M_%S")
    )
}

/// Use the caller's folder when it exists, otherwise fall back to the
/// process working directory.
fn resolve_report_folder(folder: Option<&Path>) -> PathBuf {
    match folder {
        Some(f) if f.exists() => f.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scan::ScanStatistics;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockProvider {
        existing_project: Option<i64>,
        create_conflicts: bool,
        scan_statuses: Mutex<VecDeque<ScanStatus>>,
        report_statuses: Mutex<VecDeque<ReportStatus>>,
        status_checks: AtomicUsize,
        report_checks: AtomicUsize,
        create_calls: AtomicUsize,
        lookup_calls: AtomicUsize,
        report_registered: AtomicBool,
    }

    impl MockProvider {
        fn with_scan_statuses(statuses: Vec<ScanStatus>) -> Self {
            Self {
                existing_project: Some(100),
                scan_statuses: Mutex::new(statuses.into()),
                report_statuses: Mutex::new(
                    vec![ReportStatus::InProcess, ReportStatus::Created].into(),
                ),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SastProvider for MockProvider {
        async fn team_id_by_full_name(&self, _: &str) -> Result<Option<String>, AppError> {
            Ok(Some("42".to_string()))
        }
        async fn project_id_by_name(&self, _: &str, _: &str) -> Result<Option<i64>, AppError> {
            let calls = self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            if self.create_conflicts && calls > 0 {
                // After the losing create, the winner's project is visible.
                return Ok(Some(100));
            }
            Ok(self.existing_project)
        }
        async fn create_project(&self, _: &str, _: &str) -> Result<i64, AppError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if self.create_conflicts {
                return Err(AppError::Conflict("project exists".to_string()));
            }
            Ok(100)
        }
        async fn set_git_source(&self, _: i64, _: &GitSourceSettings) -> Result<(), AppError> {
            Ok(())
        }
        async fn set_data_retention(&self, _: i64, _: u32) -> Result<(), AppError> {
            Ok(())
        }
        async fn set_exclusions(&self, _: i64, _: &str, _: &str) -> Result<(), AppError> {
            Ok(())
        }
        async fn preset_id_by_name(&self, _: &str) -> Result<Option<i64>, AppError> {
            Ok(Some(1))
        }
        async fn create_scan(&self, _: i64) -> Result<i64, AppError> {
            Ok(555)
        }
        async fn scan_status(&self, _: i64) -> Result<ScanStatus, AppError> {
            self.status_checks.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.scan_statuses.lock().unwrap();
            Ok(statuses.pop_front().unwrap_or(ScanStatus::Queued))
        }
        async fn scan_statistics(&self, _: i64) -> Result<Option<ScanStatistics>, AppError> {
            Ok(None)
        }
        async fn register_report(&self, _: i64, _: ReportFormat) -> Result<i64, AppError> {
            self.report_registered.store(true, Ordering::SeqCst);
            Ok(999)
        }
        async fn report_status(&self, _: i64) -> Result<ReportStatus, AppError> {
            self.report_checks.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.report_statuses.lock().unwrap();
            Ok(statuses.pop_front().unwrap_or(ReportStatus::InProcess))
        }
        async fn report_bytes(&self, _: i64) -> Result<Vec<u8>, AppError> {
            Ok(b"<results/>".to_vec())
        }
        async fn rule_ids_for_scan(&self, _: i64) -> Result<Vec<u64>, AppError> {
            Ok(vec![])
        }
        async fn rule_documentation(&self, _: u64) -> Result<String, AppError> {
            Ok(String::new())
        }
    }

    fn fast_poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(3600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scan_poll_exits_after_terminal_success() {
        let provider = MockProvider::with_scan_statuses(vec![
            ScanStatus::Queued,
            ScanStatus::Scanning,
            ScanStatus::Finished,
        ]);
        let orchestrator = ScanOrchestrator::new(provider, fast_poll());
        orchestrator.wait_for_scan(555).await.unwrap();
        assert_eq!(
            orchestrator.provider().status_checks.load(Ordering::SeqCst),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scan_aborts_without_report_request() {
        let provider =
            MockProvider::with_scan_statuses(vec![ScanStatus::Queued, ScanStatus::Failed]);
        let orchestrator = ScanOrchestrator::new(provider, fast_poll());
        let request = ScanRequest {
            team_full_name: "/Org/TeamA".to_string(),
            project_name: "App1".to_string(),
            report_format: ReportFormat::Xml,
            git_url: "https://example.com/repo.git".to_string(),
            branch: "refs/heads/master".to_string(),
            pat: None,
            report_folder: None,
        };
        let err = orchestrator.run(&request).await.unwrap_err();
        assert!(err.is_scan_failed());
        assert_eq!(
            orchestrator.provider().status_checks.load(Ordering::SeqCst),
            2
        );
        assert!(!orchestrator
            .provider()
            .report_registered
            .load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_after_deadline() {
        let provider = MockProvider::with_scan_statuses(vec![]);
        let poll = PollConfig {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(30),
        };
        let orchestrator = ScanOrchestrator::new(provider, poll);
        let err = orchestrator.wait_for_scan(555).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            orchestrator.provider().status_checks.load(Ordering::SeqCst),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn report_poll_surfaces_generation_failure() {
        let mut provider = MockProvider::with_scan_statuses(vec![ScanStatus::Finished]);
        provider.report_statuses =
            Mutex::new(vec![ReportStatus::InProcess, ReportStatus::Failed].into());
        let orchestrator = ScanOrchestrator::new(provider, fast_poll());
        let err = orchestrator.wait_for_report(999).await.unwrap_err();
        assert!(matches!(err, AppError::ReportFailed(_)));
        assert_eq!(
            orchestrator.provider().report_checks.load(Ordering::SeqCst),
            2
        );
    }

    #[tokio::test]
    async fn ensure_project_reuses_existing() {
        let provider = MockProvider {
            existing_project: Some(100),
            ..MockProvider::default()
        };
        let orchestrator = ScanOrchestrator::new(provider, fast_poll());
        let first = orchestrator.ensure_project("App1", "42").await.unwrap();
        let second = orchestrator.ensure_project("App1", "42").await.unwrap();
        assert_eq!(first, 100);
        assert_eq!(second, 100);
        assert_eq!(orchestrator.provider().create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ensure_project_treats_conflict_as_reuse() {
        let provider = MockProvider {
            existing_project: None,
            create_conflicts: true,
            ..MockProvider::default()
        };
        let orchestrator = ScanOrchestrator::new(provider, fast_poll());
        let id = orchestrator.ensure_project("App1", "42").await.unwrap();
        assert_eq!(id, 100);
        assert_eq!(orchestrator.provider().create_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_file_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            report_file_name("App1", at, "xml"),
            "App1_2024_01_01_00_00_00.xml"
        );
    }

    #[test]
    fn missing_report_folder_falls_back() {
        let folder = resolve_report_folder(Some(Path::new("/definitely/not/here")));
        assert!(folder.exists());
    }
}
