use std::time::Duration;

use sastbridge::config::AppConfig;
use sastbridge::parsers::sarif;
use sastbridge::provider::rest::{RestImportProvider, RestSastProvider};
use sastbridge::services::extraction;
use sastbridge::services::orchestrator::{PollConfig, ScanOrchestrator, ScanRequest};
use sastbridge::services::upload::UploadPipeline;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sastbridge=debug".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;

    let provider = RestSastProvider::new(
        &config.sast_base_url,
        &config.odata_base_url,
        &config.sast_token,
    );
    let orchestrator = ScanOrchestrator::new(
        provider,
        PollConfig {
            interval: Duration::from_secs(config.poll_interval_secs),
            deadline: Duration::from_secs(config.poll_deadline_secs),
        },
    )
    .with_retention(config.scans_to_keep)
    .with_preset(&config.preset_name);

    let request = ScanRequest {
        team_full_name: config.team_full_name.clone(),
        project_name: config.project_name.clone(),
        report_format: config.report_format,
        git_url: config.git_url.clone(),
        branch: config.git_branch.clone(),
        pat: config.git_pat.clone(),
        report_folder: config.report_folder.clone(),
    };
    let outcome = orchestrator.run(&request).await?;

    let (risk, recommendation) =
        extraction::build_description_maps(orchestrator.provider(), outcome.scan_id).await?;
    let sarif_log = sarif::convert(&outcome.report_bytes, &risk, &recommendation)?;

    let sarif_path = outcome.report_path.with_extension("sarif");
    tokio::fs::write(&sarif_path, serde_json::to_vec_pretty(&sarif_log)?).await?;
    tracing::info!(path = %sarif_path.display(), "SARIF artifact written");

    let pipeline = UploadPipeline::new(RestImportProvider::new(
        &config.import_base_url,
        &config.import_token,
    ));
    let import_id = pipeline
        .upload(&sarif_log, &config.destination_project_id)
        .await?;
    tracing::info!(%import_id, scan_id = outcome.scan_id, "run complete");

    Ok(())
}
