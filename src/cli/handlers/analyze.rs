use super::configure_manager;
use crate::cli::commands::EngineSelection;
use crate::cli::utils::{build_service, load_config, wait_for_completion, STATUS_POLL_SECS};
use crate::progress::TracingProgress;
use crate::report::terminal::TerminalReporter;
use crate::report::{ScanSummary, SummaryReporter};
use crate::scan::{SaClientGenerator, ScanManager, ScanProperties, StaticScanManager};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[allow(clippy::too_many_arguments)]
pub async fn handle_analyze_command(
    config_path: Option<&Path>,
    dir: PathBuf,
    name: Option<String>,
    app_id: Option<String>,
    engines: EngineSelection,
    wait: bool,
    report: Option<PathBuf>,
    format: String,
) -> Result<()> {
    let config = load_config(config_path)?;
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Directory {} not found", dir.display()))?;

    let progress = TracingProgress::shared();
    let service = build_service(&config, progress.clone())?;
    let generator = Arc::new(SaClientGenerator::from_config(&config));

    let mut manager = StaticScanManager::new(&dir, generator);
    configure_manager(&mut manager, engines);

    let properties = ScanProperties {
        scan_name: name,
        app_id,
        report_format: Some(format.clone()),
        ..Default::default()
    };

    info!("Analyzing {}", dir.display());
    manager.analyze(progress, properties, service).await?;

    let Some(scan) = manager.scan() else {
        bail!("No scan was created");
    };
    let scan_id = scan.scan_id().unwrap_or_default().to_string();
    println!("✅ {} scan submitted: {}", scan.type_name(), scan_id);

    if !wait && report.is_none() {
        return Ok(());
    }

    let Some(mut results) = scan.results_provider() else {
        bail!("Results are not available for scan {}", scan_id);
    };

    wait_for_completion(results.as_mut(), Duration::from_secs(STATUS_POLL_SECS)).await;
    let summary = ScanSummary::collect(&scan_id, results.as_mut()).await;
    TerminalReporter::new().report(&summary)?;

    if let Some(destination) = report {
        if !results.results_file(&destination, &format).await {
            bail!("Failed to download the report to {}", destination.display());
        }
        println!("📄 Report saved to {}", destination.display());
    }
    Ok(())
}
