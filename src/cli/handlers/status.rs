use crate::cli::commands::{Engine, OutputFormat};
use crate::cli::utils::{build_service, load_config};
use crate::progress::TracingProgress;
use crate::report::json::JsonReporter;
use crate::report::terminal::TerminalReporter;
use crate::report::{ScanSummary, SummaryReporter};
use crate::results::{self, ResultsProvider};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tracing::info;

fn open_results(config_path: Option<&Path>, scan_id: &str, engine: Engine) -> Result<Box<dyn ResultsProvider>> {
    let config = load_config(config_path)?;
    let progress = TracingProgress::shared();
    let service = build_service(&config, progress.clone())?;
    Ok(results::provider_for(scan_id, engine.into(), service, progress))
}

pub async fn handle_status_command(
    config_path: Option<&Path>,
    scan_id: String,
    engine: Engine,
    output: OutputFormat,
) -> Result<()> {
    let mut results = open_results(config_path, &scan_id, engine)?;
    let summary = ScanSummary::collect(&scan_id, results.as_mut()).await;

    let reporter: Box<dyn SummaryReporter> = match output {
        OutputFormat::Terminal => Box::new(TerminalReporter::new().with_verbose(true)),
        OutputFormat::Json => Box::new(JsonReporter::stdout()),
    };
    reporter.report(&summary)?;
    Ok(())
}

pub async fn handle_report_command(
    config_path: Option<&Path>,
    scan_id: String,
    engine: Engine,
    output: PathBuf,
    format: String,
) -> Result<()> {
    let mut results = open_results(config_path, &scan_id, engine)?;
    results.set_report_format(&format);

    let status = results.status().await;
    if !status.is_terminal() {
        bail!("Scan {} is not finished yet ({})", scan_id, status);
    }

    info!("Downloading {} report for scan {}", format, scan_id);
    if !results.results_file(&output, &format).await {
        bail!("Failed to download the report to {}", output.display());
    }

    println!("📄 Report saved to {}", output.display());
    Ok(())
}
