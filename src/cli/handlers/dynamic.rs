use crate::cli::utils::{build_service, load_config, wait_for_completion, STATUS_POLL_SECS};
use crate::progress::TracingProgress;
use crate::report::terminal::TerminalReporter;
use crate::report::{ScanSummary, SummaryReporter};
use crate::scan::{DynamicScan, Scan, ScanProperties};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Read scan properties from a YAML file
pub fn load_properties(path: &Path) -> Result<ScanProperties> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub async fn handle_dynamic_command(config_path: Option<&Path>, properties: PathBuf, wait: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let properties = load_properties(&properties)?;

    let progress = TracingProgress::shared();
    let service = build_service(&config, progress.clone())?;

    let mut scan = DynamicScan::new(properties, progress, service);
    scan.run().await?;

    let scan_id = scan.scan_id().unwrap_or_default().to_string();
    println!("✅ {} scan submitted: {}", scan.type_name(), scan_id);

    if !wait {
        return Ok(());
    }

    let Some(mut results) = scan.results_provider() else {
        bail!("Results are not available for scan {}", scan_id);
    };
    wait_for_completion(results.as_mut(), Duration::from_secs(STATUS_POLL_SECS)).await;
    let summary = ScanSummary::collect(&scan_id, results.as_mut()).await;
    TerminalReporter::new().report(&summary)?;
    Ok(())
}
