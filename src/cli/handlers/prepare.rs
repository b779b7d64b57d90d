use super::configure_manager;
use crate::cli::commands::EngineSelection;
use crate::cli::utils::load_config;
use crate::progress::TracingProgress;
use crate::scan::{SaClientGenerator, ScanManager, ScanProperties, StaticScanManager};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub async fn handle_prepare_command(
    config_path: Option<&Path>,
    dir: PathBuf,
    name: Option<String>,
    engines: EngineSelection,
) -> Result<()> {
    let config = load_config(config_path)?;
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Directory {} not found", dir.display()))?;

    info!("Preparing IRX archive for {}", dir.display());

    let generator = Arc::new(SaClientGenerator::from_config(&config));
    let mut manager = StaticScanManager::new(&dir, generator);
    configure_manager(&mut manager, engines);

    let properties = ScanProperties {
        scan_name: name,
        ..Default::default()
    };
    manager.prepare(TracingProgress::shared(), properties).await?;

    if let Some(irx) = manager.scan().and_then(|scan| scan.irx()) {
        println!("✅ IRX archive ready: {}", irx.display());
    }
    Ok(())
}
