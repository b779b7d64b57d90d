use super::irx::{is_irx, IrxGenerator, IrxOptions, IrxRequest};
use super::{Scan, ScanJob, ScanProperties, ScanState, ScanType};
use crate::error::{AppScanError, AppScanResult};
use crate::progress::{Message, SharedProgress};
use crate::results::{self, ResultsProvider};
use crate::service::ScanServiceProvider;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Static or composition analysis of a local target.
///
/// The target is packaged into an IRX archive (or used as-is when it already
/// is one), uploaded, and a scan is created from the uploaded file.
pub struct UploadScan {
    job: ScanJob,
    progress: SharedProgress,
    service: Option<Arc<dyn ScanServiceProvider>>,
    generator: Arc<dyn IrxGenerator>,
    options: IrxOptions,
    irx: Option<PathBuf>,
}

impl UploadScan {
    pub fn new(
        scan_type: ScanType,
        properties: ScanProperties,
        progress: SharedProgress,
        service: Option<Arc<dyn ScanServiceProvider>>,
        generator: Arc<dyn IrxGenerator>,
    ) -> Self {
        Self {
            job: ScanJob::new(scan_type, properties),
            progress,
            service,
            generator,
            options: IrxOptions::default(),
            irx: None,
        }
    }

    pub fn with_options(mut self, options: IrxOptions) -> Self {
        self.options = options;
        self
    }

    pub fn job(&self) -> &ScanJob {
        &self.job
    }

    /// Scan an already generated archive instead of the original target
    pub(crate) fn use_irx(&mut self, irx: &Path) -> AppScanResult<()> {
        self.job.properties_mut()?.target = Some(irx.display().to_string());
        Ok(())
    }

    fn resolve_target(&mut self) -> AppScanResult<PathBuf> {
        let target = self.job.target().map(PathBuf::from).filter(|path| path.exists());
        match target {
            Some(target) => {
                self.job.set_state(ScanState::TargetResolved);
                Ok(target)
            }
            None => Err(AppScanError::InvalidTarget(format!(
                "The target {} does not exist",
                self.job.target().unwrap_or("<none>")
            ))),
        }
    }

    fn scan_name(&self, target: &Path) -> String {
        self.job.properties().scan_name.clone().unwrap_or_else(|| {
            target
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "scan".to_string())
        })
    }

    async fn prepare_irx(&mut self, target: PathBuf) -> AppScanResult<PathBuf> {
        if is_irx(&target) {
            debug!("Using existing archive {}", target.display());
            return Ok(target);
        }

        let request = IrxRequest::for_target(&target, &self.scan_name(&target), self.options);
        self.progress
            .set_status(Message::info(format!("Generating IRX file for {}", target.display())));
        let irx = self.generator.generate(&request).await?;
        self.progress
            .set_status(Message::info(format!("IRX file generated: {}", irx.display())));
        Ok(irx)
    }

    async fn submit(&mut self, irx: &Path) -> AppScanResult<()> {
        let service = self
            .service
            .clone()
            .ok_or_else(|| AppScanError::Scanner("No scan service configured".to_string()))?;
        let scan_type = self.job.scan_type();

        let file_id = service.submit_file(irx).await?.ok_or_else(|| {
            AppScanError::Scanner(format!(
                "Failed to upload {}",
                irx.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
            ))
        })?;
        self.job.properties_mut()?.file_id = Some(file_id);

        let scan_id = service
            .create_and_execute_scan(scan_type, self.job.properties())
            .await
            .ok_or_else(|| AppScanError::Scanner(format!("Failed to submit the IRX file for {}", scan_type)))?;

        info!("{} scan submitted with id {}", scan_type, scan_id);
        self.job.assign_scan_id(scan_id)?;
        self.job.set_state(ScanState::Submitted);
        Ok(())
    }

    async fn execute(&mut self) -> AppScanResult<()> {
        let target = self.resolve_target()?;
        let irx = self.prepare_irx(target).await?;
        self.irx = Some(irx.clone());

        if self.job.properties().prepare_only {
            self.job.set_state(ScanState::Completed);
            return Ok(());
        }
        self.submit(&irx).await
    }
}

#[async_trait]
impl Scan for UploadScan {
    async fn run(&mut self) -> AppScanResult<()> {
        let result = self.execute().await;
        if result.is_err() {
            self.job.set_state(ScanState::Failed);
        }
        result
    }

    fn scan_id(&self) -> Option<&str> {
        self.job.scan_id()
    }

    fn scan_type(&self) -> ScanType {
        self.job.scan_type()
    }

    fn state(&self) -> ScanState {
        self.job.state()
    }

    fn irx(&self) -> Option<&Path> {
        self.irx.as_deref()
    }

    fn results_provider(&self) -> Option<Box<dyn ResultsProvider>> {
        let scan_id = self.job.scan_id()?;
        let service = self.service.clone()?;
        let mut provider = results::provider_for(scan_id, self.job.scan_type(), service, self.progress.clone());
        provider.set_report_format(self.job.report_format());
        Some(provider)
    }
}
