use super::irx::{IrxGenerator, IrxOptions};
use super::upload::UploadScan;
use super::{Scan, ScanProperties, ScanState, ScanType};
use crate::error::AppScanResult;
use crate::progress::SharedProgress;
use crate::results::{CombinedResultsProvider, ResultsProvider, DEFAULT_REPORT_FORMAT};
use crate::service::ScanServiceProvider;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Static and composition analysis of the same target, submitted as two
/// independent backend scans.
///
/// The static scan runs first and its archive is reused for the composition
/// scan. With `prepare_only` only the archive is produced.
pub struct CombinedScan {
    sast: UploadScan,
    sca: UploadScan,
    prepare_only: bool,
    report_format: String,
}

impl CombinedScan {
    pub fn new(
        properties: ScanProperties,
        progress: SharedProgress,
        service: Option<Arc<dyn ScanServiceProvider>>,
        generator: Arc<dyn IrxGenerator>,
    ) -> Self {
        let prepare_only = properties.prepare_only;
        let report_format = properties
            .report_format
            .clone()
            .unwrap_or_else(|| DEFAULT_REPORT_FORMAT.to_string());
        let sca = UploadScan::new(
            ScanType::CompositionAnalyzer,
            properties.clone(),
            progress.clone(),
            service.clone(),
            generator.clone(),
        );
        let sast = UploadScan::new(ScanType::StaticAnalyzer, properties, progress, service, generator);
        Self {
            sast,
            sca,
            prepare_only,
            report_format,
        }
    }

    pub fn with_options(mut self, options: IrxOptions) -> Self {
        self.sast = self.sast.with_options(options);
        self.sca = self.sca.with_options(options);
        self
    }

    pub fn sast_scan_id(&self) -> Option<&str> {
        self.sast.scan_id()
    }

    pub fn sca_scan_id(&self) -> Option<&str> {
        self.sca.scan_id()
    }
}

#[async_trait]
impl Scan for CombinedScan {
    async fn run(&mut self) -> AppScanResult<()> {
        self.sast.run().await?;
        if self.prepare_only {
            return Ok(());
        }

        if let Some(irx) = self.sast.irx().map(Path::to_path_buf) {
            self.sca.use_irx(&irx)?;
        }
        self.sca.run().await?;

        info!(
            "Combined scan submitted: SAST {}, SCA {}",
            self.sast_scan_id().unwrap_or_default(),
            self.sca_scan_id().unwrap_or_default()
        );
        Ok(())
    }

    /// Id of the static scan
    fn scan_id(&self) -> Option<&str> {
        self.sast.scan_id()
    }

    fn scan_type(&self) -> ScanType {
        ScanType::CombinedStaticComposition
    }

    fn state(&self) -> ScanState {
        match (self.sast.state(), self.sca.state()) {
            (ScanState::Failed, _) | (_, ScanState::Failed) => ScanState::Failed,
            (sast, ScanState::Created) if self.prepare_only => sast,
            (_, sca) => sca,
        }
    }

    fn irx(&self) -> Option<&Path> {
        self.sast.irx()
    }

    fn results_provider(&self) -> Option<Box<dyn ResultsProvider>> {
        let mut provider = CombinedResultsProvider::new(self.sast.results_provider()?, self.sca.results_provider()?);
        provider.set_report_format(&self.report_format);
        Some(Box::new(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::StubAuth;
    use crate::http::testing::ScriptedTransport;
    use crate::http::Method;
    use crate::progress::testing::RecordingProgress;
    use crate::scan::irx::testing::FakeGenerator;
    use crate::service::cloud::API_FILE_UPLOAD;
    use crate::service::CloudScanServiceProvider;
    use serde_json::json;

    fn scan_in(
        dir: &Path,
        transport: &Arc<ScriptedTransport>,
        generator: &Arc<FakeGenerator>,
        prepare_only: bool,
    ) -> CombinedScan {
        let progress = RecordingProgress::shared();
        let service = CloudScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::new()), progress.clone());
        let mut properties = ScanProperties::default()
            .with_target(dir.display().to_string())
            .with_scan_name("shop");
        properties.prepare_only = prepare_only;
        properties.report_format = Some("pdf".to_string());
        CombinedScan::new(properties, progress, Some(Arc::new(service)), generator.clone())
    }

    #[tokio::test]
    async fn test_submits_both_engines_from_one_archive() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Post, API_FILE_UPLOAD, 200, json!({"FileId": "f-1"}))
                .on_json(Method::Post, API_FILE_UPLOAD, 200, json!({"FileId": "f-2"}))
                .on_json(Method::Post, "/api/v4/Scans/Sast", 201, json!({"Id": "sast-1"}))
                .on_json(Method::Post, "/api/v4/Scans/Sca", 201, json!({"Id": "sca-1"})),
        );
        let generator = Arc::new(FakeGenerator::new());
        let mut scan = scan_in(dir.path(), &transport, &generator, false);

        scan.run().await.unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(scan.scan_id(), Some("sast-1"));
        assert_eq!(scan.sast_scan_id(), Some("sast-1"));
        assert_eq!(scan.sca_scan_id(), Some("sca-1"));
        assert_eq!(scan.state(), ScanState::Submitted);
        assert_eq!(transport.count_matching(API_FILE_UPLOAD), 2);

        let urls = transport.urls();
        let sast = urls.iter().position(|u| u.ends_with("/Scans/Sast")).unwrap();
        let sca = urls.iter().position(|u| u.ends_with("/Scans/Sca")).unwrap();
        assert!(sast < sca);

        let provider = scan.results_provider().unwrap();
        assert_eq!(provider.type_name(), "Static Analyzer_Software Composition Analyzer");
        assert_eq!(provider.report_format(), "pdf");
    }

    #[tokio::test]
    async fn test_prepare_only_generates_one_archive() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let generator = Arc::new(FakeGenerator::new());
        let mut scan = scan_in(dir.path(), &transport, &generator, true);

        scan.run().await.unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(scan.irx(), Some(dir.path().join("shop.irx").as_path()));
        assert_eq!(scan.state(), ScanState::Completed);
        assert!(scan.results_provider().is_none());
    }

    #[tokio::test]
    async fn test_static_failure_skips_composition() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Post, API_FILE_UPLOAD, 200, json!({"FileId": "f-1"}))
                .on_json(Method::Post, "/api/v4/Scans/Sast", 500, json!({})),
        );
        let generator = Arc::new(FakeGenerator::new());
        let mut scan = scan_in(dir.path(), &transport, &generator, false);

        assert!(scan.run().await.is_err());
        assert_eq!(transport.count_matching("/Scans/Sca"), 0);
        assert_eq!(scan.state(), ScanState::Failed);
    }
}
