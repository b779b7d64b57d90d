use super::combined::CombinedScan;
use super::irx::{self, IrxGenerator, IrxOptions};
use super::upload::UploadScan;
use super::{Scan, ScanProperties, ScanType};
use crate::error::{AppScanError, AppScanResult};
use crate::progress::SharedProgress;
use crate::service::ScanServiceProvider;
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Drives scans of a working directory
#[async_trait]
pub trait ScanManager: Send + Sync {
    /// Generate the local archive only
    async fn prepare(&mut self, progress: SharedProgress, properties: ScanProperties) -> AppScanResult<()>;

    /// Generate (or reuse) the archive and submit it
    async fn analyze(
        &mut self,
        progress: SharedProgress,
        properties: ScanProperties,
        provider: Arc<dyn ScanServiceProvider>,
    ) -> AppScanResult<()>;

    fn add_scan_target(&mut self, target: &str);

    /// Write the active scan's report to `destination`
    async fn get_scan_results(&self, destination: &Path, format: &str) -> AppScanResult<bool>;
}

/// Scan manager for static and composition analysis
pub struct StaticScanManager {
    working_dir: PathBuf,
    generator: Arc<dyn IrxGenerator>,
    targets: Vec<PathBuf>,
    options: IrxOptions,
    scan: Option<Box<dyn Scan>>,
}

impl StaticScanManager {
    pub fn new(working_dir: impl Into<PathBuf>, generator: Arc<dyn IrxGenerator>) -> Self {
        Self {
            working_dir: working_dir.into(),
            generator,
            targets: Vec::new(),
            options: IrxOptions::default(),
            scan: None,
        }
    }

    /// Composition analysis only
    pub fn set_sca_only(&mut self, enabled: bool) {
        self.options.open_source_only = enabled;
    }

    /// Static analysis only
    pub fn set_static_only(&mut self, enabled: bool) {
        self.options.static_analysis_only = enabled;
    }

    pub fn set_third_party(&mut self, enabled: bool) {
        self.options.third_party = enabled;
    }

    pub fn set_source_code_only(&mut self, enabled: bool) {
        self.options.source_code_only = enabled;
    }

    pub fn set_secrets_disabled(&mut self, disabled: bool) {
        self.options.secrets_disabled = disabled;
        self.options.secrets_enabled = !disabled;
    }

    pub fn set_secrets_enabled(&mut self, enabled: bool) {
        self.options.secrets_enabled = enabled;
        self.options.secrets_disabled = !enabled;
    }

    pub fn set_secrets_only(&mut self, enabled: bool) {
        self.options.secrets_only = enabled;
    }

    pub fn options(&self) -> IrxOptions {
        self.options
    }

    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    pub fn scan(&self) -> Option<&dyn Scan> {
        self.scan.as_deref()
    }

    pub fn get_scan_id(&self) -> Option<&str> {
        self.scan.as_ref().and_then(|scan| scan.scan_id())
    }

    /// Write the client configuration for the added targets, if there are any
    pub fn create_config(&self) -> AppScanResult<Option<PathBuf>> {
        if self.targets.is_empty() {
            return Ok(None);
        }
        irx::write_config(&self.working_dir, &self.targets, &self.options).map(Some)
    }

    /// `{working dir name}_{yyyyMMdd_HHmmss}`
    pub fn default_scan_name(&self) -> String {
        let dir_name = self
            .working_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scan".to_string());
        format!("{}_{}", dir_name, Local::now().format("%Y%m%d_%H%M%S"))
    }

    /// Engine to run, decided once per `prepare`/`analyze`
    pub async fn select_scan_type(&self, provider: Option<&dyn ScanServiceProvider>) -> ScanType {
        if self.options.open_source_only {
            return ScanType::CompositionAnalyzer;
        }
        if self.options.static_analysis_only {
            return ScanType::StaticAnalyzer;
        }
        if let Some(provider) = provider {
            if !provider.has_entitlement(ScanType::CompositionAnalyzer).await {
                info!("No composition analysis entitlement, running static analysis only");
                return ScanType::StaticAnalyzer;
            }
        }
        ScanType::CombinedStaticComposition
    }

    fn create_scan(
        &self,
        scan_type: ScanType,
        properties: ScanProperties,
        progress: SharedProgress,
        provider: Option<Arc<dyn ScanServiceProvider>>,
    ) -> Box<dyn Scan> {
        let generator = self.generator.clone();
        match scan_type {
            ScanType::CombinedStaticComposition => {
                Box::new(CombinedScan::new(properties, progress, provider, generator).with_options(self.options))
            }
            other => {
                Box::new(UploadScan::new(other, properties, progress, provider, generator).with_options(self.options))
            }
        }
    }

    async fn run(
        &mut self,
        progress: SharedProgress,
        mut properties: ScanProperties,
        provider: Option<Arc<dyn ScanServiceProvider>>,
    ) -> AppScanResult<()> {
        if properties.scan_name.is_none() {
            properties.scan_name = Some(self.default_scan_name());
        }

        let scan_type = self.select_scan_type(provider.as_deref()).await;
        debug!("Running {} scan of {:?}", scan_type, properties.target);

        let mut scan = self.create_scan(scan_type, properties, progress, provider);
        let result = scan.run().await;
        self.scan = Some(scan);
        result
    }
}

#[async_trait]
impl ScanManager for StaticScanManager {
    async fn prepare(&mut self, progress: SharedProgress, mut properties: ScanProperties) -> AppScanResult<()> {
        self.create_config()?;
        properties.target = Some(self.working_dir.display().to_string());
        properties.prepare_only = true;
        self.run(progress, properties, None).await
    }

    async fn analyze(
        &mut self,
        progress: SharedProgress,
        mut properties: ScanProperties,
        provider: Arc<dyn ScanServiceProvider>,
    ) -> AppScanResult<()> {
        let previous_irx = self.scan.as_ref().and_then(|scan| scan.irx()).map(Path::to_path_buf);
        match previous_irx {
            Some(irx) => {
                debug!("Reusing {}", irx.display());
                properties.target = Some(irx.display().to_string());
            }
            None => {
                self.create_config()?;
                properties.target = Some(self.working_dir.display().to_string());
            }
        }
        self.run(progress, properties, Some(provider)).await
    }

    fn add_scan_target(&mut self, target: &str) {
        // remote targets are not packaged locally
        if target.contains("://") {
            debug!("Ignoring non-local target {}", target);
            return;
        }
        self.targets.push(PathBuf::from(target));
    }

    async fn get_scan_results(&self, destination: &Path, format: &str) -> AppScanResult<bool> {
        let mut provider = self
            .scan
            .as_ref()
            .and_then(|scan| scan.results_provider())
            .ok_or_else(|| AppScanError::ResultsUnavailable("no scan has been submitted".to_string()))?;
        Ok(provider.results_file(destination, format).await)
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
    use crate::scan::ScanState;
    use crate::service::cloud::{API_FILE_UPLOAD, API_TENANT_INFO};
    use crate::service::CloudScanServiceProvider;
    use serde_json::json;

    fn cloud(transport: &Arc<ScriptedTransport>) -> Arc<dyn ScanServiceProvider> {
        Arc::new(CloudScanServiceProvider::new(
            transport.clone(),
            Arc::new(StubAuth::new()),
            RecordingProgress::shared(),
        ))
    }

    fn tenant(technologies: &str) -> ScriptedTransport {
        ScriptedTransport::new().on_json(
            Method::Get,
            API_TENANT_INFO,
            200,
            json!({"ActiveTechnologies": technologies}),
        )
    }

    #[tokio::test]
    async fn test_scan_type_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = StaticScanManager::new(dir.path(), Arc::new(FakeGenerator::new()));

        let entitled = Arc::new(tenant("StaticAnalyzer,SoftwareCompositionAnalyzer"));
        let unentitled = Arc::new(tenant("StaticAnalyzer"));
        let entitled = cloud(&entitled);
        let unentitled = cloud(&unentitled);

        assert_eq!(manager.select_scan_type(None).await, ScanType::CombinedStaticComposition);
        assert_eq!(
            manager.select_scan_type(Some(entitled.as_ref())).await,
            ScanType::CombinedStaticComposition
        );
        assert_eq!(
            manager.select_scan_type(Some(unentitled.as_ref())).await,
            ScanType::StaticAnalyzer
        );

        manager.set_static_only(true);
        assert_eq!(manager.select_scan_type(Some(entitled.as_ref())).await, ScanType::StaticAnalyzer);

        // composition-only wins over everything
        manager.set_sca_only(true);
        assert_eq!(
            manager.select_scan_type(Some(unentitled.as_ref())).await,
            ScanType::CompositionAnalyzer
        );
    }

    #[tokio::test]
    async fn test_prepare_generates_archive_without_submitting() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(FakeGenerator::new());
        let mut manager = StaticScanManager::new(dir.path(), generator.clone());

        manager
            .prepare(RecordingProgress::shared(), ScanProperties::default())
            .await
            .unwrap();

        let request = generator.requests.lock().unwrap()[0].clone();
        assert_eq!(request.target, dir.path());
        let dir_name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(request.name.starts_with(&format!("{}_", dir_name)));
        // yyyyMMdd_HHmmss
        assert_eq!(request.name.len(), dir_name.len() + 1 + 15);

        let scan = manager.scan().unwrap();
        assert_eq!(scan.state(), ScanState::Completed);
        assert!(scan.irx().is_some());
        assert!(manager.get_scan_id().is_none());
    }

    #[tokio::test]
    async fn test_analyze_reuses_prepared_archive() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(FakeGenerator::new());
        let mut manager = StaticScanManager::new(dir.path(), generator.clone());
        manager.set_sca_only(true);

        manager
            .prepare(
                RecordingProgress::shared(),
                ScanProperties::default().with_scan_name("shop"),
            )
            .await
            .unwrap();

        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Post, API_FILE_UPLOAD, 200, json!({"FileId": "f-1"}))
                .on_json(Method::Post, "/api/v4/Scans/Sca", 201, json!({"Id": "42"})),
        );
        manager
            .analyze(
                RecordingProgress::shared(),
                ScanProperties::default().with_scan_name("shop"),
                cloud(&transport),
            )
            .await
            .unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(manager.get_scan_id(), Some("42"));
        assert_eq!(transport.count_matching("/Scans/Sca"), 1);
    }

    #[tokio::test]
    async fn test_analyze_without_archive_uses_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(FakeGenerator::new());
        let mut manager = StaticScanManager::new(dir.path(), generator.clone());
        manager.set_static_only(true);

        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Post, API_FILE_UPLOAD, 200, json!({"FileId": "f-1"}))
                .on_json(Method::Post, "/api/v4/Scans/Sast", 201, json!({"Id": "s-1"})),
        );
        manager
            .analyze(RecordingProgress::shared(), ScanProperties::default(), cloud(&transport))
            .await
            .unwrap();

        assert_eq!(generator.calls(), 1);
        assert_eq!(generator.requests.lock().unwrap()[0].target, dir.path());
        assert_eq!(manager.get_scan_id(), Some("s-1"));
        // static-only never asks for entitlements
        assert_eq!(transport.count_matching(API_TENANT_INFO), 0);
    }

    #[tokio::test]
    async fn test_results_unavailable_without_scan() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StaticScanManager::new(dir.path(), Arc::new(FakeGenerator::new()));

        let result = manager.get_scan_results(&dir.path().join("report.html"), "html").await;
        assert!(matches!(result, Err(AppScanError::ResultsUnavailable(_))));
    }

    #[tokio::test]
    async fn test_results_unavailable_after_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = StaticScanManager::new(dir.path(), Arc::new(FakeGenerator::new()));
        manager
            .prepare(RecordingProgress::shared(), ScanProperties::default())
            .await
            .unwrap();

        let result = manager.get_scan_results(&dir.path().join("report.html"), "html").await;
        assert!(matches!(result, Err(AppScanError::ResultsUnavailable(_))));
    }

    #[test]
    fn test_only_local_targets_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = StaticScanManager::new(dir.path(), Arc::new(FakeGenerator::new()));
        manager.add_scan_target("/src/app");
        manager.add_scan_target("https://shop.example.com");
        assert_eq!(manager.targets(), &[PathBuf::from("/src/app")]);
    }

    #[test]
    fn test_create_config_only_with_targets() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = StaticScanManager::new(dir.path(), Arc::new(FakeGenerator::new()));
        assert!(manager.create_config().unwrap().is_none());

        manager.add_scan_target("/src/app");
        manager.set_third_party(true);
        manager.set_secrets_disabled(true);
        let path = manager.create_config().unwrap().unwrap();
        let xml = std::fs::read_to_string(path).unwrap();
        assert!(xml.contains("thirdPartyLibs=\"true\""));
        assert!(xml.contains("secretsScanning=\"false\""));
        assert!(xml.contains("/src/app"));
    }
}
