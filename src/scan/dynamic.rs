use super::{Scan, ScanJob, ScanProperties, ScanState, ScanType};
use crate::config::ServiceDialect;
use crate::error::{AppScanError, AppScanResult};
use crate::progress::SharedProgress;
use crate::results::{self, ResultsProvider};
use crate::service::{AseScanType, ScanServiceProvider};
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What a dynamic scan points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicTarget {
    Url(String),
    File(PathBuf),
}

impl DynamicTarget {
    /// An http(s) URL, or else an existing local file
    pub fn parse(value: &str) -> AppScanResult<Self> {
        if let Ok(url) = Url::parse(value) {
            if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
                return Ok(DynamicTarget::Url(value.to_string()));
            }
        }

        let path = Path::new(value);
        if path.is_file() {
            return Ok(DynamicTarget::File(path.to_path_buf()));
        }
        Err(AppScanError::InvalidTarget(format!(
            "{} is neither a valid URL nor an existing file",
            value
        )))
    }
}

/// Scan of a running application, configured directly on the backend
pub struct DynamicScan {
    job: ScanJob,
    progress: SharedProgress,
    service: Arc<dyn ScanServiceProvider>,
}

impl DynamicScan {
    pub fn new(properties: ScanProperties, progress: SharedProgress, service: Arc<dyn ScanServiceProvider>) -> Self {
        let postman = properties.dynamic.postman_collection_file.is_some()
            || properties.dynamic.scan_type.as_deref().and_then(AseScanType::from_name)
                == Some(AseScanType::PostmanCollection);
        let scan_type = if postman {
            ScanType::PostmanCollection
        } else {
            ScanType::DynamicAnalyzer
        };

        Self {
            job: ScanJob::new(scan_type, properties),
            progress,
            service,
        }
    }

    pub fn job(&self) -> &ScanJob {
        &self.job
    }

    fn resolve_target(&mut self) -> AppScanResult<DynamicTarget> {
        let properties = self.job.properties();
        let value = properties
            .target
            .clone()
            .or_else(|| properties.dynamic.starting_url.clone())
            .ok_or_else(|| AppScanError::InvalidTarget("No starting URL or scan file given".to_string()))?;

        let target = DynamicTarget::parse(&value)?;
        self.job.set_state(ScanState::TargetResolved);
        Ok(target)
    }

    /// Fold the target into the properties sent to the backend
    async fn apply_target(&mut self, target: DynamicTarget) -> AppScanResult<()> {
        let dialect = self.service.dialect();
        let scan_type = self.job.scan_type();

        match target {
            DynamicTarget::Url(url) => {
                self.job.properties_mut()?.dynamic.starting_url.get_or_insert(url);
            }
            DynamicTarget::File(file) if dialect == ServiceDialect::Cloud => {
                let file_id = self.service.submit_file(&file).await?.ok_or_else(|| {
                    AppScanError::Scanner(format!("Failed to upload {}", file.display()))
                })?;
                debug!("Dynamic scan file {} uploaded as {}", file.display(), file_id);
                self.job.properties_mut()?.file_id = Some(file_id);
            }
            DynamicTarget::File(file) if scan_type == ScanType::PostmanCollection => {
                self.job
                    .properties_mut()?
                    .dynamic
                    .postman_collection_file
                    .get_or_insert(file);
            }
            DynamicTarget::File(file) => {
                return Err(AppScanError::InvalidTarget(format!(
                    "{} cannot be scanned by this service, a starting URL is required",
                    file.display()
                )));
            }
        }
        Ok(())
    }

    async fn execute(&mut self) -> AppScanResult<()> {
        let target = self.resolve_target()?;
        self.apply_target(target).await?;

        let scan_type = self.job.scan_type();
        let scan_id = self
            .service
            .create_and_execute_scan(scan_type, self.job.properties())
            .await
            .ok_or_else(|| AppScanError::Scanner(format!("Failed to start the {} scan", scan_type)))?;

        info!("{} scan submitted with id {}", scan_type, scan_id);
        self.job.assign_scan_id(scan_id)?;
        self.job.set_state(ScanState::Submitted);
        Ok(())
    }
}

#[async_trait]
impl Scan for DynamicScan {
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

    fn results_provider(&self) -> Option<Box<dyn ResultsProvider>> {
        let scan_id = self.job.scan_id()?;
        let mut provider = results::provider_for(
            scan_id,
            self.job.scan_type(),
            self.service.clone(),
            self.progress.clone(),
        );
        provider.set_report_format(self.job.report_format());
        Some(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::StubAuth;
    use crate::http::testing::ScriptedTransport;
    use crate::http::{HttpResponse, Method, RequestBody};
    use crate::progress::testing::RecordingProgress;
    use crate::service::cloud::API_FILE_UPLOAD;
    use crate::service::{AseScanServiceProvider, CloudScanServiceProvider};
    use serde_json::json;

    fn cloud(transport: &Arc<ScriptedTransport>) -> Arc<dyn ScanServiceProvider> {
        Arc::new(CloudScanServiceProvider::new(
            transport.clone(),
            Arc::new(StubAuth::new()),
            RecordingProgress::shared(),
        ))
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!(
            DynamicTarget::parse("https://shop.example.com/login").unwrap(),
            DynamicTarget::Url("https://shop.example.com/login".to_string())
        );
        assert!(matches!(
            DynamicTarget::parse("ftp://shop.example.com"),
            Err(AppScanError::InvalidTarget(_))
        ));
        assert!(matches!(
            DynamicTarget::parse("/no/such/file.scant"),
            Err(AppScanError::InvalidTarget(_))
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        let value = file.path().display().to_string();
        assert_eq!(
            DynamicTarget::parse(&value).unwrap(),
            DynamicTarget::File(file.path().to_path_buf())
        );
    }

    #[tokio::test]
    async fn test_url_scan_sets_starting_url() {
        let transport = Arc::new(ScriptedTransport::new().on_json(
            Method::Post,
            "/api/v4/Scans/Dast",
            201,
            json!({"Id": "d-1"}),
        ));
        let mut scan = DynamicScan::new(
            ScanProperties::default().with_target("https://shop.example.com"),
            RecordingProgress::shared(),
            cloud(&transport),
        );

        scan.run().await.unwrap();

        assert_eq!(scan.scan_id(), Some("d-1"));
        assert_eq!(scan.scan_type(), ScanType::DynamicAnalyzer);
        match &transport.requests()[0].body {
            RequestBody::Json(body) => assert_eq!(body["StartingUrl"], "https://shop.example.com"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cloud_file_target_is_uploaded() {
        let file = tempfile::Builder::new().suffix(".scant").tempfile().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Post, API_FILE_UPLOAD, 200, json!({"FileId": "f-9"}))
                .on_json(Method::Post, "/api/v4/Scans/Dast", 201, json!({"Id": "d-2"})),
        );
        let mut scan = DynamicScan::new(
            ScanProperties::default().with_target(file.path().display().to_string()),
            RecordingProgress::shared(),
            cloud(&transport),
        );

        scan.run().await.unwrap();

        assert_eq!(scan.job().properties().file_id.as_deref(), Some("f-9"));
        assert_eq!(scan.scan_id(), Some("d-2"));
    }

    #[tokio::test]
    async fn test_invalid_target_makes_no_calls() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut scan = DynamicScan::new(
            ScanProperties::default().with_target("not a url"),
            RecordingProgress::shared(),
            cloud(&transport),
        );

        assert!(matches!(scan.run().await, Err(AppScanError::InvalidTarget(_))));
        assert_eq!(transport.request_count(), 0);
        assert_eq!(scan.state(), ScanState::Failed);
    }

    #[tokio::test]
    async fn test_job_style_postman_collection() {
        let collection = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Post, "/api/jobs/5/dastconfig/createjob", 201, json!({"id": "17"}))
                .on_json(Method::Post, "/dastconfig/updatepostmancollection", 200, json!({}))
                .on(Method::Get, "/api/jobs/17", HttpResponse::new(200, "{}").with_header("ETag", "\"3\""))
                .on(Method::Post, "/api/jobs/17/actions", HttpResponse::new(200, "")),
        );
        let progress = RecordingProgress::shared();
        let service = AseScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::new()), progress.clone());
        let mut properties = ScanProperties::default().with_target(collection.path().display().to_string());
        properties.dynamic.template_id = Some("5".to_string());
        properties.dynamic.scan_type = Some("Postman Collection".to_string());

        let mut scan = DynamicScan::new(properties, progress.clone(), Arc::new(service));
        scan.run().await.unwrap();

        assert_eq!(scan.scan_type(), ScanType::PostmanCollection);
        assert_eq!(scan.scan_id(), Some("17"));
        assert_eq!(
            scan.job().properties().dynamic.postman_collection_file.as_deref(),
            Some(collection.path())
        );
        assert_eq!(transport.count_matching("updatepostmancollection"), 1);
    }

    #[tokio::test]
    async fn test_job_style_rejects_plain_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let service = AseScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::new()), RecordingProgress::shared());
        let mut scan = DynamicScan::new(
            ScanProperties::default().with_target(file.path().display().to_string()),
            RecordingProgress::shared(),
            Arc::new(service),
        );

        assert!(matches!(scan.run().await, Err(AppScanError::InvalidTarget(_))));
        assert_eq!(transport.request_count(), 0);
    }
}
