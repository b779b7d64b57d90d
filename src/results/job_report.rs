use super::{FindingCounts, PollState, ResultsProvider, Status, DEFAULT_REPORT_FORMAT};
use crate::progress::{Message, SharedProgress};
use crate::scan::ScanType;
use crate::service::{ReportRequest, ScanServiceProvider, SeverityCount};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Results of one job-style scan, read from its report-pack summary.
///
/// The summary only exists once the job has finished, so a missing summary
/// means "still running". A job the service rejects outright is `Failed`.
pub struct JobReportResultsProvider {
    job_id: String,
    scan_type: ScanType,
    service: Arc<dyn ScanServiceProvider>,
    progress: SharedProgress,
    state: PollState,
    counts: FindingCounts,
    loaded: bool,
    report_format: String,
}

impl JobReportResultsProvider {
    pub fn new(
        job_id: &str,
        scan_type: ScanType,
        service: Arc<dyn ScanServiceProvider>,
        progress: SharedProgress,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            scan_type,
            service,
            progress,
            state: PollState::Unpolled,
            counts: FindingCounts::default(),
            loaded: false,
            report_format: DEFAULT_REPORT_FORMAT.to_string(),
        }
    }

    async fn load_results(&mut self) {
        let Some(details) = self.service.get_scan_details(&self.job_id).await else {
            // expired session or a job the service rejects: polling again cannot help
            self.state = self.state.transition(Status::Failed);
            return;
        };

        match details.summary {
            Some(counts) => {
                self.counts = counts;
                self.loaded = true;
                self.state = self.state.transition(Status::Ready);
            }
            None => {
                debug!("Job {} has no report summary yet", self.job_id);
                self.state = self.state.transition(Status::Unknown);
            }
        }
    }
}

#[async_trait]
impl ResultsProvider for JobReportResultsProvider {
    async fn has_results(&mut self) -> bool {
        if !self.loaded && !self.state.is_terminal() {
            self.load_results().await;
        }
        self.loaded
    }

    async fn status(&mut self) -> Status {
        if !self.state.is_terminal() {
            self.load_results().await;
        }
        self.state.status()
    }

    fn findings(&self) -> Option<&[SeverityCount]> {
        None
    }

    fn counts(&self) -> FindingCounts {
        self.counts
    }

    fn type_name(&self) -> String {
        self.scan_type.name().to_string()
    }

    async fn results_file(&mut self, destination: &Path, format: &str) -> bool {
        match self
            .service
            .fetch_report(&self.job_id, &ReportRequest::new(format), destination)
            .await
        {
            Ok(written) => written,
            Err(e) => {
                self.progress.set_status(Message::error(e.to_string()));
                false
            }
        }
    }

    fn message(&self) -> Option<String> {
        None
    }

    fn report_format(&self) -> &str {
        &self.report_format
    }

    fn set_report_format(&mut self, format: &str) {
        self.report_format = format.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::StubAuth;
    use crate::http::testing::ScriptedTransport;
    use crate::http::{HttpResponse, Method};
    use crate::progress::testing::RecordingProgress;
    use crate::service::AseScanServiceProvider;
    use serde_json::json;

    const PACK: &str = "/api/reportpacks/18/reports";

    fn results(transport: &Arc<ScriptedTransport>, progress: &Arc<RecordingProgress>) -> JobReportResultsProvider {
        let service = AseScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::new()), progress.clone());
        JobReportResultsProvider::new("17", ScanType::DynamicAnalyzer, Arc::new(service), progress.clone())
    }

    #[tokio::test]
    async fn test_polls_until_summary_exists() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on(Method::Get, PACK, HttpResponse::new(404, ""))
                .on_json(
                    Method::Get,
                    PACK,
                    200,
                    json!({"reports": {"report": [{"name": "Security Issues", "issue-counts-severity": {
                        "issue-count": [{"severity": {"name": "Critical"}, "count": "1"},
                                        {"severity": {"name": "Medium"}, "count": "4"}]}}]}}),
                ),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.status().await, Status::Unknown);
        assert!(provider.has_results().await);
        assert_eq!(provider.status().await, Status::Ready);
        assert_eq!(provider.critical_count(), 1);
        assert_eq!(provider.medium_count(), 4);
        assert_eq!(provider.findings_count(), 5);
        assert!(provider.findings().is_none());
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_session_fails_once() {
        let transport = Arc::new(ScriptedTransport::new());
        let progress = RecordingProgress::shared();
        let service = AseScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::expired()), progress.clone());
        let mut provider =
            JobReportResultsProvider::new("17", ScanType::DynamicAnalyzer, Arc::new(service), progress.clone());

        for _ in 0..5 {
            assert_eq!(provider.status().await, Status::Failed);
        }
        assert!(!provider.has_results().await);
        assert_eq!(progress.errors().len(), 1);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_job_fails_once() {
        let transport = Arc::new(ScriptedTransport::new().on(Method::Get, PACK, HttpResponse::new(400, "")));
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        for _ in 0..5 {
            assert_eq!(provider.status().await, Status::Failed);
        }
        assert_eq!(provider.findings_count(), 0);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_job_id_fails() {
        let transport = Arc::new(ScriptedTransport::new());
        let progress = RecordingProgress::shared();
        let service = AseScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::new()), progress.clone());
        let mut provider =
            JobReportResultsProvider::new("abc", ScanType::DynamicAnalyzer, Arc::new(service), progress.clone());

        assert_eq!(provider.status().await, Status::Failed);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_report_download() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("dast.pdf");
        let transport = Arc::new(ScriptedTransport::new().on(
            Method::Get,
            "/api/reportpacks/18/reports/download?format=pdf",
            HttpResponse::new(200, "%PDF"),
        ));
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert!(provider.results_file(&destination, "pdf").await);
        assert_eq!(std::fs::read(&destination).unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn test_report_download_failure_is_reported() {
        let transport = Arc::new(ScriptedTransport::new());
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert!(!provider.results_file(Path::new("missing.pdf"), "pdf").await);
        assert!(progress.errors()[0].contains("404"));
    }
}
