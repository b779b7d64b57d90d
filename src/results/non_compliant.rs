use super::{FindingCounts, PollState, ResultsProvider, Status, DEFAULT_REPORT_FORMAT};
use crate::progress::{Message, SharedProgress};
use crate::scan::ScanType;
use crate::service::{ReportRequest, ScanServiceProvider, SeverityCount};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Results of one resource-style scan, counted from its open issues
pub struct NonCompliantIssuesResultsProvider {
    scan_id: String,
    scan_type: ScanType,
    service: Arc<dyn ScanServiceProvider>,
    progress: SharedProgress,
    state: PollState,
    counts: FindingCounts,
    findings: Option<Vec<SeverityCount>>,
    message: Option<String>,
    scan_name: Option<String>,
    report_format: String,
}

impl NonCompliantIssuesResultsProvider {
    pub fn new(
        scan_id: &str,
        scan_type: ScanType,
        service: Arc<dyn ScanServiceProvider>,
        progress: SharedProgress,
    ) -> Self {
        Self {
            scan_id: scan_id.to_string(),
            scan_type,
            service,
            progress,
            state: PollState::Unpolled,
            counts: FindingCounts::default(),
            findings: None,
            message: None,
            scan_name: None,
            report_format: DEFAULT_REPORT_FORMAT.to_string(),
        }
    }

    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    fn observe(&mut self, status: Status) {
        self.state = self.state.transition(status);
    }

    async fn load_results(&mut self) {
        let Some(details) = self.service.get_scan_details(&self.scan_id).await else {
            self.observe(Status::Failed);
            return;
        };

        if details.is_unauthorized() {
            self.observe(Status::Failed);
            return;
        }
        if details.is_pending() {
            self.observe(Status::Unknown);
            return;
        }

        if details.name.is_some() {
            self.scan_name = details.name.clone();
        }

        let Some(execution) = details.latest_execution else {
            self.progress.set_status(Message::error(format!(
                "An error occurred retrieving details: scan {} has no execution",
                self.scan_id
            )));
            self.observe(Status::Failed);
            return;
        };

        let observed = Status::parse(&execution.status);
        debug!("Scan {} reported {}", self.scan_id, observed);

        match observed {
            Status::Failed => {
                if let Some(text) = execution.user_message {
                    self.progress.set_status(Message::error(text.clone()));
                    self.message = Some(text);
                }
                self.observe(Status::Failed);
            }
            Status::Paused => {
                let text = format!("The scan was suspended by the user. Scan Id: {}", self.scan_id);
                self.progress.set_status(Message::info(text.clone()));
                self.message = Some(text);
                self.observe(Status::Paused);
            }
            Status::InQueue | Status::Running | Status::Pausing => {
                self.message = None;
                self.observe(observed);
            }
            Status::Unknown => self.observe(Status::Unknown),
            Status::Ready | Status::Unstable => self.load_findings(observed).await,
        }
    }

    async fn load_findings(&mut self, observed: Status) {
        match self.service.get_non_compliant_issues(&self.scan_id).await {
            Ok(Some(items)) => {
                self.counts = FindingCounts::from_severity_counts(&items);
                self.findings = Some(items);
                self.message = None;
                self.observe(observed);
            }
            Ok(None) => self.observe(Status::Failed),
            Err(e) => {
                self.progress
                    .set_status(Message::error(format!("An error occurred retrieving details: {}", e)));
                self.observe(Status::Failed);
            }
        }
    }
}

#[async_trait]
impl ResultsProvider for NonCompliantIssuesResultsProvider {
    async fn has_results(&mut self) -> bool {
        if self.findings.is_none() && !self.state.is_terminal() {
            self.load_results().await;
        }
        self.findings.is_some()
    }

    async fn status(&mut self) -> Status {
        if !self.state.is_terminal() {
            self.load_results().await;
        }
        self.state.status()
    }

    fn findings(&self) -> Option<&[SeverityCount]> {
        self.findings.as_deref()
    }

    fn counts(&self) -> FindingCounts {
        self.counts
    }

    fn type_name(&self) -> String {
        self.scan_type.name().to_string()
    }

    async fn results_file(&mut self, destination: &Path, format: &str) -> bool {
        if !self.has_results().await {
            self.progress.set_status(Message::error(format!(
                "Results are not available for scan {}",
                self.scan_id
            )));
            return false;
        }

        let request = ReportRequest {
            format: format.to_string(),
            title: self.scan_name.clone(),
            locale: None,
        };
        match self.service.fetch_report(&self.scan_id, &request, destination).await {
            Ok(written) => written,
            Err(e) => {
                self.progress.set_status(Message::error(e.to_string()));
                false
            }
        }
    }

    fn message(&self) -> Option<String> {
        self.message.clone()
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
    use crate::service::cloud::API_BASIC_DETAILS;
    use crate::service::{CloudScanServiceProvider, ReportPolling};
    use serde_json::{json, Value};
    use std::time::Duration;

    const ISSUES: &str = "/api/v4/Issues/Scan/42";

    fn details(status: &str) -> Value {
        json!({"Items": [{"Id": "42", "Name": "nightly", "LatestExecution": {"Id": "e1", "Status": status}}]})
    }

    fn results(transport: &Arc<ScriptedTransport>, progress: &Arc<RecordingProgress>) -> NonCompliantIssuesResultsProvider {
        let service = CloudScanServiceProvider::new(transport.clone(), Arc::new(StubAuth::new()), progress.clone())
            .with_report_polling(ReportPolling {
                interval: Duration::ZERO,
                attempts: 2,
            });
        NonCompliantIssuesResultsProvider::new("42", ScanType::CompositionAnalyzer, Arc::new(service), progress.clone())
    }

    #[tokio::test]
    async fn test_counts_load_once_ready() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Running"))
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Ready"))
                .on_json(
                    Method::Get,
                    ISSUES,
                    200,
                    json!({"Items": [{"Severity": "High", "Count": 3}, {"Severity": "Low", "Count": 1}]}),
                ),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.findings_count(), 0);
        assert_eq!(provider.status().await, Status::Running);
        assert_eq!(provider.high_count(), 0);

        assert!(provider.has_results().await);
        assert_eq!(provider.status().await, Status::Ready);
        assert_eq!(provider.high_count(), 3);
        assert_eq!(provider.low_count(), 1);
        assert_eq!(provider.findings_count(), 4);
        assert_eq!(provider.findings().unwrap().len(), 2);

        // terminal: no further polling
        let calls = transport.request_count();
        provider.status().await;
        provider.has_results().await;
        assert_eq!(transport.request_count(), calls);
    }

    #[tokio::test]
    async fn test_failed_status_latches() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(
                    Method::Get,
                    API_BASIC_DETAILS,
                    200,
                    json!({"Items": [{"LatestExecution": {"Status": "Failed", "UserMessage": "Build broke"}}]}),
                )
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Running")),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.status().await, Status::Failed);
        assert_eq!(provider.status().await, Status::Failed);
        assert_eq!(provider.state(), PollState::TerminalFailed);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(provider.message().as_deref(), Some("Build broke"));
        assert_eq!(progress.errors(), vec!["Build broke".to_string()]);
        assert!(!provider.has_results().await);
    }

    #[tokio::test]
    async fn test_paused_is_informational() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Paused"))
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("InQueue")),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.status().await, Status::Paused);
        assert!(provider.message().unwrap().contains("suspended"));
        assert!(progress.errors().is_empty());

        assert_eq!(provider.status().await, Status::InQueue);
        assert!(provider.message().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_scan_keeps_polling() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_error(Method::Get, API_BASIC_DETAILS, "connection reset")
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Running")),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.status().await, Status::Unknown);
        assert_eq!(provider.status().await, Status::Running);
    }

    #[tokio::test]
    async fn test_unauthorized_scan_fails() {
        let transport = Arc::new(ScriptedTransport::new().on_json(
            Method::Get,
            API_BASIC_DETAILS,
            403,
            json!({"Key": "UNAUTHORIZED_ACTION"}),
        ));
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.status().await, Status::Failed);
    }

    #[tokio::test]
    async fn test_issue_query_failure_fails_results() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Ready"))
                .on_json(Method::Get, ISSUES, 500, json!({"Message": "Internal error"})),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert!(!provider.has_results().await);
        assert_eq!(provider.status().await, Status::Failed);
        assert_eq!(provider.findings_count(), 0);
    }

    #[tokio::test]
    async fn test_results_file_uses_scan_name_as_title() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("sca.html");
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_json(Method::Get, API_BASIC_DETAILS, 200, details("Ready"))
                .on_json(Method::Get, ISSUES, 200, json!({"Items": []}))
                .on_json(Method::Post, "/api/v4/Reports/Security/Scan/42", 200, json!({"Id": "r9"}))
                .on_json(Method::Get, "/api/v4/Reports?", 200, json!({"Items": [{"Status": "Ready"}]}))
                .on(Method::Get, "/api/v4/Reports/r9/Download", HttpResponse::new(200, "report")),
        );
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert!(provider.results_file(&destination, "html").await);
        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "report");

        let request = transport
            .requests()
            .into_iter()
            .find(|r| r.url.contains("/Reports/Security/Scan/42"))
            .unwrap();
        match request.body {
            crate::http::RequestBody::Json(body) => assert_eq!(body["Configuration"]["Title"], "nightly"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_results_file_without_results() {
        let transport = Arc::new(ScriptedTransport::new().on_json(Method::Get, API_BASIC_DETAILS, 200, details("Running")));
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert!(!provider.results_file(Path::new("out.html"), "html").await);
        assert!(progress.errors()[0].contains("not available"));
        assert_eq!(transport.count_matching("/Reports"), 0);
    }

    #[test]
    fn test_type_and_format() {
        let transport = Arc::new(ScriptedTransport::new());
        let progress = RecordingProgress::shared();
        let mut provider = results(&transport, &progress);

        assert_eq!(provider.type_name(), "Software Composition Analyzer");
        assert_eq!(provider.report_format(), "html");
        provider.set_report_format("pdf");
        assert_eq!(provider.report_format(), "pdf");
    }
}
