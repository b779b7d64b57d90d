use super::{
    scan_type, AseScanType, ExecutionDetails, ReportRequest, ScanDetails, ScanServiceProvider, SeverityCount,
};
use crate::auth::{AuthenticationProvider, XSRF_HEADER};
use crate::config::ServiceDialect;
use crate::error::{AppScanError, AppScanResult};
use crate::http::{Headers, HttpPart, HttpResponse, HttpTransport};
use crate::progress::{Message, SharedProgress};
use crate::results::FindingCounts;
use crate::scan::{DynamicScanSettings, LoginType, ScanProperties, ScanType};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const API_JOBS: &str = "/api/jobs";
const API_REPORT_PACKS: &str = "/api/reportpacks";

const ERROR_LOGIN_EXPIRED: &str = "Your session has expired. Please log in again.";

/// One configuration update applied to a freshly created job
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdateStep {
    /// Set a node of the job's scan template
    ScantNode {
        xpath: &'static str,
        value: String,
        encrypt: bool,
    },
    AgentServer(String),
    /// Upload recorded traffic; `action` is `login` or `add`
    Traffic { file: PathBuf, action: &'static str },
    /// Scan sub-type, as its numeric code
    ScanType(String),
    PostmanCollection,
}

impl JobUpdateStep {
    fn scant(xpath: &'static str, value: &str) -> Self {
        JobUpdateStep::ScantNode {
            xpath,
            value: value.to_string(),
            encrypt: false,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Ordered configuration updates for a new job.
///
/// Steps run one at a time and the first failure stops the sequence, so the
/// order here is the order of the remote calls.
pub fn plan_job_updates(settings: &DynamicScanSettings) -> Vec<JobUpdateStep> {
    let mut steps = Vec::new();
    let scan_type_name = settings.scan_type.clone().unwrap_or_default();
    let is_postman = AseScanType::from_name(&scan_type_name) == Some(AseScanType::PostmanCollection);

    if !is_postman {
        if let Some(url) = non_empty(&settings.starting_url) {
            steps.push(JobUpdateStep::scant("StartingUrl", url));
        }
    }

    if let Some(agent) = non_empty(&settings.agent_server) {
        steps.push(JobUpdateStep::AgentServer(agent.to_string()));
    }

    if let Some(login_type) = settings.login_type {
        steps.push(JobUpdateStep::scant("LoginMethod", login_type.as_str()));
        match login_type {
            LoginType::Automatic => {
                steps.push(JobUpdateStep::scant(
                    "LoginUsername",
                    settings.user_name.as_deref().unwrap_or_default(),
                ));
                steps.push(JobUpdateStep::ScantNode {
                    xpath: "LoginPassword",
                    value: settings.password.clone().unwrap_or_default(),
                    encrypt: true,
                });
            }
            LoginType::Manual => {
                if let Some(file) = &settings.traffic_file {
                    steps.push(JobUpdateStep::Traffic {
                        file: file.clone(),
                        action: "login",
                    });
                }
            }
            LoginType::None => {}
        }
    }

    if let Some(file) = &settings.explore_data {
        steps.push(JobUpdateStep::Traffic {
            file: file.clone(),
            action: "add",
        });
    }

    if !scan_type_name.is_empty() && !is_postman {
        steps.push(JobUpdateStep::ScanType(scan_type::scan_type_code(&scan_type_name)));
    }

    if let Some(level) = non_empty(&settings.test_optimization) {
        steps.push(JobUpdateStep::scant("TestOptimization", level));
    }

    if is_postman {
        steps.push(JobUpdateStep::PostmanCollection);
    }

    steps
}

/// Service provider for the legacy job-style API
pub struct AseScanServiceProvider {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthenticationProvider>,
    progress: SharedProgress,
}

impl AseScanServiceProvider {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthenticationProvider>,
        progress: SharedProgress,
    ) -> Self {
        Self {
            transport,
            auth,
            progress,
        }
    }

    fn report(&self, message: Message) {
        self.progress.set_status(message);
    }

    fn login_expired(&self) -> bool {
        if self.auth.is_token_expired() {
            self.report(Message::error(ERROR_LOGIN_EXPIRED));
            return true;
        }
        false
    }

    fn request_headers(&self) -> Headers {
        let mut headers = self.auth.authorization_headers(true);
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn job_url(&self, job_id: &str, suffix: &str) -> String {
        format!("{}{}/{}{}", self.auth.server(), API_JOBS, job_id, suffix)
    }

    fn error_message(response: &HttpResponse) -> Option<String> {
        response
            .json()
            .and_then(|body| body.get("errorMessage").and_then(Value::as_str).map(str::to_string))
    }

    async fn create_job(&self, properties: &ScanProperties) -> Option<String> {
        if self.login_expired() {
            return None;
        }

        let settings = &properties.dynamic;
        let Some(template_id) = non_empty(&settings.template_id) else {
            self.report(Message::error("Unable to create the job: a template id is required"));
            return None;
        };

        self.report(Message::info("Creating job..."));

        let mut form = BTreeMap::new();
        for (key, value) in [
            ("testPolicyId", &settings.test_policy_id),
            ("folderId", &settings.folder),
            ("applicationId", &settings.application),
            ("name", &properties.scan_name),
            ("description", &settings.description),
            ("contact", &settings.contact),
        ] {
            if let Some(value) = value {
                form.insert(key.to_string(), value.clone());
            }
        }

        let url = self.job_url(template_id, "/dastconfig/createjob");
        let response = match self.transport.post_form(&url, self.request_headers(), form).await {
            Ok(response) => response,
            Err(e) => {
                self.report(Message::error(format!("Unable to create the job: {}", e)));
                return None;
            }
        };

        // invalid input comes back as a bare 400/404
        if response.code == 400 || response.code == 404 {
            self.report(Message::error("Unable to create the job: invalid job details"));
            return None;
        }

        let body = response.json();
        if response.code == 201 {
            if let Some(id) = body.as_ref().and_then(|b| b.get("id")).map(value_to_string) {
                self.report(Message::info(format!("Job {} created", id)));
                return Some(id);
            }
        }

        match body.as_ref().and_then(|b| b.get("Message")).and_then(Value::as_str) {
            Some(message) => self.report(Message::error(message)),
            None => self.report(Message::error(format!(
                "Unable to create the job. Status code: {}",
                response.code
            ))),
        }
        None
    }

    /// Apply every planned update, stopping at the first failure
    async fn update_job(&self, job_id: &str, settings: &DynamicScanSettings) -> bool {
        for step in plan_job_updates(settings) {
            debug!("Job {}: applying {:?}", job_id, step);
            if !self.apply_step(job_id, &step, settings).await {
                warn!("Job {}: update stopped at {:?}", job_id, step);
                return false;
            }
        }
        true
    }

    async fn apply_step(&self, job_id: &str, step: &JobUpdateStep, settings: &DynamicScanSettings) -> bool {
        if self.login_expired() {
            return false;
        }

        let result = match step {
            JobUpdateStep::ScantNode { xpath, value, encrypt } => {
                let mut form = BTreeMap::new();
                form.insert("scantNodeXpath".to_string(), xpath.to_string());
                form.insert("scantNodeNewValue".to_string(), value.clone());
                form.insert("encryptNodeValue".to_string(), encrypt.to_string());
                let url = self.job_url(job_id, "/dastconfig/updatescant");
                self.transport.post_form(&url, self.request_headers(), form).await
            }
            JobUpdateStep::AgentServer(agent) => {
                let url = self.job_url(job_id, &format!("/dastconfig/updateagentserver/{}", agent));
                self.transport
                    .post_form(&url, self.request_headers(), BTreeMap::new())
                    .await
            }
            JobUpdateStep::Traffic { file, action } => {
                if !file.is_file() {
                    self.report(Message::error(format!("File not found: {}", file.display())));
                    return false;
                }
                let url = self.job_url(job_id, &format!("/dastconfig/updatetraffic/{}", action));
                let parts = vec![HttpPart::file("uploadedfile", file)];
                self.transport.post_multipart(&url, self.request_headers(), parts).await
            }
            JobUpdateStep::ScanType(code) => {
                let url = format!(
                    "{}{}/scantype?scanTypeId={}&jobId={}",
                    self.auth.server(),
                    API_JOBS,
                    code,
                    job_id
                );
                self.transport.put(&url, self.request_headers(), None).await
            }
            JobUpdateStep::PostmanCollection => {
                let url = self.job_url(job_id, "/dastconfig/updatepostmancollection");
                let headers = self.request_headers();
                let parts = self.postman_parts(settings, &headers);
                self.transport.post_multipart(&url, headers, parts).await
            }
        };

        match result {
            Ok(response) if response.code == 200 => {
                if matches!(step, JobUpdateStep::PostmanCollection) {
                    self.report(Message::info(format!("Postman collection added to job {}", job_id)));
                }
                true
            }
            Ok(response) => {
                match Self::error_message(&response) {
                    Some(text) => self.report(Message::error(text)),
                    None => self.report(Message::error(format!(
                        "Unable to update the job. Status code: {}",
                        response.code
                    ))),
                }
                false
            }
            Err(e) => {
                self.report(Message::error(format!("Unable to update the job: {}", e)));
                false
            }
        }
    }

    fn postman_parts(&self, settings: &DynamicScanSettings, headers: &Headers) -> Vec<HttpPart> {
        let mut parts = Vec::new();
        for (file, part_name) in [
            (&settings.postman_collection_file, "postmanCollectionFile"),
            (&settings.environmental_variables_file, "postmanEnvironmentFile"),
            (&settings.global_variables_file, "postmanGlobalFile"),
            (&settings.additional_files, "postmanAdditionalFiles"),
        ] {
            let Some(file) = file else {
                continue;
            };
            if file.is_file() {
                parts.push(HttpPart::file(part_name, file));
            } else {
                self.report(Message::error(format!("File not found: {}", file.display())));
            }
        }

        if let Some(domains) = &settings.additional_domains {
            parts.push(HttpPart::text("additionalDomains", domains.clone()));
        }
        parts.push(HttpPart::text(
            XSRF_HEADER,
            headers.get(XSRF_HEADER).cloned().unwrap_or_default(),
        ));
        parts
    }

    /// Current optimistic-concurrency token of the job
    async fn get_etag(&self, job_id: &str) -> Option<String> {
        if self.login_expired() {
            return None;
        }

        match self.transport.get(&self.job_url(job_id, ""), self.request_headers()).await {
            Ok(response) if response.code == 200 => response.header("ETag").map(str::to_string),
            Ok(response) => {
                debug!("Job {} lookup returned {}", job_id, response.code);
                None
            }
            Err(e) => {
                debug!("Job {} lookup failed: {}", job_id, e);
                None
            }
        }
    }

    async fn run_job(&self, job_id: &str) -> bool {
        if self.login_expired() {
            return false;
        }

        self.report(Message::info("Executing job..."));

        let Some(etag) = self.get_etag(job_id).await else {
            self.report(Message::error(format!(
                "Unable to execute job {}: the job version could not be read",
                job_id
            )));
            return false;
        };

        let mut headers = self.request_headers();
        headers.insert("If-Match".to_string(), etag);
        let mut form = BTreeMap::new();
        form.insert("type".to_string(), "run".to_string());

        match self
            .transport
            .post_form(&self.job_url(job_id, "/actions"), headers, form)
            .await
        {
            Ok(response) if response.code == 200 => {
                info!("Job {} started", job_id);
                self.report(Message::info("Job execution started."));
                true
            }
            Ok(response) => {
                self.report(Message::error(format!(
                    "Unable to execute the job. Status code: {}",
                    response.code
                )));
                false
            }
            Err(e) => {
                self.report(Message::error(format!("Unable to execute the job: {}", e)));
                false
            }
        }
    }

    /// Report packs are created alongside their job, one id later
    fn report_pack_id(job_id: &str) -> Option<String> {
        job_id.trim().parse::<u64>().ok().map(|id| (id + 1).to_string())
    }
}

/// Reduce the "Security Issues" report of a report-pack summary to counts
pub fn security_issue_counts(summary: &Value) -> Option<FindingCounts> {
    let reports = summary.get("reports")?.get("report")?.as_array()?;
    let security = reports.iter().find(|report| {
        report
            .get("name")
            .and_then(Value::as_str)
            .map(|name| name.eq_ignore_ascii_case("Security Issues"))
            .unwrap_or(false)
    })?;

    let issue_counts = security.get("issue-counts-severity")?.get("issue-count")?.as_array()?;
    let mut items = Vec::with_capacity(issue_counts.len());
    for entry in issue_counts {
        let severity = entry.get("severity")?.get("name")?.as_str()?;
        let count = match entry.get("count")? {
            Value::String(s) => s.trim().parse::<u64>().ok()?,
            other => other.as_u64()?,
        };
        items.push(SeverityCount::new(severity, count));
    }
    Some(FindingCounts::from_severity_counts(&items))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ScanServiceProvider for AseScanServiceProvider {
    async fn create_and_execute_scan(&self, scan_type: ScanType, properties: &ScanProperties) -> Option<String> {
        debug!("Creating {} job", scan_type);
        let job_id = self.create_job(properties).await?;
        if !self.update_job(&job_id, &properties.dynamic).await {
            return None;
        }
        if !self.run_job(&job_id).await {
            return None;
        }
        Some(job_id)
    }

    async fn rescan(&self, _scan_id: &str, _properties: &ScanProperties) -> AppScanResult<Option<String>> {
        Err(AppScanError::NotImplemented("rescan"))
    }

    async fn submit_file(&self, _file: &Path) -> AppScanResult<Option<String>> {
        Err(AppScanError::NotImplemented("submit_file"))
    }

    async fn get_scan_details(&self, job_id: &str) -> Option<ScanDetails> {
        if self.login_expired() {
            return None;
        }

        let Some(pack_id) = Self::report_pack_id(job_id) else {
            self.report(Message::error(format!("The job id {} is not valid", job_id)));
            return None;
        };

        let url = format!("{}{}/{}/reports", self.auth.server(), API_REPORT_PACKS, pack_id);
        let response = match self.transport.get(&url, self.request_headers()).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Report pack {} unavailable: {}", pack_id, e);
                return Some(ScanDetails::unknown());
            }
        };

        match response.code {
            200 | 201 => match response.json().as_ref().and_then(security_issue_counts) {
                Some(summary) => Some(ScanDetails {
                    id: Some(job_id.to_string()),
                    status: Some("Ready".to_string()),
                    summary: Some(summary),
                    ..Default::default()
                }),
                None => {
                    debug!("Report pack {} has no security summary yet", pack_id);
                    Some(ScanDetails::unknown())
                }
            },
            400 => {
                self.report(Message::error(format!("The job id {} is not valid", job_id)));
                None
            }
            code => {
                debug!("Report pack {} not ready (status {})", pack_id, code);
                Some(ScanDetails::unknown())
            }
        }
    }

    async fn get_non_compliant_issues(&self, _scan_id: &str) -> AppScanResult<Option<Vec<SeverityCount>>> {
        Err(AppScanError::NotImplemented("get_non_compliant_issues"))
    }

    async fn get_non_compliant_issues_using_execution_id(
        &self,
        _execution_id: &str,
    ) -> AppScanResult<Option<Vec<SeverityCount>>> {
        Err(AppScanError::NotImplemented("get_non_compliant_issues_using_execution_id"))
    }

    async fn get_base_scan_details(&self, _scan_id: &str) -> Option<Vec<ExecutionDetails>> {
        None
    }

    async fn fetch_report(&self, job_id: &str, request: &ReportRequest, destination: &Path) -> AppScanResult<bool> {
        if self.login_expired() {
            return Ok(false);
        }

        let Some(pack_id) = Self::report_pack_id(job_id) else {
            self.report(Message::error(format!("The job id {} is not valid", job_id)));
            return Ok(false);
        };

        let url = format!(
            "{}{}/{}/reports/download?format={}",
            self.auth.server(),
            API_REPORT_PACKS,
            pack_id,
            request.format
        );
        match self.transport.get(&url, self.auth.authorization_headers(false)).await {
            Ok(response) if response.is_success() => {
                if let Err(e) = response.write_to_file(destination).await {
                    self.report(Message::error(format!("Unable to write {}: {}", destination.display(), e)));
                    return Ok(false);
                }
                self.report(Message::info(format!("Report saved to {}", destination.display())));
                Ok(true)
            }
            Ok(response) => {
                self.report(Message::error(format!("Report download failed. Status code: {}", response.code)));
                Ok(false)
            }
            Err(e) => {
                self.report(Message::error(format!("An error occurred downloading the report: {}", e)));
                Ok(false)
            }
        }
    }

    async fn has_entitlement(&self, scan_type: ScanType) -> bool {
        matches!(scan_type, ScanType::DynamicAnalyzer | ScanType::PostmanCollection)
    }

    fn authentication(&self) -> &dyn AuthenticationProvider {
        self.auth.as_ref()
    }

    fn dialect(&self) -> ServiceDialect {
        ServiceDialect::Enterprise
    }
}
