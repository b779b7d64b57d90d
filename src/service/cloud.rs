use super::{
    format_message, util, ExecutionDetails, ReportPolling, ReportRequest, ScanDetails, ScanServiceProvider,
    SeverityCount, UNAUTHORIZED_ACTION,
};
use crate::auth::AuthenticationProvider;
use crate::config::ServiceDialect;
use crate::error::AppScanResult;
use crate::http::{Headers, HttpPart, HttpResponse, HttpTransport};
use crate::progress::{Message, SharedProgress};
use crate::scan::{ScanProperties, ScanType};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const API_BASIC_DETAILS: &str = "/api/v4/Scans";
pub const API_ISSUES: &str = "/api/v4/Issues";
pub const API_FILE_UPLOAD: &str = "/api/v4/FileUpload";
pub const API_TENANT_INFO: &str = "/api/v4/Account/TenantInfo";
pub const API_APPS: &str = "/api/v4/Apps";
pub const API_IS_VALID_URL: &str = "/api/v4/Utilities/IsValidUrl";
pub const API_IS_VALID_DOMAIN: &str = "/api/v4/Utilities/IsValidDomain";
pub const API_REPORTS: &str = "/api/v4/Reports";

/// Open, in-progress and reopened issues grouped by (status, severity)
const ISSUES_QUERY: &str = "applyPolicies=All&%24filter=Status%20eq%20%27Open%27%20or%20Status%20eq%20%27InProgress%27%20or%20Status%20eq%20%27Reopened%27&%24apply=groupby%28%28Status%2CSeverity%29%2Caggregate%28%24count%20as%20N%29%29";

const BASE_SCAN_QUERY: &str = "$filter=IsValidForIncremental%20eq%20true&%24select=Id%2C%20CreatedAt%2C%20IsValidForIncremental&%24orderby=CreatedAt%20desc";

/// Files uploaded without the source-archive hint
const DIRECT_UPLOAD_EXTENSIONS: [&str; 4] = ["irx", "scan", "scant", "config"];

const ERROR_LOGIN_EXPIRED: &str = "Your session has expired. Please log in again.";

/// Service provider for the resource-style REST API
pub struct CloudScanServiceProvider {
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthenticationProvider>,
    progress: SharedProgress,
    report_polling: ReportPolling,
}

impl CloudScanServiceProvider {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthenticationProvider>,
        progress: SharedProgress,
    ) -> Self {
        Self {
            transport,
            auth,
            progress,
            report_polling: ReportPolling::default(),
        }
    }

    pub fn with_report_polling(mut self, polling: ReportPolling) -> Self {
        self.report_polling = polling;
        self
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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.auth.server(), path)
    }

    fn json_headers(&self) -> Headers {
        let mut headers = self.auth.authorization_headers(true);
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    /// Backend error text, with `FormatParams` substituted when present
    fn error_text(response: &HttpResponse) -> Option<String> {
        let body = response.json()?;
        let message = body.get("Message")?.as_str()?;
        let params: Vec<String> = body
            .get("FormatParams")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(value_to_string).collect())
            .unwrap_or_default();
        Some(format_message(message, &params))
    }

    async fn verify_application(&self, app_id: &str) -> bool {
        if !app_id.trim().is_empty() {
            let url = format!("{}?$filter=Id%20eq%20%27{}%27&%24select=Id", self.url(API_APPS), app_id);
            match self.transport.get(&url, self.json_headers()).await {
                Ok(response) if response.is_success() => {
                    let found = response
                        .json()
                        .and_then(|body| body.get("Items").and_then(Value::as_array).cloned())
                        .map(|items| items.iter().any(|item| item.get("Id").map(value_to_string).as_deref() == Some(app_id)))
                        .unwrap_or(false);
                    if found {
                        return true;
                    }
                }
                Ok(response) => debug!("Application lookup returned {}", response.code),
                Err(e) => warn!("Application lookup failed: {}", e),
            }
        }

        self.report(Message::error(format!(
            "The application {} does not exist or you do not have access to it.",
            app_id
        )));
        false
    }

    /// POST a scan request and report the outcome
    async fn execute_scan(
        &self,
        url: &str,
        body: Value,
        properties: &ScanProperties,
        success_label: &str,
    ) -> Option<String> {
        if self.login_expired() {
            return None;
        }
        if let Some(app_id) = properties.app_id.as_deref() {
            if !self.verify_application(app_id).await {
                return None;
            }
        }

        let response = match self.transport.post(url, self.json_headers(), body).await {
            Ok(response) => response,
            Err(e) => {
                self.report(Message::error(format!("An error occurred submitting the scan: {}", e)));
                return None;
            }
        };

        if response.code == 200 || response.code == 201 {
            let Some(id) = response.json().and_then(|body| body.get("Id").map(value_to_string)) else {
                self.report(Message::error("An error occurred submitting the scan: no scan id returned"));
                return None;
            };

            let overview_id = properties.scan_id.as_deref().unwrap_or(&id);
            let overview = format!(
                "{}/main/myapps/{}/scans/{}",
                self.auth.server(),
                properties.app_id.as_deref().unwrap_or_default(),
                overview_id
            );
            info!("Scan {} accepted", id);
            self.report(Message::info(format!("{} {}", success_label, id)));
            self.report(Message::info(format!("Scan overview: {}", overview)));
            return Some(id);
        }

        match Self::error_text(&response) {
            Some(text) => self.report(Message::error(text)),
            None => self.report(Message::error(format!(
                "An error occurred submitting the scan. Status code: {}",
                response.code
            ))),
        }
        None
    }

    /// Update the editable fields of an existing scan
    async fn update_scan_data(&self, scan_id: &str, properties: &ScanProperties) {
        if self.login_expired() {
            return;
        }

        let url = format!("{}/{}", self.url(API_BASIC_DETAILS), scan_id);
        let mut body = Map::new();
        if let Some(name) = &properties.scan_name {
            body.insert("Name".to_string(), json!(name));
        }
        body.insert("EnableMailNotifications".to_string(), json!(properties.email_notification));
        body.insert("FullyAutomatic".to_string(), json!(properties.fully_automatic));

        match self.transport.put(&url, self.json_headers(), Some(Value::Object(body))).await {
            Ok(response) if response.code == 204 => self.report(Message::info("Scan settings updated.")),
            Ok(response) => debug!("Scan update returned {}", response.code),
            Err(e) => self.report(Message::error(format!("An error occurred updating the scan: {}", e))),
        }
    }

    async fn non_compliant_issues(&self, id_type: &str, id: &str) -> Option<Vec<SeverityCount>> {
        if self.login_expired() {
            return None;
        }

        let url = format!("{}/{}/{}?{}", self.url(API_ISSUES), id_type, id, ISSUES_QUERY);
        let mut headers = self.json_headers();
        headers.insert("Content-Type".to_string(), "application/json; charset=UTF-8".to_string());

        let response = match self.transport.get(&url, headers).await {
            Ok(response) => response,
            Err(e) => {
                self.report(Message::error(format!("An error occurred retrieving issues: {}", e)));
                return None;
            }
        };

        if response.is_success() {
            let items = response
                .json()
                .and_then(|body| body.get("Items").cloned())
                .and_then(|items| serde_json::from_value::<Vec<SeverityCount>>(items).ok());
            if items.is_none() {
                self.report(Message::error(format!("Unreadable issue counts for {} {}", id_type, id)));
            }
            return items;
        }

        if response.code == 400 {
            self.report(Message::error(format!("Unable to retrieve information for {} {}", id_type, id)));
        } else {
            let text = Self::error_text(&response).unwrap_or_else(|| {
                format!("An error occurred retrieving details. Status code: {}", response.code)
            });
            self.report(Message::error(text));
        }
        None
    }

    async fn request_report(&self, scan_id: &str, request: &ReportRequest) -> Option<String> {
        let url = format!("{}/Security/Scan/{}", self.url(API_REPORTS), scan_id);
        let body = json!({
            "Configuration": {
                "Summary": true,
                "Details": true,
                "Discussion": false,
                "Overview": true,
                "TableOfContent": true,
                "Advisories": true,
                "FixRecommendation": true,
                "History": true,
                "IsTrialReport": false,
                "ReportFileType": request.format,
                "Title": request.title.clone().unwrap_or_default(),
                "Notes": "",
                "Locale": request.locale.clone().unwrap_or_else(|| "en-US".to_string()),
            },
            "ApplyPolicies": "All",
        });

        match self.transport.post(&url, self.json_headers(), body).await {
            Ok(response) if response.is_success() => {
                let id = response.json().and_then(|body| body.get("Id").map(value_to_string));
                if id.is_none() {
                    self.report(Message::error("Report generation did not return a report id"));
                }
                id
            }
            Ok(response) => {
                let text = Self::error_text(&response)
                    .unwrap_or_else(|| format!("Report generation failed. Status code: {}", response.code));
                self.report(Message::error(text));
                None
            }
            Err(e) => {
                self.report(Message::error(format!("An error occurred requesting the report: {}", e)));
                None
            }
        }
    }

    /// Poll the report job until it is ready; `false` on failure or timeout
    async fn wait_for_report(&self, report_id: &str) -> bool {
        let url = format!("{}?$filter=Id%20eq%20{}", self.url(API_REPORTS), report_id);

        for attempt in 1..=self.report_polling.attempts {
            let status = match self.transport.get(&url, self.json_headers()).await {
                Ok(response) if response.is_success() => response.json().and_then(|body| {
                    body.get("Items")
                        .and_then(Value::as_array)
                        .and_then(|items| items.first())
                        .and_then(|item| item.get("Status"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }),
                Ok(response) => {
                    debug!("Report status returned {}", response.code);
                    None
                }
                Err(e) => {
                    self.report(Message::error(format!("An error occurred checking the report: {}", e)));
                    return false;
                }
            };

            match status.as_deref() {
                Some(s) if s.eq_ignore_ascii_case("Ready") => return true,
                Some(s) if s.eq_ignore_ascii_case("Failed") || s.eq_ignore_ascii_case("Abandoned") => {
                    self.report(Message::error(format!("Report {} could not be generated", report_id)));
                    return false;
                }
                _ => debug!("Report {} not ready (attempt {})", report_id, attempt),
            }

            if attempt < self.report_polling.attempts && !self.report_polling.interval.is_zero() {
                tokio::time::sleep(self.report_polling.interval).await;
            }
        }

        self.report(Message::error(format!(
            "Report {} was not ready after {} attempts",
            report_id, self.report_polling.attempts
        )));
        false
    }
}

/// Body of a create-scan request for the given engine
fn scan_request_body(scan_type: ScanType, properties: &ScanProperties) -> Value {
    let mut body = Map::new();
    let mut put = |key: &str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            body.insert(key.to_string(), json!(value));
        }
    };

    put("AppId", properties.app_id.as_deref());
    put("ScanName", properties.scan_name.as_deref());
    put("FileId", properties.file_id.as_deref());
    put("Comment", properties.comment.as_deref());
    put("Locale", properties.locale.as_deref());

    if matches!(scan_type, ScanType::DynamicAnalyzer | ScanType::PostmanCollection) {
        let dynamic = &properties.dynamic;
        put("StartingUrl", dynamic.starting_url.as_deref());
        put("LoginUser", dynamic.user_name.as_deref());
        put("LoginPassword", dynamic.password.as_deref());
        put("ScanType", dynamic.scan_type.as_deref());
        put("TestOptimizationLevel", dynamic.test_optimization.as_deref());
        put("PresenceId", dynamic.presence_id.as_deref());
        put("LoginType", dynamic.login_type.as_ref().map(|l| l.as_str()));
    }

    body.insert("EnableMailNotification".to_string(), json!(properties.email_notification));
    body.insert("Personal".to_string(), json!(properties.personal));
    body.insert("FullyAutomatic".to_string(), json!(properties.fully_automatic));
    Value::Object(body)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn needs_source_archive_hint(file: &Path) -> bool {
    let extension = file
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    !DIRECT_UPLOAD_EXTENSIONS.contains(&extension.as_str())
}

#[async_trait]
impl ScanServiceProvider for CloudScanServiceProvider {
    async fn create_and_execute_scan(&self, scan_type: ScanType, properties: &ScanProperties) -> Option<String> {
        let url = format!("{}/{}", self.url(API_BASIC_DETAILS), scan_type.short_form());
        let label = format!("Successfully created {} scan with id", scan_type.short_form().to_uppercase());
        self.execute_scan(&url, scan_request_body(scan_type, properties), properties, &label)
            .await
    }

    async fn rescan(&self, scan_id: &str, properties: &ScanProperties) -> AppScanResult<Option<String>> {
        self.update_scan_data(scan_id, properties).await;

        let url = format!("{}/{}/Execute", self.url(API_BASIC_DETAILS), scan_id);
        let mut body = Map::new();
        if let Some(file_id) = &properties.file_id {
            body.insert("FileId".to_string(), json!(file_id));
        }
        if let Some(comment) = &properties.comment {
            body.insert("Comment".to_string(), json!(comment));
        }

        let mut properties = properties.clone();
        properties.scan_id.get_or_insert_with(|| scan_id.to_string());
        Ok(self
            .execute_scan(&url, Value::Object(body), &properties, "Successfully started a new execution of scan")
            .await)
    }

    async fn submit_file(&self, file: &Path) -> AppScanResult<Option<String>> {
        if self.login_expired() {
            return Ok(None);
        }

        self.report(Message::info(format!("Uploading {}", file.display())));

        let mut url = self.url(API_FILE_UPLOAD);
        if needs_source_archive_hint(file) {
            url.push_str("?fileType=SourceCodeArchive");
        }

        let parts = vec![HttpPart::file("uploadedFile", file)];
        let response = match self
            .transport
            .post_multipart(&url, self.auth.authorization_headers(true), parts)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.report(Message::error(format!("An error occurred uploading {}: {}", file.display(), e)));
                return Ok(None);
            }
        };

        let body = response.json();
        if let Some(message) = body.as_ref().and_then(|b| b.get("Message")).and_then(Value::as_str) {
            self.report(Message::error(message));
            return Ok(None);
        }

        match body.as_ref().and_then(|b| b.get("FileId")).map(value_to_string) {
            Some(file_id) => {
                debug!("Uploaded {} as {}", file.display(), file_id);
                Ok(Some(file_id))
            }
            None => {
                self.report(Message::error(format!(
                    "An error occurred uploading {}: status code {}",
                    file.display(),
                    response.code
                )));
                Ok(None)
            }
        }
    }

    async fn get_scan_details(&self, scan_id: &str) -> Option<ScanDetails> {
        if self.login_expired() {
            return None;
        }

        let url = format!("{}?$filter=Id%20eq%20{}", self.url(API_BASIC_DETAILS), scan_id);
        let response = match self.transport.get(&url, self.auth.authorization_headers(true)).await {
            Ok(response) => response,
            Err(e) => {
                // the scan may not be visible yet
                debug!("Scan details for {} unavailable: {}", scan_id, e);
                return Some(ScanDetails::unknown());
            }
        };

        match response.code {
            200 | 201 => {
                let first = response
                    .json()
                    .and_then(|body| body.get("Items").and_then(Value::as_array).and_then(|a| a.first().cloned()));
                match first.map(serde_json::from_value::<ScanDetails>) {
                    Some(Ok(details)) => return Some(details),
                    _ => self.report(Message::error(format!(
                        "An error occurred retrieving details for scan id {}",
                        scan_id
                    ))),
                }
            }
            400 => self.report(Message::error(format!("The scan id {} is not valid", scan_id))),
            code => {
                if let Some(text) = Self::error_text(&response) {
                    self.report(Message::error(text));
                }
                if code == 403 {
                    let details = response
                        .json()
                        .and_then(|body| serde_json::from_value::<ScanDetails>(body).ok())
                        .filter(|details| details.key.as_deref() == Some(UNAUTHORIZED_ACTION));
                    if details.is_some() {
                        return details;
                    }
                }
            }
        }
        None
    }

    async fn get_non_compliant_issues(&self, scan_id: &str) -> AppScanResult<Option<Vec<SeverityCount>>> {
        Ok(self.non_compliant_issues("Scan", scan_id).await)
    }

    async fn get_non_compliant_issues_using_execution_id(
        &self,
        execution_id: &str,
    ) -> AppScanResult<Option<Vec<SeverityCount>>> {
        Ok(self.non_compliant_issues("ScanExecution", execution_id).await)
    }

    async fn get_base_scan_details(&self, scan_id: &str) -> Option<Vec<ExecutionDetails>> {
        if self.login_expired() {
            return None;
        }

        let url = format!("{}/{}/Executions?{}", self.url(API_BASIC_DETAILS), scan_id, BASE_SCAN_QUERY);
        match self.transport.get(&url, self.json_headers()).await {
            Ok(response) if response.is_success() => {
                response.json().and_then(|body| serde_json::from_value(body).ok())
            }
            _ => None,
        }
    }

    async fn fetch_report(&self, scan_id: &str, request: &ReportRequest, destination: &Path) -> AppScanResult<bool> {
        if self.login_expired() {
            return Ok(false);
        }

        let Some(report_id) = self.request_report(scan_id, request).await else {
            return Ok(false);
        };
        if !self.wait_for_report(&report_id).await {
            return Ok(false);
        }

        let url = format!("{}/{}/Download", self.url(API_REPORTS), report_id);
        let response = match self.transport.get(&url, self.auth.authorization_headers(false)).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                self.report(Message::error(format!("Report download failed. Status code: {}", response.code)));
                return Ok(false);
            }
            Err(e) => {
                self.report(Message::error(format!("An error occurred downloading the report: {}", e)));
                return Ok(false);
            }
        };

        if let Err(e) = response.write_to_file(destination).await {
            self.report(Message::error(format!("Unable to write {}: {}", destination.display(), e)));
            return Ok(false);
        }

        self.report(Message::info(format!("Report saved to {}", destination.display())));
        Ok(true)
    }

    async fn has_entitlement(&self, scan_type: ScanType) -> bool {
        match scan_type {
            ScanType::CombinedStaticComposition => {
                util::has_sast_entitlement(self.auth.as_ref(), self.transport.as_ref()).await
                    && util::has_sca_entitlement(self.auth.as_ref(), self.transport.as_ref()).await
            }
            other => util::has_entitlement(other.technology(), self.auth.as_ref(), self.transport.as_ref()).await,
        }
    }

    fn authentication(&self) -> &dyn AuthenticationProvider {
        self.auth.as_ref()
    }

    fn dialect(&self) -> ServiceDialect {
        ServiceDialect::Cloud
    }
}
