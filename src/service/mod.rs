pub mod ase;
pub mod cloud;
pub mod scan_type;
pub mod util;

pub use ase::AseScanServiceProvider;
pub use cloud::CloudScanServiceProvider;
pub use scan_type::AseScanType;

use crate::auth::AuthenticationProvider;
use crate::config::ServiceDialect;
use crate::error::AppScanResult;
use crate::results::FindingCounts;
use crate::scan::{ScanProperties, ScanType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sentinel status reported while a scan is not yet visible to the backend
pub const UNKNOWN_STATUS: &str = "Unknown";

/// Error key returned by the backend when the credential may not read a scan
pub const UNAUTHORIZED_ACTION: &str = "UNAUTHORIZED_ACTION";

/// Latest execution of a scan, as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionDetails {
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    pub user_message: Option<String>,
    pub created_at: Option<String>,
}

/// Status and metadata snapshot of one scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanDetails {
    pub id: Option<String>,
    pub name: Option<String>,
    pub app_id: Option<String>,
    pub technology: Option<String>,
    pub status: Option<String>,
    pub key: Option<String>,
    pub message: Option<String>,
    pub latest_execution: Option<ExecutionDetails>,
    /// Pre-aggregated finding counts (job-style service only)
    #[serde(skip)]
    pub summary: Option<FindingCounts>,
}

impl ScanDetails {
    /// Placeholder returned while the scan is not yet visible
    pub fn unknown() -> Self {
        Self {
            status: Some(UNKNOWN_STATUS.to_string()),
            ..Default::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status.as_deref() == Some(UNKNOWN_STATUS)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.key.as_deref() == Some(UNAUTHORIZED_ACTION)
    }
}

/// Number of open issues for one (status, severity) group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeverityCount {
    #[serde(default)]
    pub status: Option<String>,
    pub severity: String,
    #[serde(alias = "N")]
    pub count: u64,
}

impl SeverityCount {
    pub fn new(severity: &str, count: u64) -> Self {
        Self {
            status: None,
            severity: severity.to_string(),
            count,
        }
    }
}

/// Options for a generated report file
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub format: String,
    pub title: Option<String>,
    pub locale: Option<String>,
}

impl ReportRequest {
    pub fn new(format: &str) -> Self {
        Self {
            format: format.to_string(),
            title: None,
            locale: None,
        }
    }
}

/// Bounds on waiting for a report to be generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPolling {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for ReportPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            attempts: 60,
        }
    }
}

/// Backend operations needed to run a scan and read its results.
///
/// Operations returning `Option` never fail outright: any problem is reported
/// to the progress sink first and `None` is returned. Every operation checks
/// the credential before touching the network.
#[async_trait]
pub trait ScanServiceProvider: Send + Sync {
    /// Create a scan of the given engine, apply `properties` and start it
    async fn create_and_execute_scan(&self, scan_type: ScanType, properties: &ScanProperties) -> Option<String>;

    /// Run a previous scan again with updated settings
    async fn rescan(&self, scan_id: &str, properties: &ScanProperties) -> AppScanResult<Option<String>>;

    /// Upload an artifact and return its file id
    async fn submit_file(&self, file: &Path) -> AppScanResult<Option<String>>;

    async fn get_scan_details(&self, scan_id: &str) -> Option<ScanDetails>;

    async fn get_non_compliant_issues(&self, scan_id: &str) -> AppScanResult<Option<Vec<SeverityCount>>>;

    async fn get_non_compliant_issues_using_execution_id(
        &self,
        execution_id: &str,
    ) -> AppScanResult<Option<Vec<SeverityCount>>>;

    /// Executions of a scan that can serve as the base of an incremental scan
    async fn get_base_scan_details(&self, scan_id: &str) -> Option<Vec<ExecutionDetails>>;

    /// Generate a report for `scan_id` and write it to `destination`
    async fn fetch_report(&self, scan_id: &str, request: &ReportRequest, destination: &Path) -> AppScanResult<bool>;

    /// Whether the current credential may run the given engine
    async fn has_entitlement(&self, scan_type: ScanType) -> bool;

    fn authentication(&self) -> &dyn AuthenticationProvider;

    fn dialect(&self) -> ServiceDialect;
}

/// Substitute `{0}`, `{1}`, ... placeholders in a backend error message
pub(crate) fn format_message(template: &str, params: &[String]) -> String {
    params
        .iter()
        .enumerate()
        .fold(template.to_string(), |message, (index, value)| {
            message.replace(&format!("{{{}}}", index), value)
        })
}
