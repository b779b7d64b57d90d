use crate::error::{AppScanError, AppScanResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Scan engines known to the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanType {
    StaticAnalyzer,
    DynamicAnalyzer,
    CompositionAnalyzer,
    CombinedStaticComposition,
    PostmanCollection,
}

impl ScanType {
    /// Display name used by the backend and in combined type names
    pub fn name(&self) -> &'static str {
        match self {
            ScanType::StaticAnalyzer => "Static Analyzer",
            ScanType::DynamicAnalyzer => "Dynamic Analyzer",
            ScanType::CompositionAnalyzer => "Software Composition Analyzer",
            ScanType::CombinedStaticComposition => "Static Analyzer_Software Composition Analyzer",
            ScanType::PostmanCollection => "Postman Collection",
        }
    }

    /// Short form used in resource URLs (`/Scans/{short}`) and report file prefixes
    pub fn short_form(&self) -> &'static str {
        match self {
            ScanType::StaticAnalyzer => "Sast",
            ScanType::DynamicAnalyzer | ScanType::PostmanCollection => "Dast",
            ScanType::CompositionAnalyzer => "Sca",
            ScanType::CombinedStaticComposition => "Sast_Sca",
        }
    }

    /// Technology identifier reported by the backend (entitlements, scan details)
    pub fn technology(&self) -> &'static str {
        match self {
            ScanType::StaticAnalyzer => "StaticAnalyzer",
            ScanType::DynamicAnalyzer | ScanType::PostmanCollection => "DynamicAnalyzer",
            ScanType::CompositionAnalyzer => "SoftwareCompositionAnalyzer",
            ScanType::CombinedStaticComposition => "StaticAnalyzer,SoftwareCompositionAnalyzer",
        }
    }

    /// Engines that consume an uploaded IRX archive
    pub fn is_upload_based(&self) -> bool {
        matches!(
            self,
            ScanType::StaticAnalyzer | ScanType::CompositionAnalyzer | ScanType::CombinedStaticComposition
        )
    }

    pub fn from_short_form(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "sast" | "static" => Some(ScanType::StaticAnalyzer),
            "dast" | "dynamic" => Some(ScanType::DynamicAnalyzer),
            "sca" => Some(ScanType::CompositionAnalyzer),
            "sast_sca" => Some(ScanType::CombinedStaticComposition),
            "postman" => Some(ScanType::PostmanCollection),
            _ => None,
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginType {
    None,
    Automatic,
    Manual,
}

impl LoginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginType::None => "None",
            LoginType::Automatic => "Automatic",
            LoginType::Manual => "Manual",
        }
    }
}

/// Settings for dynamic (running application) scans.
///
/// The first group applies to both service dialects; the second is only read
/// by the job-style service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DynamicScanSettings {
    pub starting_url: Option<String>,
    pub login_type: Option<LoginType>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// Recorded login traffic (manual login)
    pub traffic_file: Option<PathBuf>,
    /// Recorded explore traffic to seed the crawl
    pub explore_data: Option<PathBuf>,
    /// "Full Scan", "Test Only" or "Postman Collection"
    pub scan_type: Option<String>,
    pub test_optimization: Option<String>,
    pub presence_id: Option<String>,

    pub template_id: Option<String>,
    pub test_policy_id: Option<String>,
    pub folder: Option<String>,
    pub application: Option<String>,
    pub description: Option<String>,
    pub contact: Option<String>,
    pub agent_server: Option<String>,
    pub postman_collection_file: Option<PathBuf>,
    pub environmental_variables_file: Option<PathBuf>,
    pub global_variables_file: Option<PathBuf>,
    pub additional_files: Option<PathBuf>,
    pub additional_domains: Option<String>,
}

/// Caller-supplied configuration for one scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanProperties {
    /// Local path or URL to scan
    pub target: Option<String>,
    pub scan_name: Option<String>,
    pub app_id: Option<String>,
    /// Uploaded artifact id, filled in during submission
    pub file_id: Option<String>,
    /// Previous scan to run again
    pub scan_id: Option<String>,
    /// Generate the IRX archive but never submit it
    pub prepare_only: bool,
    pub email_notification: bool,
    pub personal: bool,
    pub fully_automatic: bool,
    pub comment: Option<String>,
    pub locale: Option<String>,
    pub report_format: Option<String>,
    pub dynamic: DynamicScanSettings,
}

impl ScanProperties {
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_scan_name(mut self, name: impl Into<String>) -> Self {
        self.scan_name = Some(name.into());
        self
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }
}

/// Lifecycle of a scan object.
///
/// The scan object only tracks its own local work. Once `Submitted`, progress
/// of the backend job is observed through the scan's results provider, so a
/// submitted scan stays `Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Created,
    TargetResolved,
    /// Handed to the backend, which now owns the job
    Submitted,
    /// Local work finished without submission (`prepare_only`)
    Completed,
    Failed,
}

/// One backend execution and the configuration it was submitted with
#[derive(Debug, Clone)]
pub struct ScanJob {
    scan_type: ScanType,
    properties: ScanProperties,
    scan_id: Option<String>,
    state: ScanState,
}

impl ScanJob {
    pub fn new(scan_type: ScanType, properties: ScanProperties) -> Self {
        Self {
            scan_type,
            properties,
            scan_id: None,
            state: ScanState::Created,
        }
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn properties(&self) -> &ScanProperties {
        &self.properties
    }

    /// Mutable access is only granted until the job is submitted
    pub fn properties_mut(&mut self) -> AppScanResult<&mut ScanProperties> {
        match self.state {
            ScanState::Created | ScanState::TargetResolved => Ok(&mut self.properties),
            _ => Err(AppScanError::Scanner(
                "Scan properties cannot change after submission".to_string(),
            )),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.properties.target.as_deref()
    }

    pub fn scan_id(&self) -> Option<&str> {
        self.scan_id.as_deref()
    }

    /// Record the backend id; a job gets exactly one
    pub fn assign_scan_id(&mut self, scan_id: String) -> AppScanResult<()> {
        if let Some(existing) = &self.scan_id {
            return Err(AppScanError::Scanner(format!(
                "Scan id already assigned ({}), refusing {}",
                existing, scan_id
            )));
        }
        self.scan_id = Some(scan_id);
        Ok(())
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn set_state(&mut self, state: ScanState) {
        self.state = state;
    }

    pub fn report_format(&self) -> &str {
        self.properties
            .report_format
            .as_deref()
            .unwrap_or(crate::results::DEFAULT_REPORT_FORMAT)
    }
}
