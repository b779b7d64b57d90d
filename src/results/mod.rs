pub mod combined;
pub mod job_report;
pub mod non_compliant;

pub use combined::CombinedResultsProvider;
pub use job_report::JobReportResultsProvider;
pub use non_compliant::NonCompliantIssuesResultsProvider;

use crate::config::ServiceDialect;
use crate::progress::SharedProgress;
use crate::scan::ScanType;
use crate::service::{ScanServiceProvider, SeverityCount};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_REPORT_FORMAT: &str = "html";

/// Canonical scan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    InQueue,
    Running,
    Pausing,
    Paused,
    Ready,
    Failed,
    Unstable,
    Unknown,
}

impl Status {
    /// Map a backend status string; anything unrecognised is `Unknown`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "inqueue" => Status::InQueue,
            "running" => Status::Running,
            "pausing" => Status::Pausing,
            "paused" => Status::Paused,
            "ready" => Status::Ready,
            "failed" => Status::Failed,
            "unstable" => Status::Unstable,
            _ => Status::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Ready | Status::Failed | Status::Unstable)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::InQueue => "InQueue",
            Status::Running => "Running",
            Status::Pausing => "Pausing",
            Status::Paused => "Paused",
            Status::Ready => "Ready",
            Status::Failed => "Failed",
            Status::Unstable => "Unstable",
            Status::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Open findings per severity bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingCounts {
    pub critical: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub info: u64,
    pub total: u64,
}

impl FindingCounts {
    /// Sum per-severity documents into buckets.
    ///
    /// Unrecognised severities only count towards the total.
    pub fn from_severity_counts(items: &[SeverityCount]) -> Self {
        let mut counts = FindingCounts::default();
        for item in items {
            match item.severity.to_lowercase().as_str() {
                "critical" => counts.critical += item.count,
                "high" => counts.high += item.count,
                "medium" => counts.medium += item.count,
                "low" => counts.low += item.count,
                "informational" | "information" | "info" => counts.info += item.count,
                _ => {}
            }
            counts.total += item.count;
        }
        counts
    }
}

impl Add for FindingCounts {
    type Output = FindingCounts;

    fn add(self, other: FindingCounts) -> FindingCounts {
        FindingCounts {
            critical: self.critical + other.critical,
            high: self.high + other.high,
            medium: self.medium + other.medium,
            low: self.low + other.low,
            info: self.info + other.info,
            total: self.total + other.total,
        }
    }
}

/// Polling state of a single-engine results provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Unpolled,
    NonTerminal(Status),
    TerminalFailed,
    TerminalReady,
    TerminalUnstable,
}

impl PollState {
    /// Next state after observing `observed`. Terminal states never change.
    pub fn transition(self, observed: Status) -> PollState {
        if self.is_terminal() {
            return self;
        }
        match observed {
            Status::Failed => PollState::TerminalFailed,
            Status::Ready => PollState::TerminalReady,
            Status::Unstable => PollState::TerminalUnstable,
            other => PollState::NonTerminal(other),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::TerminalFailed | PollState::TerminalReady | PollState::TerminalUnstable
        )
    }

    pub fn status(&self) -> Status {
        match self {
            PollState::Unpolled => Status::Unknown,
            PollState::NonTerminal(status) => *status,
            PollState::TerminalFailed => Status::Failed,
            PollState::TerminalReady => Status::Ready,
            PollState::TerminalUnstable => Status::Unstable,
        }
    }
}

/// Polls a scan until it finishes and exposes its findings.
///
/// Counts stay zero until `has_results` first returns true and never change
/// afterwards.
#[async_trait]
pub trait ResultsProvider: Send {
    async fn has_results(&mut self) -> bool;

    /// Poll the backend (unless already terminal) and return the status
    async fn status(&mut self) -> Status;

    /// Loaded per-severity documents; `None` for combined providers
    fn findings(&self) -> Option<&[SeverityCount]>;

    fn counts(&self) -> FindingCounts;

    fn findings_count(&self) -> u64 {
        self.counts().total
    }

    fn critical_count(&self) -> u64 {
        self.counts().critical
    }

    fn high_count(&self) -> u64 {
        self.counts().high
    }

    fn medium_count(&self) -> u64 {
        self.counts().medium
    }

    fn low_count(&self) -> u64 {
        self.counts().low
    }

    fn info_count(&self) -> u64 {
        self.counts().info
    }

    /// Engine display name, `_`-joined for combined providers
    fn type_name(&self) -> String;

    /// Write a formatted report to `destination`; problems go to the progress
    /// sink and yield `false`
    async fn results_file(&mut self, destination: &Path, format: &str) -> bool;

    fn message(&self) -> Option<String>;

    fn report_format(&self) -> &str;

    fn set_report_format(&mut self, format: &str);
}

/// Results provider matching the service dialect
pub fn provider_for(
    scan_id: &str,
    scan_type: ScanType,
    service: Arc<dyn ScanServiceProvider>,
    progress: SharedProgress,
) -> Box<dyn ResultsProvider> {
    match service.dialect() {
        ServiceDialect::Cloud => Box::new(NonCompliantIssuesResultsProvider::new(scan_id, scan_type, service, progress)),
        ServiceDialect::Enterprise => Box::new(JobReportResultsProvider::new(scan_id, scan_type, service, progress)),
    }
}
