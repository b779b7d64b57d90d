pub mod json;
pub mod terminal;

use crate::results::{FindingCounts, ResultsProvider, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result type for summary output
pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Point-in-time view of one scan's results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub scan_id: String,
    pub engine: String,
    pub status: Status,
    pub counts: FindingCounts,
    pub message: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ScanSummary {
    /// Poll `provider` once and capture what it reports.
    ///
    /// Counts are only loaded once the status is terminal.
    pub async fn collect(scan_id: &str, provider: &mut dyn ResultsProvider) -> Self {
        let status = provider.status().await;
        if status.is_terminal() {
            provider.has_results().await;
        }

        Self {
            scan_id: scan_id.to_string(),
            engine: provider.type_name(),
            status,
            counts: provider.counts(),
            message: provider.message(),
            generated_at: Utc::now(),
        }
    }
}

/// Output sink for scan summaries
pub trait SummaryReporter {
    fn report(&self, summary: &ScanSummary) -> ReportResult<()>;

    fn name(&self) -> &'static str;
}
