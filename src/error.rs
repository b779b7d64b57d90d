/// Result type for SDK operations
pub type AppScanResult<T> = Result<T, AppScanError>;

/// Errors surfaced by scans, the scan manager and service providers.
///
/// Transport failures never appear here: the service providers turn them into
/// a progress message plus an empty return.
#[derive(Debug, thiserror::Error)]
pub enum AppScanError {
    /// The local artifact or URL to scan is missing or unusable. Raised before
    /// any network call.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The backend rejected the job, an upload failed or execution did not start.
    #[error("Scan failed: {0}")]
    Scanner(String),

    /// The selected service dialect does not implement this operation.
    #[error("Operation not supported by this service: {0}")]
    NotImplemented(&'static str),

    #[error("Scan results are not available: {0}")]
    ResultsUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
