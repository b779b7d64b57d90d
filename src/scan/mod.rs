pub mod combined;
pub mod dynamic;
pub mod irx;
pub mod manager;
pub mod types;
pub mod upload;

pub use combined::CombinedScan;
pub use dynamic::DynamicScan;
pub use irx::{IrxGenerator, IrxOptions, IrxRequest, SaClientGenerator};
pub use manager::{ScanManager, StaticScanManager};
pub use types::{DynamicScanSettings, LoginType, ScanJob, ScanProperties, ScanState, ScanType};
pub use upload::UploadScan;

use crate::error::AppScanResult;
use crate::results::ResultsProvider;
use async_trait::async_trait;
use std::path::Path;

/// One scan submission, from local target to backend job.
///
/// `run` either leaves the scan `Submitted` with a backend id, or returns the
/// failure. Invalid targets are rejected before any network call.
#[async_trait]
pub trait Scan: Send + Sync {
    async fn run(&mut self) -> AppScanResult<()>;

    /// Backend id, once submitted
    fn scan_id(&self) -> Option<&str>;

    fn scan_type(&self) -> ScanType;

    fn type_name(&self) -> String {
        self.scan_type().name().to_string()
    }

    fn state(&self) -> ScanState;

    /// Archive generated (or reused) for upload-based engines
    fn irx(&self) -> Option<&Path> {
        None
    }

    /// Fresh results handle for the submitted scan
    fn results_provider(&self) -> Option<Box<dyn ResultsProvider>>;
}
