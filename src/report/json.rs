use super::{ReportResult, ScanSummary, SummaryReporter};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes summaries as pretty JSON to a file, or stdout for `-`
pub struct JsonReporter {
    output: PathBuf,
}

impl JsonReporter {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self { output: output.into() }
    }

    pub fn stdout() -> Self {
        Self::new("-")
    }
}

impl SummaryReporter for JsonReporter {
    fn report(&self, summary: &ScanSummary) -> ReportResult<()> {
        let json = serde_json::to_string_pretty(summary)?;

        if self.output == Path::new("-") || self.output.as_os_str().is_empty() {
            println!("{}", json);
        } else {
            let mut file = File::create(&self.output)?;
            file.write_all(json.as_bytes())?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
