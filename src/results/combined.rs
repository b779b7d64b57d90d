use super::{FindingCounts, ResultsProvider, Status, DEFAULT_REPORT_FORMAT};
use crate::service::util::scan_type_short_form;
use crate::service::SeverityCount;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Combine two child statuses into one
pub fn combine_status(first: Status, second: Status) -> Status {
    let any = |status: Status| first == status || second == status;

    if first == Status::Failed && second == Status::Failed {
        Status::Failed
    } else if any(Status::Ready) && any(Status::Failed) {
        Status::Unstable
    } else if first == Status::Ready && second == Status::Ready {
        Status::Ready
    } else {
        Status::Running
    }
}

/// Two engines' results presented as one.
///
/// Counts are sums of the children; findings are never fetched here. A child
/// that reported `Failed` is not polled again.
pub struct CombinedResultsProvider {
    first: Box<dyn ResultsProvider>,
    second: Box<dyn ResultsProvider>,
    first_status: Option<Status>,
    second_status: Option<Status>,
    report_format: String,
}

impl CombinedResultsProvider {
    pub fn new(first: Box<dyn ResultsProvider>, second: Box<dyn ResultsProvider>) -> Self {
        Self {
            first,
            second,
            first_status: None,
            second_status: None,
            report_format: DEFAULT_REPORT_FORMAT.to_string(),
        }
    }

    pub fn first(&self) -> &dyn ResultsProvider {
        self.first.as_ref()
    }

    pub fn second(&self) -> &dyn ResultsProvider {
        self.second.as_ref()
    }

    /// `{DIR}/{SHORT}_{NAME}` for a child of the given type
    fn child_destination(destination: &Path, type_name: &str) -> PathBuf {
        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!("{}_{}", scan_type_short_form(type_name).to_uppercase(), file_name);
        match destination.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }
}

#[async_trait]
impl ResultsProvider for CombinedResultsProvider {
    async fn has_results(&mut self) -> bool {
        let first = self.first.has_results().await;
        let second = self.second.has_results().await;
        first || second
    }

    async fn status(&mut self) -> Status {
        if self.first_status != Some(Status::Failed) {
            self.first_status = Some(self.first.status().await);
        }
        if self.second_status != Some(Status::Failed) {
            self.second_status = Some(self.second.status().await);
        }

        combine_status(
            self.first_status.unwrap_or(Status::Unknown),
            self.second_status.unwrap_or(Status::Unknown),
        )
    }

    fn findings(&self) -> Option<&[SeverityCount]> {
        None
    }

    fn counts(&self) -> FindingCounts {
        self.first.counts() + self.second.counts()
    }

    fn type_name(&self) -> String {
        format!("{}_{}", self.first.type_name(), self.second.type_name())
    }

    async fn results_file(&mut self, destination: &Path, format: &str) -> bool {
        let first_destination = Self::child_destination(destination, &self.first.type_name());
        let second_destination = Self::child_destination(destination, &self.second.type_name());

        let first = self.first.results_file(&first_destination, format).await;
        let second = self.second.results_file(&second_destination, format).await;
        first && second
    }

    /// Messages of the children that have one, each prefixed with its engine
    /// type. A single child's message is enough to produce a result.
    fn message(&self) -> Option<String> {
        let parts: Vec<String> = [&self.first, &self.second]
            .iter()
            .filter_map(|child| child.message().map(|m| format!("{}: {}", child.type_name(), m)))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    fn report_format(&self) -> &str {
        &self.report_format
    }

    fn set_report_format(&mut self, format: &str) {
        self.report_format = format.to_string();
        self.first.set_report_format(format);
        self.second.set_report_format(format);
    }
}
