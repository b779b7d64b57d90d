use super::{ReportResult, ScanSummary, SummaryReporter};
use crate::results::Status;
use colored::{ColoredString, Colorize};

const TERMINAL_WIDTH: usize = 60;
const SEPARATOR_WIDTH: usize = 40;

/// Console output for scan summaries
pub struct TerminalReporter {
    verbose: bool,
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn print_header(&self, summary: &ScanSummary) {
        println!("\n{}", "═".repeat(TERMINAL_WIDTH).bright_blue());
        println!("{}", "APPSCAN RESULTS".bright_white().bold());
        println!("{}", "═".repeat(TERMINAL_WIDTH).bright_blue());
        println!("  Scan ID:         {}", summary.scan_id.bright_cyan());
        println!("  Engine:          {}", summary.engine.bright_cyan());
        println!("  Status:          {}", status_label(summary.status));
        if self.verbose {
            println!(
                "  Checked at:      {}",
                summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }

    fn print_counts(&self, summary: &ScanSummary) {
        if !summary.status.is_terminal() {
            println!("\n  {}", "Results are not available yet.".bright_black());
            return;
        }

        let counts = summary.counts;
        println!("\n{}", "📈 Findings".bright_white().bold());
        println!("{}", "─".repeat(SEPARATOR_WIDTH).bright_black());
        println!("  Total Findings:  {}", counts.total.to_string().bright_yellow());

        if counts.critical > 0 {
            println!("  🔴  Critical:    {}", counts.critical.to_string().bright_red().bold());
        }
        if counts.high > 0 {
            println!("  🟠  High:        {}", counts.high.to_string().bright_red());
        }
        if counts.medium > 0 {
            println!("  🟡  Medium:      {}", counts.medium.to_string().bright_yellow());
        }
        if counts.low > 0 {
            println!("  🟢  Low:         {}", counts.low.to_string().bright_green());
        }
        if counts.info > 0 {
            println!("  ℹ️  Info:        {}", counts.info.to_string().bright_blue());
        }
        if counts.total == 0 && summary.status == Status::Ready {
            println!("\n✅ {}", "No open issues found.".bright_green());
        }
    }
}

impl SummaryReporter for TerminalReporter {
    fn report(&self, summary: &ScanSummary) -> ReportResult<()> {
        self.print_header(summary);
        if let Some(message) = &summary.message {
            println!("\n  {}", message.bright_yellow());
        }
        self.print_counts(summary);
        println!();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "terminal"
    }
}

/// Status text coloured by outcome
pub fn status_label(status: Status) -> ColoredString {
    let text = status.to_string();
    match status {
        Status::Ready => text.bright_green().bold(),
        Status::Failed => text.bright_red().bold(),
        Status::Unstable => text.bright_yellow().bold(),
        Status::Paused | Status::Pausing => text.bright_yellow(),
        Status::InQueue | Status::Running => text.bright_cyan(),
        Status::Unknown => text.bright_black(),
    }
}
