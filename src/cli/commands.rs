use crate::scan::ScanType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "appscan-pilot",
    about = "Submit application security scans and collect their results",
    version,
    author
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format for logs
    #[arg(long, default_value = "text", global = true)]
    pub log_format: String,

    /// YAML configuration file (environment variables override it)
    #[arg(short, long, global = true, env = "APPSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the IRX archive for a directory without submitting it
    Prepare {
        /// Directory to package
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// Scan name (defaults to the directory name plus a timestamp)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        engines: EngineSelection,
    },

    /// Generate (or reuse) the IRX archive and submit static/composition scans
    Analyze {
        /// Directory to scan
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// Scan name (defaults to the directory name plus a timestamp)
        #[arg(short, long)]
        name: Option<String>,

        /// Application the scan belongs to
        #[arg(long)]
        app_id: Option<String>,

        #[command(flatten)]
        engines: EngineSelection,

        /// Poll until the scan finishes
        #[arg(long)]
        wait: bool,

        /// Download the report here once the scan finishes (implies --wait)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Report format
        #[arg(long, default_value = "html")]
        format: String,
    },

    /// Submit a dynamic scan described by a YAML properties file
    Dynamic {
        /// Scan properties (target, scan name, dynamic settings)
        #[arg(short, long)]
        properties: PathBuf,

        /// Poll until the scan finishes
        #[arg(long)]
        wait: bool,
    },

    /// Show the status and finding counts of a scan
    Status {
        scan_id: String,

        #[arg(short, long, value_enum)]
        engine: Engine,

        /// Summary output
        #[arg(short, long, value_enum, default_value = "terminal")]
        output: OutputFormat,
    },

    /// Download the report of a finished scan
    Report {
        scan_id: String,

        #[arg(short, long, value_enum)]
        engine: Engine,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Report format
        #[arg(long, default_value = "html")]
        format: String,
    },

    /// Display the current configuration
    Config,

    /// Show information about appscan-pilot
    Info,
}

/// Engine overrides for static scans
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct EngineSelection {
    /// Run software composition analysis only
    #[arg(long, conflicts_with = "static_only")]
    pub sca_only: bool,

    /// Run static analysis only
    #[arg(long)]
    pub static_only: bool,

    /// Include third-party libraries
    #[arg(long)]
    pub third_party: bool,

    /// Package source code only
    #[arg(long)]
    pub source_code_only: bool,

    /// Skip secrets scanning
    #[arg(long)]
    pub no_secrets: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    Sast,
    Sca,
    Dast,
}

impl From<Engine> for ScanType {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::Sast => ScanType::StaticAnalyzer,
            Engine::Sca => ScanType::CompositionAnalyzer,
            Engine::Dast => ScanType::DynamicAnalyzer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}
