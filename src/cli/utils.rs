use crate::auth::{AuthenticationProvider, SessionAuthProvider, TokenAuthProvider};
use crate::config::{SdkConfig, ServiceDialect};
use crate::http::client::ReqwestTransport;
use crate::http::HttpTransport;
use crate::progress::SharedProgress;
use crate::results::{ResultsProvider, Status};
use crate::service::{AseScanServiceProvider, CloudScanServiceProvider, ReportPolling, ScanServiceProvider};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Seconds between status polls while waiting for a scan
pub const STATUS_POLL_SECS: u64 = 30;

pub fn init_logging(verbose: bool, log_format: &str) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let fmt_layer = if log_format == "json" {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .expect("Failed to initialize tracing subscriber");
}

pub fn print_info() {
    println!("appscan-pilot v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", env!("CARGO_PKG_DESCRIPTION"));
    println!();
    println!("Authors: {}", env!("CARGO_PKG_AUTHORS"));
    println!("License: {}", env!("CARGO_PKG_LICENSE"));
    println!();
    println!("For more information, visit: {}", env!("CARGO_PKG_REPOSITORY"));
}

/// Configuration from `path` (or the default file when it exists), else the environment
pub fn load_config(path: Option<&Path>) -> Result<SdkConfig> {
    let file = path
        .map(Path::to_path_buf)
        .or_else(|| SdkConfig::default_path().filter(|p| p.exists()));

    let config = match file {
        Some(file) => {
            debug!("Loading configuration from {}", file.display());
            let _ = dotenv::dotenv();
            SdkConfig::from_file(&file).map_err(anyhow::Error::msg)?
        }
        None => SdkConfig::from_env().map_err(anyhow::Error::msg)?,
    };

    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

/// Service provider for the configured dialect
pub fn build_service(config: &SdkConfig, progress: SharedProgress) -> Result<Arc<dyn ScanServiceProvider>> {
    let transport: Arc<dyn HttpTransport> = Arc::new(
        ReqwestTransport::new(config.proxy.as_deref(), config.accept_invalid_certs, config.timeout_secs)
            .context("Failed to create HTTP client")?,
    );

    let service: Arc<dyn ScanServiceProvider> = match config.dialect {
        ServiceDialect::Cloud => {
            let auth: Arc<dyn AuthenticationProvider> = Arc::new(TokenAuthProvider::from_config(config));
            let polling = ReportPolling {
                interval: Duration::from_secs(config.report_poll_interval_secs),
                attempts: config.report_poll_attempts,
            };
            Arc::new(CloudScanServiceProvider::new(transport, auth, progress).with_report_polling(polling))
        }
        ServiceDialect::Enterprise => {
            let auth: Arc<dyn AuthenticationProvider> = Arc::new(SessionAuthProvider::from_config(config));
            Arc::new(AseScanServiceProvider::new(transport, auth, progress))
        }
    };

    info!("Using {:?} service at {}", config.dialect, config.server);
    Ok(service)
}

/// Poll `provider` until it reports a terminal status
pub async fn wait_for_completion(provider: &mut dyn ResultsProvider, interval: Duration) -> Status {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let status = loop {
        let status = provider.status().await;
        spinner.set_message(format!("{} scan: {}", provider.type_name(), status));
        if status.is_terminal() {
            break status;
        }
        tokio::time::sleep(interval).await;
    };

    spinner.finish_with_message(format!("{} scan finished: {}", provider.type_name(), status));
    status
}

/// Mask all but the last four characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
