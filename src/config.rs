use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Which backend protocol the SDK talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceDialect {
    /// Resource-style REST API (single-step scan creation)
    #[default]
    Cloud,
    /// Legacy job-style API (create job, patch fields, execute with ETag)
    Enterprise,
}

impl std::str::FromStr for ServiceDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloud" | "asoc" => Ok(Self::Cloud),
            "enterprise" | "ase" => Ok(Self::Enterprise),
            other => Err(format!("Unknown service dialect '{}'", other)),
        }
    }
}

/// Connection and polling settings for the SDK
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Base URL of the scanning service
    pub server: String,

    pub dialect: ServiceDialect,

    /// Bearer token (cloud) or session id (enterprise)
    pub token: String,

    /// When the token stops being valid; `None` means no known expiry
    pub token_expires_at: Option<DateTime<Utc>>,

    /// Anti-forgery token for the enterprise dialect
    pub xsrf_token: Option<String>,

    pub proxy: Option<String>,

    pub accept_invalid_certs: bool,

    /// Per-request transport timeout in seconds
    pub timeout_secs: u64,

    /// Seconds between report-generation status checks
    pub report_poll_interval_secs: u64,

    /// Status checks before giving up on report generation
    pub report_poll_attempts: u32,

    /// Local static-analysis client used to build IRX archives
    pub saclient_path: PathBuf,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            server: "https://cloud.appscan.com".to_string(),
            dialect: ServiceDialect::Cloud,
            token: String::new(),
            token_expires_at: None,
            xsrf_token: None,
            proxy: None,
            accept_invalid_certs: false,
            timeout_secs: 120,
            report_poll_interval_secs: 5,
            report_poll_attempts: 60,
            saclient_path: PathBuf::from("appscan.sh"),
        }
    }
}

impl SdkConfig {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self, String> {
        Self::from_env_internal(true)
    }

    #[cfg(test)]
    fn from_env_no_dotenv() -> Result<Self, String> {
        Self::from_env_internal(false)
    }

    fn from_env_internal(load_dotenv: bool) -> Result<Self, String> {
        if load_dotenv {
            let _ = dotenv::dotenv();
        }

        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, then let environment variables override it
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let mut config: SdkConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        config.apply_env()?;
        Ok(config)
    }

    /// Default location of the YAML configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("appscan-pilot").join("config.yaml"))
    }

    fn apply_env(&mut self) -> Result<(), String> {
        if let Ok(server) = env::var("APPSCAN_SERVER") {
            self.server = server;
        }

        if let Ok(dialect) = env::var("APPSCAN_DIALECT") {
            self.dialect = dialect.parse()?;
        }

        if let Ok(token) = env::var("APPSCAN_TOKEN") {
            self.token = token;
        }

        if let Ok(expires) = env::var("APPSCAN_TOKEN_EXPIRES_AT") {
            if let Ok(at) = DateTime::parse_from_rfc3339(&expires) {
                self.token_expires_at = Some(at.with_timezone(&Utc));
            }
        }

        if let Ok(xsrf) = env::var("APPSCAN_XSRF_TOKEN") {
            self.xsrf_token = Some(xsrf);
        }

        if let Ok(proxy) = env::var("APPSCAN_PROXY") {
            if !proxy.is_empty() {
                self.proxy = Some(proxy);
            }
        }

        if let Ok(accept) = env::var("APPSCAN_ACCEPT_INVALID_CERTS") {
            self.accept_invalid_certs = accept.to_lowercase() == "true" || accept == "1";
        }

        if let Ok(timeout) = env::var("APPSCAN_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.timeout_secs = secs;
            }
        }

        if let Ok(interval) = env::var("APPSCAN_REPORT_POLL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.report_poll_interval_secs = secs;
            }
        }

        if let Ok(attempts) = env::var("APPSCAN_REPORT_POLL_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.report_poll_attempts = n;
            }
        }

        if let Ok(client) = env::var("APPSCAN_SACLIENT") {
            self.saclient_path = PathBuf::from(client);
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.trim().is_empty() {
            return Err("Server URL is empty".to_string());
        }

        if !self.server.starts_with("http://") && !self.server.starts_with("https://") {
            return Err(format!("Server URL must start with http:// or https://, got {}", self.server));
        }

        if self.token.is_empty() {
            return Err("APPSCAN_TOKEN not set. Please set it in .env file or environment variables.".to_string());
        }

        if self.dialect == ServiceDialect::Enterprise && self.xsrf_token.is_none() {
            return Err("The enterprise dialect requires APPSCAN_XSRF_TOKEN".to_string());
        }

        if self.report_poll_attempts == 0 {
            return Err("Report poll attempts must be greater than 0".to_string());
        }

        Ok(())
    }
}
