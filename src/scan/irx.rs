//! Local generation of IRX archives through the static-analysis client.

use crate::config::SdkConfig;
use crate::error::{AppScanError, AppScanResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

pub const IRX_EXTENSION: &str = "irx";
pub const CONFIG_FILE_NAME: &str = "appscan-config.xml";

/// Generation switches passed to the static-analysis client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrxOptions {
    pub third_party: bool,
    pub open_source_only: bool,
    pub source_code_only: bool,
    pub static_analysis_only: bool,
    pub secrets_disabled: bool,
    pub secrets_enabled: bool,
    pub secrets_only: bool,
}

/// What to package and where to put it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrxRequest {
    pub target: PathBuf,
    pub name: String,
    pub output_dir: PathBuf,
    pub options: IrxOptions,
}

impl IrxRequest {
    /// Request writing `{name}.irx` next to the target (or inside it, for a directory)
    pub fn for_target(target: &Path, name: &str, options: IrxOptions) -> Self {
        let output_dir = if target.is_dir() {
            target.to_path_buf()
        } else {
            target.parent().map(Path::to_path_buf).unwrap_or_default()
        };
        Self {
            target: target.to_path_buf(),
            name: name.to_string(),
            output_dir,
            options,
        }
    }

    pub fn irx_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.name, IRX_EXTENSION))
    }
}

/// Produces an IRX archive from a local target
#[async_trait]
pub trait IrxGenerator: Send + Sync {
    async fn generate(&self, request: &IrxRequest) -> AppScanResult<PathBuf>;
}

pub fn is_irx(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(IRX_EXTENSION))
        .unwrap_or(false)
}

/// Runs the static-analysis client in `prepare` mode
#[derive(Debug, Clone)]
pub struct SaClientGenerator {
    executable: PathBuf,
}

impl SaClientGenerator {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self::new(config.saclient_path.clone())
    }

    fn arguments(request: &IrxRequest) -> Vec<String> {
        let mut args = vec![
            "prepare".to_string(),
            "-n".to_string(),
            request.name.clone(),
            "-d".to_string(),
            request.output_dir.display().to_string(),
        ];

        let options = request.options;
        let flags = [
            (options.third_party, "-thirdParty"),
            (options.open_source_only, "-oso"),
            (options.source_code_only, "-sco"),
            (options.static_analysis_only, "-sao"),
            (options.secrets_disabled, "-noSecrets"),
            (options.secrets_only, "-so"),
        ];
        args.extend(flags.iter().filter(|(on, _)| *on).map(|(_, flag)| flag.to_string()));
        args
    }
}

#[async_trait]
impl IrxGenerator for SaClientGenerator {
    async fn generate(&self, request: &IrxRequest) -> AppScanResult<PathBuf> {
        let args = Self::arguments(request);
        let working_dir = if request.target.is_dir() {
            request.target.clone()
        } else {
            request.output_dir.clone()
        };

        info!("Generating {} from {}", request.irx_path().display(), request.target.display());
        debug!("Running {} {}", self.executable.display(), args.join(" "));

        let output = Command::new(&self.executable)
            .args(&args)
            .current_dir(&working_dir)
            .output()
            .await
            .map_err(|e| AppScanError::Scanner(format!("Failed to run {}: {}", self.executable.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppScanError::Scanner(format!(
                "IRX generation failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let irx = request.irx_path();
        if !irx.exists() {
            return Err(AppScanError::Scanner(format!(
                "The static-analysis client did not produce {}",
                irx.display()
            )));
        }
        Ok(irx)
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render the client configuration listing `targets` and the generation options
pub fn render_config(targets: &[PathBuf], options: &IrxOptions) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<Configuration thirdPartyLibs=\"{}\" openSourceOnly=\"{}\" sourceCodeOnly=\"{}\" staticAnalysisOnly=\"{}\" secretsScanning=\"{}\" secretsScanningOnly=\"{}\">\n",
        options.third_party,
        options.open_source_only,
        options.source_code_only,
        options.static_analysis_only,
        options.secrets_enabled && !options.secrets_disabled,
        options.secrets_only,
    ));
    xml.push_str("  <Targets>\n");
    for target in targets {
        xml.push_str(&format!(
            "    <Target path=\"{}\"/>\n",
            escape_xml(&target.display().to_string())
        ));
    }
    xml.push_str("  </Targets>\n</Configuration>\n");
    xml
}

/// Write the client configuration into `working_dir`
pub fn write_config(working_dir: &Path, targets: &[PathBuf], options: &IrxOptions) -> AppScanResult<PathBuf> {
    let path = working_dir.join(CONFIG_FILE_NAME);
    std::fs::write(&path, render_config(targets, options))?;
    debug!("Wrote {} with {} target(s)", path.display(), targets.len());
    Ok(path)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Writes an empty archive instead of running the client
    #[derive(Default)]
    pub struct FakeGenerator {
        pub requests: Mutex<Vec<IrxRequest>>,
    }

    impl FakeGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IrxGenerator for FakeGenerator {
        async fn generate(&self, request: &IrxRequest) -> AppScanResult<PathBuf> {
            self.requests.lock().unwrap().push(request.clone());
            let irx = request.irx_path();
            std::fs::write(&irx, b"PK")?;
            Ok(irx)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irx_detection() {
        assert!(is_irx(Path::new("/tmp/app.irx")));
        assert!(is_irx(Path::new("APP.IRX")));
        assert!(!is_irx(Path::new("/tmp/app.zip")));
        assert!(!is_irx(Path::new("/tmp/irx")));
    }

    #[test]
    fn test_request_for_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let request = IrxRequest::for_target(dir.path(), "nightly", IrxOptions::default());
        assert_eq!(request.irx_path(), dir.path().join("nightly.irx"));

        let file = dir.path().join("app.war");
        std::fs::write(&file, b"").unwrap();
        let request = IrxRequest::for_target(&file, "nightly", IrxOptions::default());
        assert_eq!(request.output_dir, dir.path());
    }

    #[test]
    fn test_client_arguments() {
        let request = IrxRequest {
            target: PathBuf::from("/src"),
            name: "nightly".to_string(),
            output_dir: PathBuf::from("/out"),
            options: IrxOptions {
                open_source_only: true,
                secrets_disabled: true,
                ..Default::default()
            },
        };
        assert_eq!(
            SaClientGenerator::arguments(&request),
            vec!["prepare", "-n", "nightly", "-d", "/out", "-oso", "-noSecrets"]
        );
    }

    #[test]
    fn test_config_escapes_targets() {
        let xml = render_config(
            &[PathBuf::from("/src/a&b"), PathBuf::from("/src/<lib>")],
            &IrxOptions {
                third_party: true,
                ..Default::default()
            },
        );
        assert!(xml.contains("thirdPartyLibs=\"true\""));
        assert!(xml.contains("openSourceOnly=\"false\""));
        assert!(xml.contains("<Target path=\"/src/a&amp;b\"/>"));
        assert!(xml.contains("<Target path=\"/src/&lt;lib&gt;\"/>"));
    }

    #[test]
    fn test_write_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &[PathBuf::from("/src")], &IrxOptions::default()).unwrap();
        assert_eq!(path, dir.path().join(CONFIG_FILE_NAME));
        assert!(std::fs::read_to_string(path).unwrap().contains("/src"));
    }

    #[tokio::test]
    async fn test_missing_client_is_scanner_error() {
        let dir = tempfile::tempdir().unwrap();
        let generator = SaClientGenerator::new(dir.path().join("no-such-client"));
        let request = IrxRequest::for_target(dir.path(), "x", IrxOptions::default());

        match generator.generate(&request).await {
            Err(AppScanError::Scanner(message)) => assert!(message.contains("no-such-client")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
