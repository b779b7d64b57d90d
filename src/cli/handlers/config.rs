use crate::cli::utils::mask_secret;
use crate::config::{SdkConfig, ServiceDialect};
use anyhow::Result;
use std::env;
use std::path::Path;

pub fn handle_config_command(config_path: Option<&Path>) -> Result<()> {
    let env_file_loaded = dotenv::dotenv().is_ok();

    println!("🔧 appscan-pilot Configuration");
    println!("═══════════════════════════════════════");
    println!();

    println!("📦 Version: v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("🌍 Sources:");
    if env_file_loaded {
        println!("  • .env file: ✅ Loaded");
    } else {
        println!("  • .env file: ⚠️  Not found (using system environment)");
    }

    let file = config_path
        .map(Path::to_path_buf)
        .or_else(|| SdkConfig::default_path().filter(|p| p.exists()));
    let config = match &file {
        Some(file) => {
            println!("  • Config file: ✅ {}", file.display());
            SdkConfig::from_file(file)
        }
        None => {
            if let Some(default) = SdkConfig::default_path() {
                println!("  • Config file: ⚠️  None (looked for {})", default.display());
            }
            SdkConfig::from_env()
        }
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            println!("  • ❌ {}", e);
            return Ok(());
        }
    };
    println!();

    println!("🔐 Service:");
    println!("  • Server: {}", config.server);
    let dialect = match config.dialect {
        ServiceDialect::Cloud => "cloud (resource-style API)",
        ServiceDialect::Enterprise => "enterprise (job-style API)",
    };
    println!("  • Dialect: {}", dialect);
    if config.token.is_empty() {
        println!("  • Token: ❌ Not set");
    } else {
        println!("  • Token: ✅ {}", mask_secret(&config.token));
    }
    if let Some(expires) = config.token_expires_at {
        println!("  • Token expires: {}", expires.to_rfc3339());
    }
    if config.dialect == ServiceDialect::Enterprise {
        match &config.xsrf_token {
            Some(_) => println!("  • XSRF token: ✅ Set (hidden)"),
            None => println!("  • XSRF token: ❌ Not set"),
        }
    }
    if let Some(proxy) = &config.proxy {
        println!("  • Proxy: {}", proxy);
    }
    if config.accept_invalid_certs {
        println!("  • Invalid certificates: ⚠️  Accepted");
    }
    println!();

    println!("⏱  Timing:");
    println!("  • Request timeout: {} seconds", config.timeout_secs);
    println!(
        "  • Report polling: every {} seconds, {} attempts",
        config.report_poll_interval_secs, config.report_poll_attempts
    );
    println!();

    println!("📁 Paths:");
    println!("  • Working Directory: {}", env::current_dir()?.display());
    println!("  • Static-analysis client: {}", config.saclient_path.display());
    println!();

    match config.validate() {
        Ok(()) => println!("✅ Configuration is valid"),
        Err(e) => println!("❌ {}", e),
    }

    println!();
    println!("💡 Tips:");
    println!("  • Use RUST_LOG=debug or --verbose for detailed logging");
    println!("  • Set APPSCAN_DIALECT=enterprise to talk to a job-style server");

    Ok(())
}
