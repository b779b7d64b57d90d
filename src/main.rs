use anyhow::Result;
use appscan_pilot::cli::commands::{Cli, Commands};
use appscan_pilot::cli::handlers::{
    handle_analyze_command, handle_config_command, handle_dynamic_command, handle_prepare_command,
    handle_report_command, handle_status_command,
};
use appscan_pilot::cli::utils::{init_logging, print_info};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, &cli.log_format);

    let config = cli.config.as_deref();

    // Execute command
    match cli.command {
        Commands::Prepare { dir, name, engines } => handle_prepare_command(config, dir, name, engines).await,

        Commands::Analyze {
            dir,
            name,
            app_id,
            engines,
            wait,
            report,
            format,
        } => handle_analyze_command(config, dir, name, app_id, engines, wait, report, format).await,

        Commands::Dynamic { properties, wait } => handle_dynamic_command(config, properties, wait).await,

        Commands::Status { scan_id, engine, output } => handle_status_command(config, scan_id, engine, output).await,

        Commands::Report {
            scan_id,
            engine,
            output,
            format,
        } => handle_report_command(config, scan_id, engine, output, format).await,

        Commands::Config => handle_config_command(config),

        Commands::Info => {
            print_info();
            Ok(())
        }
    }
}
