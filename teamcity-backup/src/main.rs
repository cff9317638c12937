use std::process::ExitCode;

use clap::Parser;
use teamcity_backup::cli::{run, Cli};
use teamcity_backup::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = logging::init(cli.log_level, cli.log_file.as_deref()) {
        eprintln!("[ERROR] {e:#}");
        return ExitCode::FAILURE;
    }
    tracing::info!("CLI arguments parsed, invoking run");

    match run(cli).await {
        Ok(report) => {
            tracing::info!(
                file_name = %report.file_name,
                destination = %report.destination_url,
                "CLI completed successfully"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            // Already reported at error level where it happened.
            tracing::debug!(error = %format!("{e:#}"), "CLI exited with error");
            ExitCode::FAILURE
        }
    }
}
