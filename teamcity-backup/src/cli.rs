//! # teamcity-backup CLI Interface (Module)
//!
//! Command-line glue: argument parsing, configuration loading and the async
//! [`run`] entrypoint shared by `main()` and the integration tests.
//!
//! All workflow logic lives in `teamcity-backup-core`. This module only wires the
//! real TeamCity and Artifactory clients to [`run_backup`] and surfaces the outcome.
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use teamcity_backup_core::artifactory::ArtifactoryClient;
use teamcity_backup_core::backup::{run_backup, BackupReport};
use teamcity_backup_core::teamcity::TeamCityClient;

use crate::load_config::{load_config, DEFAULT_SECTION};
use crate::logging::LogLevel;

/// CLI for teamcity-backup: back up a TeamCity server into Artifactory.
#[derive(Parser, Debug)]
#[clap(
    name = "teamcity-backup",
    version,
    about = "Trigger a TeamCity backup, wait for it, and store the archive in Artifactory"
)]
pub struct Cli {
    /// Path to the INI configuration file
    #[clap(short = 'c', long = "conf", value_name = "PATH")]
    pub conf: PathBuf,

    /// Section in the configuration file
    #[clap(short = 's', long = "conf-section", default_value = DEFAULT_SECTION)]
    pub conf_section: String,

    /// Path to a log file, written in addition to stdout
    #[clap(short = 'l', long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log level
    #[clap(
        short = 'L',
        long = "log-level",
        value_enum,
        ignore_case = true,
        default_value_t = LogLevel::Error
    )]
    pub log_level: LogLevel,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<BackupReport> {
    tracing::info!(
        conf = %cli.conf.display(),
        section = %cli.conf_section,
        "teamcity-backup starting"
    );

    // Failures below are logged where they happen; callers only map them to an exit code.
    let config = load_config(&cli.conf, &cli.conf_section)?;
    config.trace_loaded();

    let server = TeamCityClient::new(&config.job).inspect_err(|e| {
        tracing::error!(error = %e, "Failed to set up TeamCity client");
    })?;
    let repository = ArtifactoryClient::new(&config.target).inspect_err(|e| {
        tracing::error!(error = %e, "Failed to set up Artifactory client");
    })?;

    let report = run_backup(&config, &server, &repository).await?;
    tracing::info!(?report, "Backup complete");
    Ok(report)
}
