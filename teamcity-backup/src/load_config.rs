/// `load_config` module: reads one section of an INI configuration file, applies
/// environment overrides and validates it into the immutable [`BackupConfig`].
///
/// This module is the only place where the on-disk configuration is parsed.
///
/// # Responsibilities
/// - Read the INI file with `rust-ini`, keeping values verbatim: no escape
///   sequences, no quote stripping, so Windows paths and passwords survive as written
/// - Layer the section and `TEAMCITY_BACKUP_<KEY>` environment variables through the
///   `config` crate, so passwords can stay out of the file
/// - Hand the merged section to core validation, which reports every missing key at once
///
/// # Errors
/// All failures are [`ConfigError`]s, logged here once; the CLI boundary turns them into exit code 1.
use std::path::Path;

use chrono::{DateTime, Local};
use config::Config;
use ini::{Ini, ParseOption};
use teamcity_backup_core::config::{BackupConfig, RawBackupSettings, POLL_KEYS, REQUIRED_KEYS};
use teamcity_backup_core::error::ConfigError;
use tracing::{error, info};

/// Section read when `--conf-section` is not given.
pub const DEFAULT_SECTION: &str = "teamcity_backup";

const ENV_PREFIX: &str = "TEAMCITY_BACKUP_";

/// Environment variable that overrides `key`, e.g. `TEAMCITY_BACKUP_TEAMCITY_PASS`.
pub fn env_override_name(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_uppercase())
}

fn known_keys() -> impl Iterator<Item = &'static &'static str> {
    REQUIRED_KEYS.iter().chain(POLL_KEYS.iter())
}

/// Values are taken exactly as written after `=`, apart from surrounding whitespace.
fn verbatim() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

/// Loads `section` from the INI file at `path`, stamping the backup name with the current time.
pub fn load_config<P: AsRef<Path>>(path: P, section: &str) -> Result<BackupConfig, ConfigError> {
    load_config_at(path, section, Local::now())
}

pub fn load_config_at<P: AsRef<Path>>(
    path: P,
    section: &str,
    now: DateTime<Local>,
) -> Result<BackupConfig, ConfigError> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, section, "Loading configuration from file");

    let result = read_section(path_ref, section).and_then(|raw| raw.into_config(section, now));
    match result {
        Ok(config) => {
            info!(
                section,
                file_name = %config.job.target_file_name,
                "Config loaded and validated successfully"
            );
            Ok(config)
        }
        Err(e) => {
            error!(error = %e, config_path = ?path_ref, section, "Failed to load configuration");
            Err(e)
        }
    }
}

fn read_section(path: &Path, section: &str) -> Result<RawBackupSettings, ConfigError> {
    let unreadable = |reason: String| ConfigError::Unreadable {
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_file() {
        return Err(unreadable("file does not exist".into()));
    }

    let ini = Ini::load_from_file_opt(path, verbatim()).map_err(|e| unreadable(e.to_string()))?;
    info!(config_path = ?path, "Config file read successfully");

    let properties = ini
        .section(Some(section))
        .ok_or_else(|| ConfigError::MissingSection {
            section: section.to_string(),
        })?;

    // Keys are case-insensitive, values untouched, unknown keys ignored.
    let mut builder = Config::builder();
    for (key, value) in properties.iter() {
        let key = key.to_lowercase();
        if let Some(known) = known_keys().find(|k| **k == key) {
            builder = builder
                .set_default(*known, value)
                .map_err(|e| unreadable(e.to_string()))?;
        }
    }

    for key in known_keys() {
        let var = env_override_name(key);
        if let Ok(value) = std::env::var(&var) {
            info!(key, env = %var, "Overriding configuration value from environment");
            builder = builder
                .set_override(*key, value)
                .map_err(|e| unreadable(e.to_string()))?;
        }
    }

    builder
        .build()
        .and_then(|settings| settings.try_deserialize::<RawBackupSettings>())
        .map_err(|e| unreadable(e.to_string()))
}
