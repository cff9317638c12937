use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Keys every configuration section must provide.
pub const REQUIRED_KEYS: [&str; 8] = [
    "file_prefix",
    "file_path",
    "teamcity_url",
    "teamcity_user",
    "teamcity_pass",
    "artifactory_url",
    "artifactory_user",
    "artifactory_pass",
];

/// Optional keys tuning the poll loop.
pub const POLL_KEYS: [&str; 4] = [
    "poll_interval_secs",
    "poll_max_attempts",
    "poll_timeout_secs",
    "poll_on_error",
];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Basic-auth username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What to back up on the build server and where to put it locally.
#[derive(Debug, Clone)]
pub struct BackupJob {
    /// Build server base URL, without trailing slash.
    pub server_url: String,
    pub credentials: Credentials,
    /// File name the build server writes the backup under.
    pub target_file_name: String,
    /// Where the downloaded archive lands.
    pub local_path: PathBuf,
}

/// Where the archive is uploaded.
#[derive(Debug, Clone)]
pub struct RepositoryTarget {
    /// Repository URL the file name is appended to, usually ending in `/`.
    pub repository_url: String,
    pub credentials: Credentials,
    pub destination_file_name: String,
}

impl RepositoryTarget {
    pub fn destination_url(&self) -> String {
        format!("{}{}", self.repository_url, self.destination_file_name)
    }
}

/// What the poll loop does when a status request never gets a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportErrorPolicy {
    /// Fail the run on the first transport error.
    #[default]
    Abort,
    /// Log and count the attempt as "not idle yet".
    Retry,
}

impl std::str::FromStr for TransportErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(TransportErrorPolicy::Abort),
            "retry" => Ok(TransportErrorPolicy::Retry),
            other => Err(format!("expected `abort` or `retry`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls forever.
    pub max_attempts: Option<u32>,
    /// `None` polls forever.
    pub max_duration: Option<Duration>,
    pub on_transport_error: TransportErrorPolicy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            max_duration: None,
            on_transport_error: TransportErrorPolicy::Abort,
        }
    }
}

impl PollPolicy {
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_duration.is_none()
    }
}

/// Everything one run needs. Built once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub job: BackupJob,
    pub target: RepositoryTarget,
    pub poll: PollPolicy,
}

impl BackupConfig {
    pub fn trace_loaded(&self) {
        info!(
            teamcity_url = %self.job.server_url,
            file_name = %self.job.target_file_name,
            local_path = %self.job.local_path.display(),
            destination = %self.target.destination_url(),
            "Loaded backup configuration"
        );
        debug!(?self, "Backup configuration loaded (full debug)");
        if self.poll.is_unbounded() {
            warn!(
                interval = ?self.poll.interval,
                "Poll loop is unbounded: it only ends once the server reports idle. \
                 Set poll_max_attempts or poll_timeout_secs to bound it"
            );
        }
    }
}

/// `{prefix}_{YYYYMMDD_HHMMSS}.zip`, stamped with the given local time.
pub fn backup_file_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.zip", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// A configuration section as read from disk, before validation.
///
/// Every field is optional here so that validation can report all missing
/// keys at once rather than stopping at the first.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBackupSettings {
    pub file_prefix: Option<String>,
    pub file_path: Option<String>,
    pub teamcity_url: Option<String>,
    pub teamcity_user: Option<String>,
    pub teamcity_pass: Option<String>,
    pub artifactory_url: Option<String>,
    pub artifactory_user: Option<String>,
    pub artifactory_pass: Option<String>,
    pub poll_interval_secs: Option<String>,
    pub poll_max_attempts: Option<String>,
    pub poll_timeout_secs: Option<String>,
    pub poll_on_error: Option<String>,
}

impl RawBackupSettings {
    /// Value of a field by its configuration key.
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "file_prefix" => self.file_prefix.as_deref(),
            "file_path" => self.file_path.as_deref(),
            "teamcity_url" => self.teamcity_url.as_deref(),
            "teamcity_user" => self.teamcity_user.as_deref(),
            "teamcity_pass" => self.teamcity_pass.as_deref(),
            "artifactory_url" => self.artifactory_url.as_deref(),
            "artifactory_user" => self.artifactory_user.as_deref(),
            "artifactory_pass" => self.artifactory_pass.as_deref(),
            "poll_interval_secs" => self.poll_interval_secs.as_deref(),
            "poll_max_attempts" => self.poll_max_attempts.as_deref(),
            "poll_timeout_secs" => self.poll_timeout_secs.as_deref(),
            "poll_on_error" => self.poll_on_error.as_deref(),
            _ => None,
        }
    }

    /// Validates the section and stamps the backup file name with `now`.
    pub fn into_config(
        self,
        section: &str,
        now: DateTime<Local>,
    ) -> Result<BackupConfig, ConfigError> {
        let missing: Vec<&'static str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| self.field(key).map_or(true, |v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys {
                section: section.to_string(),
                keys: missing,
            });
        }

        let poll = PollPolicy {
            interval: parse_secs("poll_interval_secs", self.poll_interval_secs.as_deref())?
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            max_attempts: parse_limit("poll_max_attempts", self.poll_max_attempts.as_deref())?
                .map(|n| {
                    u32::try_from(n).map_err(|e| ConfigError::InvalidValue {
                        key: "poll_max_attempts",
                        value: n.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()?,
            max_duration: parse_limit("poll_timeout_secs", self.poll_timeout_secs.as_deref())?
                .map(Duration::from_secs),
            on_transport_error: match self.poll_on_error.as_deref() {
                None => TransportErrorPolicy::default(),
                Some(raw) => raw.parse().map_err(|reason| ConfigError::InvalidValue {
                    key: "poll_on_error",
                    value: raw.to_string(),
                    reason,
                })?,
            },
        };

        // Checked non-empty above.
        let take = |v: Option<String>| v.unwrap_or_default().trim().to_string();

        let file_name = backup_file_name(&take(self.file_prefix), now);
        let local_path = PathBuf::from(take(self.file_path)).join(&file_name);
        let server_url = take(self.teamcity_url).trim_end_matches('/').to_string();

        let job = BackupJob {
            server_url,
            credentials: Credentials::new(take(self.teamcity_user), take(self.teamcity_pass)),
            target_file_name: file_name.clone(),
            local_path,
        };
        let target = RepositoryTarget {
            repository_url: take(self.artifactory_url),
            credentials: Credentials::new(take(self.artifactory_user), take(self.artifactory_pass)),
            destination_file_name: file_name,
        };
        if !target.repository_url.ends_with('/') {
            warn!(
                artifactory_url = %target.repository_url,
                "artifactory_url has no trailing slash; the file name is appended as-is"
            );
        }

        Ok(BackupConfig { job, target, poll })
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_secs(key: &'static str, raw: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    raw.map(|r| parse_u64(key, r).map(Duration::from_secs))
        .transpose()
}

/// 0 means "no limit", same as leaving the key out.
fn parse_limit(key: &'static str, raw: Option<&str>) -> Result<Option<u64>, ConfigError> {
    Ok(raw
        .map(|r| parse_u64(key, r))
        .transpose()?
        .filter(|n| *n > 0))
}
