//! Error taxonomy for the backup workflow.
//!
//! Three families of failure exist: bad configuration, transport failures
//! talking to a remote, and remotes answering with an unexpected status.
//! Local file I/O and an exhausted poll budget round out the set. Every
//! variant carries structured context (URL, status, body, path) instead of a
//! pre-formatted message so callers can match on the kind.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::InvalidHeaderValue;
use thiserror::Error;

use crate::backup::BackupStage;

/// Type-erased underlying cause of a transport failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("section [{section}] not found in configuration file")]
    MissingSection { section: String },

    #[error("missing required keys in section [{section}]: {}", .keys.join(", "))]
    MissingKeys {
        section: String,
        keys: Vec<&'static str>,
    },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("remote call to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{url} answered with status {status}: {body}")]
    RemoteStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup status never reported idle after {attempts} polls ({elapsed:?})")]
    PollExhausted { attempts: u32, elapsed: Duration },

    #[error("invalid value for header {name}: {source}")]
    Header {
        name: &'static str,
        #[source]
        source: InvalidHeaderValue,
    },
}

/// A failed remote call. Kept as its own name because that is how the
/// workflow talks about a request that never got a response.
pub type RemoteCallError = BackupError;

impl BackupError {
    pub fn transport(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        BackupError::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, BackupError::Transport { .. })
    }
}

/// The orchestrator's error: which stage failed, and why.
#[derive(Error, Debug)]
#[error("backup failed during {stage}: {error}")]
pub struct BackupFailure {
    pub stage: BackupStage,
    #[source]
    pub error: BackupError,
}

pub type Result<T> = std::result::Result<T, BackupError>;
