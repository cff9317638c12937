//! # contract: the two remotes the backup workflow talks to
//!
//! The orchestrator in [`crate::backup`] only sees these traits:
//! - [`BuildServer`] starts a server backup, reports its status and hands out the archive.
//! - [`ArtifactRepository`] stores the archive for long-term retention.
//!
//! Real implementations live in [`crate::teamcity`] and [`crate::artifactory`].
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, exported behind the `test-export-mocks`
//!   feature so integration tests of dependent crates can drive the orchestrator
//!   without a network.
//!
//! ## Errors
//! - A request that gets no response at all is a [`BackupError::Transport`].
//! - Status codes are reported in [`HttpResult`]; whether a status is acceptable is
//!   decided per operation, not here.

use std::path::Path;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::checksum::Checksums;
use crate::error::BackupError;

/// Body text and status code of one remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResult {
    pub body: String,
    pub status: u16,
}

impl HttpResult {
    pub fn new(body: impl Into<String>, status: u16) -> Self {
        Self {
            body: body.into(),
            status,
        }
    }
}

/// What an upload produced: the remote's answer and the checksums that were sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub response: HttpResult,
    pub checksums: Checksums,
}

/// The build server's backup API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BuildServer: Send + Sync {
    /// Ask the server to start writing a backup (configs and database) to `file_name`.
    async fn trigger_backup(&self, file_name: &str) -> Result<HttpResult, BackupError>;

    /// Current backup status; the body contains "idle" once nothing is running.
    async fn backup_status(&self) -> Result<HttpResult, BackupError>;

    /// Stream the finished archive `file_name` into `destination`, returning bytes written.
    async fn download_backup(&self, file_name: &str, destination: &Path)
        -> Result<u64, BackupError>;
}

/// Long-term storage for finished archives.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Upload `local_path` to `destination_url`.
    ///
    /// Implementor is responsible for checksums and for rejecting any status but 201.
    async fn upload(
        &self,
        local_path: &Path,
        destination_url: &str,
    ) -> Result<UploadOutcome, BackupError>;
}
