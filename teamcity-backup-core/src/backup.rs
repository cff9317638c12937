//! High-level workflow: trigger → poll until idle → download → upload → cleanup.
//!
//! [`run_backup`] walks one [`BackupConfig`] through the stages of [`BackupStage`],
//! talking to the build server and the artifact repository only through the
//! [`BuildServer`] and [`ArtifactRepository`] traits.
//!
//! # Responsibilities
//! - Strictly sequential: one remote call outstanding at a time
//! - Fail fast: the first failing stage ends the run with a [`BackupFailure`]
//!   naming the stage
//! - The local archive is deleted only after a successful upload; on upload
//!   failure it is left in place for inspection
//!
//! # Polling
//! The status endpoint is polled every `poll.interval` until its body mentions
//! "idle" (any case). [`PollPolicy`] bounds the loop by attempts and/or elapsed
//! time, and decides whether a transport error while polling aborts the run or
//! counts as one more "not idle yet".

use std::fmt;
use std::path::PathBuf;

use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::checksum::Checksums;
use crate::config::{BackupConfig, PollPolicy, TransportErrorPolicy};
use crate::contract::{ArtifactRepository, BuildServer};
use crate::error::{BackupError, BackupFailure};

/// Token in the status body that means no backup is running.
pub const IDLE_TOKEN: &str = "idle";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupStage {
    Idle,
    Triggering,
    Polling,
    Downloading,
    Uploading,
    Cleanup,
    Done,
    Failed,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupStage::Idle => "idle",
            BackupStage::Triggering => "triggering",
            BackupStage::Polling => "polling",
            BackupStage::Downloading => "downloading",
            BackupStage::Uploading => "uploading",
            BackupStage::Cleanup => "cleanup",
            BackupStage::Done => "done",
            BackupStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub file_name: String,
    pub local_path: PathBuf,
    pub destination_url: String,
    pub bytes_downloaded: u64,
    pub poll_attempts: u32,
    pub checksums: Checksums,
    pub upload_status: u16,
}

/// Case-insensitive check of a status body for [`IDLE_TOKEN`].
pub fn is_idle(status_body: &str) -> bool {
    status_body.to_lowercase().contains(IDLE_TOKEN)
}

fn fail(stage: BackupStage, error: BackupError) -> BackupFailure {
    error!(stage = %stage, error = %error, "[BACKUP][ERROR] Stage failed");
    BackupFailure { stage, error }
}

/// Polls until the server reports idle, returning how many status calls it took.
pub async fn wait_until_idle<S>(server: &S, policy: &PollPolicy) -> Result<u32, BackupError>
where
    S: BuildServer + ?Sized,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        info!(attempt = attempts, "[BACKUP] Polling backup status");

        match server.backup_status().await {
            Ok(status) => {
                info!(
                    text = %status.body,
                    code = status.status,
                    "[BACKUP] Backup poller got a response"
                );
                if is_idle(&status.body) {
                    return Ok(attempts);
                }
            }
            Err(e) if e.is_transport() && policy.on_transport_error == TransportErrorPolicy::Retry => {
                warn!(error = %e, attempt = attempts, "[BACKUP] Status poll failed, retrying");
            }
            Err(e) => return Err(e),
        }

        let elapsed = started.elapsed();
        let out_of_attempts = policy.max_attempts.is_some_and(|max| attempts >= max);
        let out_of_time = policy
            .max_duration
            .is_some_and(|max| elapsed + policy.interval > max);
        if out_of_attempts || out_of_time {
            return Err(BackupError::PollExhausted { attempts, elapsed });
        }

        sleep(policy.interval).await;
    }
}

/// Runs the whole workflow once.
pub async fn run_backup<S, R>(
    config: &BackupConfig,
    server: &S,
    repository: &R,
) -> Result<BackupReport, BackupFailure>
where
    S: BuildServer + ?Sized,
    R: ArtifactRepository + ?Sized,
{
    let job = &config.job;
    let file_name = job.target_file_name.as_str();
    let local_path = job.local_path.as_path();
    let destination_url = config.target.destination_url();

    info!(
        stage = %BackupStage::Idle,
        file_name,
        "[BACKUP] Starting TeamCity backup"
    );

    // --- Trigger ---
    // Any answer counts as started; the status poll tells us what really happened.
    let stage = BackupStage::Triggering;
    info!(stage = %stage, "[BACKUP] Starting backup");
    let started = server
        .trigger_backup(file_name)
        .await
        .map_err(|e| fail(stage, e))?;
    info!(
        text = %started.body,
        code = started.status,
        "[BACKUP] Backup starter got a response"
    );

    // --- Poll ---
    let stage = BackupStage::Polling;
    info!(stage = %stage, interval = ?config.poll.interval, "[BACKUP] Waiting for backup to finish");
    let poll_attempts = wait_until_idle(server, &config.poll)
        .await
        .map_err(|e| fail(stage, e))?;

    // --- Download ---
    let stage = BackupStage::Downloading;
    info!(stage = %stage, path = %local_path.display(), "[BACKUP] Downloading backup");
    let bytes_downloaded = server
        .download_backup(file_name, local_path)
        .await
        .map_err(|e| fail(stage, e))?;

    // --- Upload ---
    let stage = BackupStage::Uploading;
    info!(
        stage = %stage,
        path = %local_path.display(),
        url = %destination_url,
        "[BACKUP] Uploading backup to artifact repository"
    );
    let uploaded = repository
        .upload(local_path, &destination_url)
        .await
        .map_err(|e| fail(stage, e))?;
    info!(
        text = %uploaded.response.body,
        code = uploaded.response.status,
        "[BACKUP] Artifact uploader got a response"
    );

    // --- Cleanup ---
    let stage = BackupStage::Cleanup;
    tokio::fs::remove_file(local_path)
        .await
        .map_err(|e| fail(stage, BackupError::io(local_path, e)))?;
    info!(stage = %stage, path = %local_path.display(), "[BACKUP] Removed local backup file");

    info!(stage = %BackupStage::Done, file_name, "[BACKUP] Backup complete");
    Ok(BackupReport {
        file_name: file_name.to_string(),
        local_path: local_path.to_path_buf(),
        destination_url,
        bytes_downloaded,
        poll_attempts,
        checksums: uploaded.checksums,
        upload_status: uploaded.response.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_detection_ignores_case() {
        assert!(is_idle("Idle"));
        assert!(is_idle("IDLE"));
        assert!(is_idle("server is idle now"));
        assert!(!is_idle("running"));
        assert!(!is_idle(""));
    }

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(BackupStage::Downloading.to_string(), "downloading");
        assert_eq!(BackupStage::Failed.to_string(), "failed");
    }
}
