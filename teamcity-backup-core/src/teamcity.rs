use std::path::Path;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::BackupJob;
use crate::contract::{BuildServer, HttpResult};
use crate::error::BackupError;
use crate::http::ApiClient;

/// Client for the TeamCity server backup REST API.
pub struct TeamCityClient {
    api: ApiClient,
    base_url: String,
}

impl TeamCityClient {
    pub fn new(job: &BackupJob) -> Result<Self, BackupError> {
        Ok(Self {
            api: ApiClient::new(job.credentials.clone())?,
            base_url: job.server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Starts a configs + database backup (no logs) written without a server-side timestamp.
    pub fn trigger_url(&self, file_name: &str) -> String {
        format!(
            "{}/app/rest/server/backup?includeConfigs=true&includeDatabase=true&addTimestamp=false&fileName={}",
            self.base_url, file_name
        )
    }

    pub fn status_url(&self) -> String {
        format!("{}/app/rest/server/backup", self.base_url)
    }

    pub fn download_url(&self, file_name: &str) -> String {
        format!("{}/get/file/backup/{}", self.base_url, file_name)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<u64, BackupError> {
        let mut response = self
            .api
            .send(Method::GET, url, HeaderMap::new(), None)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            return Err(BackupError::RemoteStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| BackupError::io(destination, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BackupError::transport(url, e))?
        {
            // keep-alive chunks carry no data
            if chunk.is_empty() {
                continue;
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| BackupError::io(destination, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| BackupError::io(destination, e))?;

        Ok(written)
    }
}

#[async_trait]
impl BuildServer for TeamCityClient {
    async fn trigger_backup(&self, file_name: &str) -> Result<HttpResult, BackupError> {
        let url = self.trigger_url(file_name);
        info!(url = %url, "Triggering TeamCity backup");
        self.api
            .call(Method::POST, &url, HeaderMap::new(), None)
            .await
    }

    async fn backup_status(&self) -> Result<HttpResult, BackupError> {
        let url = self.status_url();
        debug!(url = %url, "Polling TeamCity backup status");
        self.api.call(Method::GET, &url, HeaderMap::new(), None).await
    }

    async fn download_backup(
        &self,
        file_name: &str,
        destination: &Path,
    ) -> Result<u64, BackupError> {
        let url = self.download_url(file_name);
        info!(url = %url, path = %destination.display(), "Downloading TeamCity backup");

        match self.stream_to_file(&url, destination).await {
            Ok(written) => {
                info!(path = %destination.display(), bytes = written, "Backup downloaded");
                Ok(written)
            }
            Err(e) => {
                warn!(error = %e, url = %url, "Backup download failed");
                // Never leave a truncated archive behind.
                match tokio::fs::remove_file(destination).await {
                    Ok(()) => {
                        warn!(path = %destination.display(), "Removed partial download")
                    }
                    Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                    Err(rm) => {
                        warn!(error = %rm, path = %destination.display(), "Failed to remove partial download")
                    }
                }
                Err(e)
            }
        }
    }
}
