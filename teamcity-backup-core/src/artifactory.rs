use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Method};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::checksum::{file_checksums, Checksums};
use crate::config::RepositoryTarget;
use crate::contract::{ArtifactRepository, HttpResult, UploadOutcome};
use crate::error::BackupError;
use crate::http::ApiClient;

pub const CHECKSUM_MD5: &str = "X-Checksum-Md5";
pub const CHECKSUM_SHA1: &str = "X-Checksum-Sha1";
pub const CHECKSUM_SHA256: &str = "X-Checksum-Sha256";

/// Artifactory only reports a deploy as done with 201 Created.
const CREATED: u16 = 201;

/// Deploys files into an Artifactory repository with a checksum-verified PUT.
pub struct ArtifactoryClient {
    api: ApiClient,
}

impl ArtifactoryClient {
    pub fn new(target: &RepositoryTarget) -> Result<Self, BackupError> {
        Ok(Self {
            api: ApiClient::new(target.credentials.clone())?,
        })
    }
}

/// Headers for one deploy request. Every checksum header is present or the call fails.
pub fn upload_headers(checksums: &Checksums, content_length: u64) -> Result<HeaderMap, BackupError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(CONTENT_LENGTH, HeaderValue::from(content_length));
    for (name, value) in [
        (CHECKSUM_MD5, &checksums.md5),
        (CHECKSUM_SHA1, &checksums.sha1),
        (CHECKSUM_SHA256, &checksums.sha256),
    ] {
        let value =
            HeaderValue::from_str(value).map_err(|source| BackupError::Header { name, source })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl ArtifactRepository for ArtifactoryClient {
    async fn upload(
        &self,
        local_path: &Path,
        destination_url: &str,
    ) -> Result<UploadOutcome, BackupError> {
        let checksums = file_checksums(local_path).await?;
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| BackupError::io(local_path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| BackupError::io(local_path, e))?
            .len();

        info!(
            path = %local_path.display(),
            url = destination_url,
            bytes = size,
            md5 = %checksums.md5,
            sha1 = %checksums.sha1,
            "Uploading backup to Artifactory"
        );

        let body = Body::wrap_stream(ReaderStream::new(file));
        let response: HttpResult = self
            .api
            .call(
                Method::PUT,
                destination_url,
                upload_headers(&checksums, size)?,
                Some(body),
            )
            .await?;

        if response.status != CREATED {
            warn!(
                url = destination_url,
                status = response.status,
                body = %response.body,
                "Artifactory rejected the upload"
            );
            return Err(BackupError::RemoteStatus {
                url: destination_url.to_string(),
                status: response.status,
                body: response.body,
            });
        }

        Ok(UploadOutcome {
            response,
            checksums,
        })
    }
}
