//! Basic-auth HTTP wrapper shared by the TeamCity and Artifactory clients.
//!
//! Every request is built fresh: method, URL, credentials, and whatever headers the
//! caller passes for this call only. Any failure that leaves us without a
//! response (connect error, timeout, broken body) is reported as
//! [`BackupError::Transport`] carrying the URL. No retries, and the transport's
//! default timeouts apply.

use reqwest::header::HeaderMap;
use reqwest::{Body, Client, Method, Response};
use tracing::debug;

use crate::config::Credentials;
use crate::contract::HttpResult;
use crate::error::BackupError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    credentials: Credentials,
}

impl ApiClient {
    pub fn new(credentials: Credentials) -> Result<Self, BackupError> {
        let http = Client::builder()
            .user_agent(concat!("teamcity-backup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackupError::transport("<client setup>", e))?;
        Ok(Self { http, credentials })
    }

    /// Sends the request and hands back the raw response for streaming.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Body>,
    ) -> Result<Response, BackupError> {
        debug!(%method, url, "Sending request");
        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| BackupError::transport(url, e))
    }

    /// Sends the request and reads the whole body as text.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Body>,
    ) -> Result<HttpResult, BackupError> {
        let response = self.send(method, url, headers, body).await?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackupError::transport(url, e))?;
        debug!(url, status, body_len = body.len(), "Received response");
        Ok(HttpResult { body, status })
    }
}
