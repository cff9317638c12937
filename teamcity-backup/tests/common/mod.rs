//! Stub TeamCity + Artifactory server for end-to-end CLI tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;

#[derive(Clone)]
pub struct Stub {
    pub status_calls: Arc<AtomicUsize>,
    pub uploaded: Arc<Mutex<Vec<(String, usize)>>>,
    pub upload_status: StatusCode,
    pub upload_body: &'static str,
}

impl Stub {
    pub fn answering_upload(upload_status: StatusCode, upload_body: &'static str) -> Self {
        Self {
            status_calls: Arc::default(),
            uploaded: Arc::default(),
            upload_status,
            upload_body,
        }
    }
}

async fn trigger() -> (StatusCode, &'static str) {
    (StatusCode::OK, "")
}

/// "running" on the first poll, "idle" afterwards.
async fn status(State(stub): State<Stub>) -> &'static str {
    if stub.status_calls.fetch_add(1, Ordering::SeqCst) == 0 {
        "running"
    } else {
        "idle"
    }
}

async fn download(UrlPath(_name): UrlPath<String>) -> Vec<u8> {
    vec![42u8; 1024]
}

async fn deploy(
    State(stub): State<Stub>,
    UrlPath(name): UrlPath<String>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    stub.uploaded.lock().unwrap().push((name, body.len()));
    (stub.upload_status, stub.upload_body)
}

/// Serves both remotes on one ephemeral port and returns its base URL.
pub async fn spawn(stub: Stub) -> String {
    let app = Router::new()
        .route("/app/rest/server/backup", post(trigger).get(status))
        .route("/get/file/backup/{name}", get(download))
        .route("/artifactory/backups/{name}", put(deploy))
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Writes an INI file pointing both remotes at `base_url`.
pub fn write_config(path: &Path, base_url: &str, backup_dir: &Path) {
    let ini = format!(
        "[teamcity_backup]\n\
         file_prefix = nightly\n\
         file_path = {}\n\
         teamcity_url = {base_url}/\n\
         teamcity_user = tc-user\n\
         teamcity_pass = tc-pass\n\
         artifactory_url = {base_url}/artifactory/backups/\n\
         artifactory_user = rt-user\n\
         artifactory_pass = rt-pass\n\
         poll_interval_secs = 1\n\
         poll_max_attempts = 10\n",
        backup_dir.display()
    );
    std::fs::write(path, ini).unwrap();
}
