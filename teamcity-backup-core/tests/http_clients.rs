use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::Router;
use futures::StreamExt;
use tempfile::tempdir;

use teamcity_backup_core::artifactory::ArtifactoryClient;
use teamcity_backup_core::checksum::Checksums;
use teamcity_backup_core::config::{BackupJob, Credentials, RepositoryTarget};
use teamcity_backup_core::contract::{ArtifactRepository, BuildServer};
use teamcity_backup_core::error::BackupError;
use teamcity_backup_core::teamcity::TeamCityClient;

const FILE_NAME: &str = "nightly_20240309_040506.zip";
const TRUNCATED_NAME: &str = "truncated.zip";

#[derive(Default)]
struct Recorded {
    trigger_queries: Vec<HashMap<String, String>>,
    authorizations: Vec<String>,
    status_calls: usize,
    upload_headers: Option<HeaderMap>,
    upload_body: Option<Bytes>,
}

#[derive(Clone)]
struct Stub {
    recorded: Arc<Mutex<Recorded>>,
    status_bodies: Arc<Vec<&'static str>>,
    archive_chunks: Arc<Vec<Vec<u8>>>,
    upload_status: StatusCode,
    upload_body: &'static str,
}

impl Stub {
    fn new() -> Self {
        Self {
            recorded: Arc::default(),
            status_bodies: Arc::new(vec!["running", "Idle"]),
            archive_chunks: Arc::new(vec![vec![1u8; 512], Vec::new(), vec![2u8; 512], vec![3u8; 3]]),
            upload_status: StatusCode::CREATED,
            upload_body: "{\"downloadUri\":\"ok\"}",
        }
    }

    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.recorded.lock().unwrap().authorizations.push(auth);
    }
}

async fn trigger(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    stub.record_auth(&headers);
    stub.recorded.lock().unwrap().trigger_queries.push(query);
    (StatusCode::OK, "")
}

async fn status(State(stub): State<Stub>, headers: HeaderMap) -> impl IntoResponse {
    stub.record_auth(&headers);
    let mut recorded = stub.recorded.lock().unwrap();
    let body = stub.status_bodies[recorded.status_calls.min(stub.status_bodies.len() - 1)];
    recorded.status_calls += 1;
    (StatusCode::OK, body)
}

async fn download(State(stub): State<Stub>, Path(name): Path<String>) -> axum::response::Response {
    if name == TRUNCATED_NAME {
        // One chunk lands on disk, then the connection dies.
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(vec![9u8; 4096])),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "cut")),
        ];
        let stream = futures::stream::iter(chunks).then(|chunk| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            chunk
        });
        return Body::from_stream(stream).into_response();
    }
    if name != FILE_NAME {
        return (StatusCode::NOT_FOUND, "no such backup").into_response();
    }
    let chunks: Vec<Result<Bytes, std::io::Error>> = stub
        .archive_chunks
        .iter()
        .map(|c| Ok(Bytes::from(c.clone())))
        .collect();
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn deploy(
    State(stub): State<Stub>,
    Path(_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    stub.record_auth(&headers);
    let mut recorded = stub.recorded.lock().unwrap();
    recorded.upload_headers = Some(headers);
    recorded.upload_body = Some(body);
    (stub.upload_status, stub.upload_body)
}

async fn spawn_stub(stub: Stub) -> String {
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

fn job(base_url: &str, local_path: PathBuf) -> BackupJob {
    BackupJob {
        server_url: format!("{base_url}/"),
        credentials: Credentials::new("tc-user", "tc-pass"),
        target_file_name: FILE_NAME.into(),
        local_path,
    }
}

fn target(base_url: &str) -> RepositoryTarget {
    RepositoryTarget {
        repository_url: format!("{base_url}/artifactory/backups/"),
        credentials: Credentials::new("rt-user", "rt-pass"),
        destination_file_name: FILE_NAME.into(),
    }
}

#[tokio::test]
async fn trigger_sends_backup_parameters_with_basic_auth() {
    let stub = Stub::new();
    let recorded = stub.recorded.clone();
    let base = spawn_stub(stub).await;
    let dir = tempdir().unwrap();
    let client = TeamCityClient::new(&job(&base, dir.path().join(FILE_NAME))).unwrap();

    let result = client.trigger_backup(FILE_NAME).await.unwrap();
    assert_eq!(result.status, 200);

    let recorded = recorded.lock().unwrap();
    let query = &recorded.trigger_queries[0];
    assert_eq!(query.len(), 4);
    assert_eq!(query["includeConfigs"], "true");
    assert_eq!(query["includeDatabase"], "true");
    assert_eq!(query["addTimestamp"], "false");
    assert_eq!(query["fileName"], FILE_NAME);
    assert!(recorded.authorizations[0].starts_with("Basic "));
}

#[tokio::test]
async fn status_returns_body_text_and_code() {
    let stub = Stub::new();
    let base = spawn_stub(stub).await;
    let dir = tempdir().unwrap();
    let client = TeamCityClient::new(&job(&base, dir.path().join(FILE_NAME))).unwrap();

    let first = client.backup_status().await.unwrap();
    let second = client.backup_status().await.unwrap();
    assert_eq!((first.body.as_str(), first.status), ("running", 200));
    assert_eq!((second.body.as_str(), second.status), ("Idle", 200));
}

#[tokio::test]
async fn download_writes_all_non_empty_chunks_in_order() {
    let stub = Stub::new();
    let expected: Vec<u8> = stub.archive_chunks.iter().flatten().copied().collect();
    let base = spawn_stub(stub).await;
    let dir = tempdir().unwrap();
    let local_path = dir.path().join(FILE_NAME);
    let client = TeamCityClient::new(&job(&base, local_path.clone())).unwrap();

    let written = client.download_backup(FILE_NAME, &local_path).await.unwrap();

    assert_eq!(written, 1027);
    assert_eq!(std::fs::read(&local_path).unwrap(), expected);
}

#[tokio::test]
async fn missing_archive_is_a_status_error_and_leaves_no_file() {
    let base = spawn_stub(Stub::new()).await;
    let dir = tempdir().unwrap();
    let local_path = dir.path().join("other.zip");
    let client = TeamCityClient::new(&job(&base, local_path.clone())).unwrap();

    let err = client
        .download_backup("other.zip", &local_path)
        .await
        .unwrap_err();

    match err {
        BackupError::RemoteStatus { status, body, url } => {
            assert_eq!(status, 404);
            assert_eq!(body, "no such backup");
            assert!(url.ends_with("/get/file/backup/other.zip"));
        }
        other => panic!("expected RemoteStatus, got {other:?}"),
    }
    assert!(!local_path.exists());
}

#[tokio::test]
async fn broken_download_stream_removes_partial_file() {
    let base = spawn_stub(Stub::new()).await;
    let dir = tempdir().unwrap();
    let local_path = dir.path().join(TRUNCATED_NAME);
    let client = TeamCityClient::new(&job(&base, local_path.clone())).unwrap();

    let err = client
        .download_backup(TRUNCATED_NAME, &local_path)
        .await
        .unwrap_err();

    match err {
        BackupError::Transport { url, .. } => {
            assert!(url.ends_with("/get/file/backup/truncated.zip"), "{url}")
        }
        other => panic!("expected Transport, got {other:?}"),
    }
    assert!(!local_path.exists(), "partial download must be removed");
}

#[tokio::test]
async fn upload_sends_file_with_checksum_headers() {
    let stub = Stub::new();
    let recorded = stub.recorded.clone();
    let base = spawn_stub(stub).await;
    let dir = tempdir().unwrap();
    let local_path = dir.path().join(FILE_NAME);
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 97) as u8).collect();
    std::fs::write(&local_path, &data).unwrap();

    let repo_target = target(&base);
    let client = ArtifactoryClient::new(&repo_target).unwrap();
    let outcome = client
        .upload(&local_path, &repo_target.destination_url())
        .await
        .unwrap();

    let expected = Checksums::of_bytes(&data);
    assert_eq!(outcome.response.status, 201);
    assert_eq!(outcome.checksums, expected);

    let recorded = recorded.lock().unwrap();
    let headers = recorded.upload_headers.as_ref().unwrap();
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert_eq!(headers["x-checksum-md5"], expected.md5.as_str());
    assert_eq!(headers["x-checksum-sha1"], expected.sha1.as_str());
    assert_eq!(headers["x-checksum-sha256"], expected.sha256.as_str());
    assert!(headers["authorization"].to_str().unwrap().starts_with("Basic "));
    assert_eq!(recorded.upload_body.as_deref(), Some(data.as_slice()));
    // upload never removes the local file; that is the orchestrator's call
    assert!(local_path.exists());
}

#[tokio::test]
async fn upload_fails_on_any_status_but_created() {
    for (status, body) in [
        (StatusCode::CONFLICT, "conflict"),
        (StatusCode::OK, "ok but not created"),
    ] {
        let stub = Stub {
            upload_status: status,
            upload_body: body,
            ..Stub::new()
        };
        let base = spawn_stub(stub).await;
        let dir = tempdir().unwrap();
        let local_path = dir.path().join(FILE_NAME);
        std::fs::write(&local_path, b"archive").unwrap();

        let repo_target = target(&base);
        let client = ArtifactoryClient::new(&repo_target).unwrap();
        let err = client
            .upload(&local_path, &repo_target.destination_url())
            .await
            .unwrap_err();

        match err {
            BackupError::RemoteStatus {
                status: got,
                body: got_body,
                ..
            } => {
                assert_eq!(got, status.as_u16());
                assert_eq!(got_body, body);
            }
            other => panic!("expected RemoteStatus for {status}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dir = tempdir().unwrap();
    let client =
        TeamCityClient::new(&job(&format!("http://{addr}"), dir.path().join(FILE_NAME))).unwrap();

    let err = client.backup_status().await.unwrap_err();
    match err {
        BackupError::Transport { url, .. } => {
            assert_eq!(url, format!("http://{addr}/app/rest/server/backup"));
        }
        other => panic!("expected Transport, got {other:?}"),
    }
}
