//! Remote Fetcher Integration Tests
//!
//! Runs the GitHub client against a local HTTP server that mimics the
//! Actions API: run listing, artifact listing, redirect chains and errors.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use deployhook::adapters::{ArtifactSource, GitHubClient};
use deployhook::config::ArtifactSettings;
use deployhook::domain::{BuildType, RepoRef};
use deployhook::DeployError;
use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::net::TcpListener;

fn archive_body() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 251) as u8).collect()
}

async fn runs(State(base): State<String>) -> impl IntoResponse {
    Json(json!({
        "total_count": 2,
        "workflow_runs": [
            { "id": 42, "status": "completed", "conclusion": "success",
              "artifacts_url": format!("{}/runs/42/artifacts", base) },
            { "id": 41, "status": "completed", "conclusion": "success",
              "artifacts_url": format!("{}/runs/41/artifacts", base) }
        ]
    }))
}

async fn artifacts(State(base): State<String>, Path(run): Path<u64>) -> impl IntoResponse {
    assert_eq!(run, 42, "only the latest run is consulted");
    Json(json!({
        "artifacts": [
            { "id": 1, "name": "citizen", "archive_download_url": format!("{}/hop/3", base) },
            { "id": 2, "name": "docs", "archive_download_url": format!("{}/hop/0", base) }
        ]
    }))
}

/// `/hop/n` redirects n more times before serving the archive
async fn hop(Path(n): Path<u32>) -> Response {
    if n == 0 {
        (StatusCode::OK, archive_body()).into_response()
    } else {
        (
            StatusCode::FOUND,
            [(header::LOCATION, format!("/hop/{}", n - 1))],
        )
            .into_response()
    }
}

async fn gone() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "artifact expired")
}

async fn bare_redirect() -> impl IntoResponse {
    StatusCode::FOUND
}

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let app = Router::new()
        .route("/repos/{owner}/{repo}/actions/runs", get(runs))
        .route("/runs/{run}/artifacts", get(artifacts))
        .route("/hop/{n}", get(hop))
        .route("/gone", get(gone))
        .route("/bare-redirect", get(bare_redirect))
        .with_state(base.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn client(base: &str, max_redirects: u32) -> GitHubClient {
    let settings = ArtifactSettings {
        api_base: base.to_string(),
        max_redirects,
        ..Default::default()
    };
    GitHubClient::new(&settings, Some("test-token".to_string())).unwrap()
}

#[tokio::test]
async fn test_resolve_matches_latest_run_artifacts() {
    let base = spawn_server().await;
    let client = client(&base, 10);
    let repo = RepoRef::new("Transerve-PwC", "frontend").unwrap();
    let wanted = vec![
        BuildType::new("citizen").unwrap(),
        BuildType::new("employee").unwrap(),
    ];

    let matched = client.resolve_artifacts(&repo, &wanted).await.unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].build_type.as_str(), "citizen");
    assert_eq!(matched[0].download_url, format!("{}/hop/3", base));
}

#[tokio::test]
async fn test_redirect_chain_delivers_terminal_body() {
    let base = spawn_server().await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("citizen-build.zip");

    for hops in [0, 1, 3, 10] {
        let staged = client(&base, 10)
            .download(&format!("{}/hop/{}", base, hops), &dest)
            .await
            .unwrap();

        let expected = archive_body();
        assert_eq!(std::fs::read(&dest).unwrap(), expected, "after {} hops", hops);
        assert_eq!(staged.size_bytes, expected.len() as u64);
        assert_eq!(staged.sha256, hex::encode(Sha256::digest(&expected)));
    }
}

#[tokio::test]
async fn test_redirect_limit_enforced() {
    let base = spawn_server().await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("citizen-build.zip");

    let result = client(&base, 2)
        .download(&format!("{}/hop/3", base), &dest)
        .await;
    assert!(matches!(
        result,
        Err(DeployError::TooManyRedirects { limit: 2, .. })
    ));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let base = spawn_server().await;
    let temp = TempDir::new().unwrap();

    let result = client(&base, 10)
        .download(&format!("{}/gone", base), &temp.path().join("x.zip"))
        .await;
    match result {
        Err(DeployError::HttpStatus { status, body, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "artifact expired");
        }
        other => panic!("Expected HTTP status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_redirect_without_location_is_error() {
    let base = spawn_server().await;
    let result = client(&base, 10)
        .fetch(&format!("{}/bare-redirect", base))
        .await;
    assert!(matches!(
        result,
        Err(DeployError::HttpStatus { status: 302, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let repo = RepoRef::new("o", "r").unwrap();
    let result = client(&base, 10)
        .resolve_artifacts(&repo, &[BuildType::new("citizen").unwrap()])
        .await;
    assert!(matches!(result, Err(DeployError::Transport { .. })));
}
