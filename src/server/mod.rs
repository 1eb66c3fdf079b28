//! HTTP surface.
//!
//! - `POST /github/webhook`: signed push events, routed to the build-service driver
//! - `/github/deploy/{owner}/{repo}/{build_type}`: manual artifact deployment
//! - `GET /health`
//!
//! Anything else, including a known path with the wrong method, gets a JSON 404.
//!
//! Handlers only validate and enqueue. The response means the job was
//! accepted, not that it succeeded.

pub mod signature;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::core::DeployQueue;
use crate::domain::{
    ArtifactDeployRequest, BuildType, JobRequest, RepoRef, RoutingTable, ServiceDeployRequest,
};
use crate::error::DeployError;

const DEPLOY_USAGE: &str =
    "Expected /github/deploy/<owner>/<repo>/<build type>. Example /github/deploy/<owner>/<repo>/citizen";

/// Shared state for all handlers
pub struct AppState {
    pub queue: DeployQueue,
    pub routes: RoutingTable,
    /// Webhooks are rejected while this is unset
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

type Reply = (StatusCode, axum::response::Response);

fn reply(status: StatusCode, text: impl Into<String>) -> Reply {
    let body = Json(MessageResponse {
        message: text.into(),
    });
    (status, body.into_response())
}

fn reject(status: StatusCode, text: impl Into<String>) -> Reply {
    let body = Json(ErrorResponse { error: text.into() });
    (status, body.into_response())
}

/// Push payload fields the receiver reads
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
    #[serde(default)]
    repository: Option<PayloadRepository>,
}

#[derive(Debug, Deserialize)]
struct PayloadRepository {
    #[serde(default)]
    full_name: Option<String>,
}

/// Creates the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check).fallback(not_found))
        .route("/github/webhook", post(receive_webhook).fallback(not_found))
        .route("/github/webhook/{*channel}", post(receive_webhook).fallback(not_found))
        .route("/github/deploy", any(deploy_usage))
        .route("/github/deploy/", any(deploy_usage))
        .route("/github/deploy/{*path}", any(manual_deploy))
        .fallback(not_found)
        .with_state(state)
}

/// Serve until Ctrl+C
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "healthy" })
}

async fn not_found() -> impl IntoResponse {
    reject(StatusCode::NOT_FOUND, "Resource not found")
}

async fn submit(state: &AppState, request: JobRequest, accepted: String) -> Reply {
    match state.queue.submit(request).await {
        Ok(job_id) => {
            info!(%job_id, "{}", accepted);
            reply(StatusCode::ACCEPTED, accepted)
        }
        Err(DeployError::QueueFull) => {
            reject(StatusCode::SERVICE_UNAVAILABLE, "deployment queue is full")
        }
        Err(e) => reject(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let verified = match (&state.webhook_secret, signature) {
        (Some(secret), Some(header)) => signature::verify(secret.as_bytes(), &body, header),
        _ => false,
    };
    if !verified {
        warn!("Rejected webhook with missing or mismatched signature");
        return reject(StatusCode::UNAUTHORIZED, "Error in matching github signature");
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => return reject(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e)),
    };

    let Some(repository) = payload.repository.and_then(|r| r.full_name) else {
        return reply(StatusCode::OK, "Unknown webhook event");
    };
    let git_ref = payload.git_ref.unwrap_or_default();

    let Some(route) = state.routes.find(&repository, &git_ref) else {
        info!(%repository, %git_ref, "No route for push");
        return reply(
            StatusCode::OK,
            format!("Unknown ref in {}: {}", repository, git_ref),
        );
    };

    let request = ServiceDeployRequest::from(route);
    let accepted = format!("Deployment started for {}/{}", request.module, request.service);
    submit(&state, JobRequest::Service(request), accepted).await
}

async fn deploy_usage() -> impl IntoResponse {
    reject(StatusCode::BAD_REQUEST, DEPLOY_USAGE)
}

/// Parse `<owner>/<repo>/<build type>[/...]`; trailing segments are ignored
fn parse_deploy_path(path: &str) -> Result<(RepoRef, BuildType), DeployError> {
    let mut segments = path.split('/');
    let mut next = || {
        segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DeployError::InvalidIdentifier(path.to_string()))
    };

    let owner = next()?;
    let repo = next()?;
    let build_type = next()?;

    Ok((RepoRef::new(owner, repo)?, BuildType::new(build_type)?))
}

async fn manual_deploy(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let (repo, build_type) = match parse_deploy_path(&path) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(%path, error = %e, "Rejected manual deploy");
            return reject(StatusCode::BAD_REQUEST, DEPLOY_USAGE);
        }
    };

    let accepted = format!("Deployment started for {} build type {}", repo, build_type);
    let request = JobRequest::Artifacts(ArtifactDeployRequest {
        repo,
        build_types: vec![build_type],
    });
    submit(&state, request, accepted).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deploy_path() {
        let (repo, bt) = parse_deploy_path("Transerve-PwC/frontend/citizen").unwrap();
        assert_eq!(repo.full_name(), "Transerve-PwC/frontend");
        assert_eq!(bt.as_str(), "citizen");

        let (_, bt) = parse_deploy_path("Transerve-PwC/frontend/employee/extra").unwrap();
        assert_eq!(bt.as_str(), "employee");
    }

    #[test]
    fn test_parse_deploy_path_rejects_short_or_unsafe() {
        assert!(parse_deploy_path("Transerve-PwC/frontend").is_err());
        assert!(parse_deploy_path("Transerve-PwC//citizen").is_err());
        assert!(parse_deploy_path("Transerve-PwC/frontend/..").is_err());
        assert!(parse_deploy_path("").is_err());
    }
}
