//! GitHub Actions adapter: the remote archive fetcher.
//!
//! Lists workflow runs, picks the most recent one, matches its artifacts
//! against the wanted build types and streams archives to disk.
//!
//! The HTTP client never follows redirects on its own. [`GitHubClient::fetch`]
//! follows them in a bounded loop so the hop count is explicit and the API
//! token is never forwarded to another host (artifact downloads redirect to
//! signed blob-storage URLs).

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, LOCATION};
use reqwest::{redirect, Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::ArtifactSource;
use crate::config::ArtifactSettings;
use crate::core::stager::StagingFile;
use crate::domain::{
    ArtifactDescriptor, BuildType, RemoteArtifactList, RepoRef, StagedArchive, WorkflowRun,
    WorkflowRunList,
};
use crate::error::DeployError;

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";

/// GitHub REST client for workflow artifacts
pub struct GitHubClient {
    client: Client,
    api_base: String,
    /// Host that receives the token
    api_host: Option<String>,
    token: Option<String>,
    max_redirects: u32,
}

impl GitHubClient {
    /// Create a client from the artifact settings and an optional token
    pub fn new(settings: &ArtifactSettings, token: Option<String>) -> Result<Self, DeployError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(settings.user_agent.clone())
            .build()?;

        let api_base = settings.api_base.trim_end_matches('/').to_string();
        let api_host = Url::parse(&api_base)
            .map_err(|e| DeployError::Transport {
                url: api_base.clone(),
                message: format!("invalid API base: {}", e),
            })?
            .host_str()
            .map(str::to_owned);

        Ok(Self {
            client,
            api_base,
            api_host,
            token,
            max_redirects: settings.max_redirects,
        })
    }

    /// URL of the workflow run listing for a repository
    fn runs_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/repos/{}/{}/actions/runs",
            self.api_base, repo.owner, repo.repo
        )
    }

    /// Whether a request to `url` should carry the token
    fn should_authenticate(&self, url: &Url) -> bool {
        self.token.is_some() && url.host_str().is_some() && url.host_str() == self.api_host.as_deref()
    }

    fn request(&self, url: &Url) -> RequestBuilder {
        let mut builder = self
            .client
            .get(url.clone())
            .header(ACCEPT, ACCEPT_GITHUB_JSON);

        if self.should_authenticate(url) {
            if let Some(ref token) = self.token {
                builder = builder.header(AUTHORIZATION, format!("token {}", token));
            }
        }

        builder
    }

    /// GET `url`, following at most `max_redirects` redirects.
    ///
    /// Returns the first 2xx response. Any other final status is turned into
    /// [`DeployError::HttpStatus`] with the response body as detail.
    pub async fn fetch(&self, url: &str) -> Result<Response, DeployError> {
        let mut current = Url::parse(url).map_err(|e| DeployError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        for hop in 0..=self.max_redirects {
            let response = self.request(&current).send().await?;
            let status = response.status();
            debug!(url = %current, status = status.as_u16(), hop, "Response received");

            if status.is_success() {
                return Ok(response);
            }

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);

                let Some(location) = location else {
                    return Err(DeployError::HttpStatus {
                        url: current.to_string(),
                        status: status.as_u16(),
                        body: "redirect without Location header".to_string(),
                    });
                };

                let next = current.join(&location).map_err(|e| DeployError::Transport {
                    url: location.clone(),
                    message: e.to_string(),
                })?;
                debug!(from = %current, to = %next, "Following redirect");
                current = next;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::HttpStatus {
                url: current.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Err(DeployError::TooManyRedirects {
            url: url.to_string(),
            limit: self.max_redirects,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DeployError> {
        let response = self.fetch(url).await?;
        response.json::<T>().await.map_err(|e| DeployError::Transport {
            url: url.to_string(),
            message: format!("invalid JSON response: {}", e),
        })
    }

    /// Most recent workflow run of a repository
    pub async fn latest_run(&self, repo: &RepoRef) -> Result<WorkflowRun, DeployError> {
        let runs: WorkflowRunList = self.get_json(&self.runs_url(repo)).await?;

        runs.workflow_runs
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NotFound(format!("no workflow runs for {}", repo)))
    }

    /// Artifacts produced by a workflow run
    pub async fn list_artifacts(&self, run: &WorkflowRun) -> Result<RemoteArtifactList, DeployError> {
        self.get_json(&run.artifacts_url).await
    }
}

#[async_trait]
impl ArtifactSource for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    #[instrument(skip(self, wanted), fields(repo = %repo))]
    async fn resolve_artifacts(
        &self,
        repo: &RepoRef,
        wanted: &[BuildType],
    ) -> Result<Vec<ArtifactDescriptor>, DeployError> {
        let run = self.latest_run(repo).await?;
        info!(
            run_id = run.id,
            status = run.status.as_deref().unwrap_or("unknown"),
            conclusion = run.conclusion.as_deref().unwrap_or("none"),
            branch = run.head_branch.as_deref().unwrap_or("unknown"),
            "Using latest workflow run"
        );

        let artifacts = self.list_artifacts(&run).await?;
        let matched = artifacts.matching(wanted);
        debug!(
            available = artifacts.artifacts.len(),
            matched = matched.len(),
            "Matched artifacts"
        );

        Ok(matched)
    }

    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn download(&self, url: &str, dest: &Path) -> Result<StagedArchive, DeployError> {
        let mut response = self.fetch(url).await?;
        let mut staging = StagingFile::create(dest).await?;

        while let Some(chunk) = response.chunk().await? {
            staging.write_chunk(&chunk).await?;
        }

        staging.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_base: &str, token: Option<&str>) -> GitHubClient {
        let settings = ArtifactSettings {
            api_base: api_base.to_string(),
            ..Default::default()
        };
        GitHubClient::new(&settings, token.map(str::to_owned)).unwrap()
    }

    #[test]
    fn test_runs_url() {
        let client = client("https://api.github.com/", None);
        let repo = RepoRef::new("Transerve-PwC", "frontend").unwrap();
        assert_eq!(
            client.runs_url(&repo),
            "https://api.github.com/repos/Transerve-PwC/frontend/actions/runs"
        );
    }

    #[test]
    fn test_token_only_sent_to_api_host() {
        let client = client("https://api.github.com", Some("abc"));

        let api = Url::parse("https://api.github.com/repos/o/r/actions/artifacts/1/zip").unwrap();
        let blob = Url::parse("https://pipelines.actions.githubusercontent.com/x?sig=1").unwrap();
        assert!(client.should_authenticate(&api));
        assert!(!client.should_authenticate(&blob));
    }

    #[test]
    fn test_no_token_no_auth() {
        let client = client("https://api.github.com", None);
        let api = Url::parse("https://api.github.com/repos/o/r").unwrap();
        assert!(!client.should_authenticate(&api));
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let settings = ArtifactSettings {
            api_base: "not a url".to_string(),
            ..Default::default()
        };
        assert!(GitHubClient::new(&settings, None).is_err());
    }
}
