//! Command-line interface for deployhook.
//!
//! Provides commands for serving the webhook receiver, running deployments in
//! the foreground, signing test payloads, and inspecting history and config.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::adapters::{GitHubClient, TokioProcessRunner};
use crate::config::{load_config, ConfigOverrides, ResolvedConfig};
use crate::core::{
    spawn_worker, BuildLocks, BuildTypeResult, DeployDispatcher, DeployHistory, DeployQueue,
    DeploymentDriver, ServiceDriver,
};
use crate::domain::{ArtifactDeployRequest, BuildType, JobState, RepoRef, ServiceDeployRequest};
use crate::server::{self, signature, AppState};

/// deployhook - Webhook-driven deployment dispatcher
#[derive(Parser, Debug)]
#[command(name = "deployhook")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by every command; flags win over environment variables
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Config file (default: search for .deployhook/config.yaml)
    #[arg(long, global = true, env = "DEPLOYHOOK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Access token for the artifact API
    #[arg(long, global = true, env = "OAUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Shared secret for webhook signatures
    #[arg(long, global = true, env = "WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// Directory holding service source checkouts
    #[arg(long, global = true, env = "REPOSITORIES_ROOT")]
    pub repositories_root: Option<PathBuf>,

    /// Working directory of the lifecycle scripts
    #[arg(long, global = true, env = "BUILD_RUN_DIR")]
    pub build_run_dir: Option<PathBuf>,

    /// Directory holding deployed build types
    #[arg(long, global = true, env = "DEPLOY_ROOT")]
    pub deploy_root: Option<PathBuf>,

    /// Address to bind to
    #[arg(long, global = true, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, global = true, env = "PORT")]
    pub port: Option<u16>,
}

impl GlobalArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            token: self.token.clone(),
            webhook_secret: self.webhook_secret.clone(),
            repositories_root: self.repositories_root.clone(),
            build_run_dir: self.build_run_dir.clone(),
            deploy_root: self.deploy_root.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the webhook receiver and deployment worker
    Serve,

    /// Deploy the latest CI artifacts of a repository in the foreground
    Deploy {
        /// Repository owner
        owner: String,

        /// Repository name
        repo: String,

        /// Build types to deploy (default: default_build_types from config)
        build_types: Vec<String>,

        /// Skip the settle delay before listing artifacts
        #[arg(long)]
        no_wait: bool,
    },

    /// Redeploy a script-managed service in the foreground
    Service {
        /// Module directory under the repositories root
        module: String,

        /// Service name passed to the scripts
        service: String,

        /// Run git pull first
        #[arg(long)]
        pull: bool,

        /// Run the build script before startup
        #[arg(long)]
        build: bool,
    },

    /// Print the X-Hub-Signature value for a request body
    Sign {
        /// Body file (reads from stdin if not provided)
        file: Option<PathBuf>,
    },

    /// List recent deployment jobs
    History {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (credentials redacted)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = load_config(&self.global.overrides())?;

        match self.command {
            Commands::Serve => serve(config).await,
            Commands::Deploy {
                owner,
                repo,
                build_types,
                no_wait,
            } => deploy(&config, &owner, &repo, &build_types, no_wait).await,
            Commands::Service {
                module,
                service,
                pull,
                build,
            } => {
                let request = ServiceDeployRequest {
                    module,
                    service,
                    git_pull: pull,
                    build,
                };
                service_driver(&config).deploy(&request).await?;
                println!("Service {}/{} started", request.module, request.service);
                Ok(())
            }
            Commands::Sign { file } => sign_body(&config, file),
            Commands::History { limit } => show_history(&config, limit).await,
            Commands::Config => show_config(&config),
        }
    }
}

fn artifact_driver(config: &ResolvedConfig, locks: Arc<BuildLocks>) -> Result<DeploymentDriver> {
    let client = GitHubClient::new(&config.artifacts, config.token.clone())
        .context("Failed to create artifact API client")?;

    Ok(
        DeploymentDriver::new(Arc::new(client), locks, config.deploy_root.clone())
            .with_settle_delay(config.artifacts.settle_delay),
    )
}

fn service_driver(config: &ResolvedConfig) -> ServiceDriver {
    ServiceDriver::new(
        Arc::new(TokioProcessRunner),
        config.scripts.clone(),
        config.repositories_root.clone(),
        config.build_run_dir.clone(),
    )
}

async fn serve(config: ResolvedConfig) -> Result<()> {
    if config.webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET is not set; every webhook will be rejected");
    }
    if config.token.is_none() {
        warn!("OAUTH_TOKEN is not set; artifact API requests are unauthenticated");
    }

    let history = Arc::new(DeployHistory::new(config.history_path()));
    let dispatcher = DeployDispatcher::new(
        artifact_driver(&config, Arc::new(BuildLocks::new()))?,
        service_driver(&config),
    );

    let (queue, rx) = DeployQueue::new(config.queue_capacity, Some(Arc::clone(&history)));
    let worker = spawn_worker(rx, Arc::new(dispatcher), Some(history));

    let address = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    let state = Arc::new(AppState {
        queue,
        routes: config.routes.clone(),
        webhook_secret: config.webhook_secret.clone(),
    });
    server::serve(listener, state).await?;

    // The router (and with it the last queue sender) is gone; let the
    // current job finish.
    worker.await.context("Deployment worker panicked")?;
    Ok(())
}

async fn deploy(
    config: &ResolvedConfig,
    owner: &str,
    repo: &str,
    build_types: &[String],
    no_wait: bool,
) -> Result<()> {
    let repo = RepoRef::new(owner, repo)?;
    let build_types: Vec<BuildType> = if build_types.is_empty() {
        config.default_build_types.clone()
    } else {
        build_types
            .iter()
            .map(|bt| BuildType::new(bt.as_str()))
            .collect::<Result<_, _>>()?
    };
    if build_types.is_empty() {
        bail!("No build types given and no default_build_types configured");
    }

    let mut driver = artifact_driver(config, Arc::new(BuildLocks::new()))?;
    if no_wait {
        driver = driver.with_settle_delay(Duration::ZERO);
    }

    let summary = driver
        .deploy(&ArtifactDeployRequest { repo, build_types })
        .await?;

    println!("{:<20} {:<10} {}", "BUILD TYPE", "RESULT", "DETAIL");
    println!("{}", "-".repeat(75));
    for outcome in &summary.outcomes {
        let (result, detail) = match &outcome.result {
            BuildTypeResult::Deployed { archive, report } => (
                "deployed",
                format!(
                    "{} bytes, sha256 {}, {} step(s) swallowed",
                    archive.size_bytes,
                    archive.sha256,
                    report.swallowed_failures().len()
                ),
            ),
            BuildTypeResult::Skipped => ("skipped", "no artifact in latest run".to_string()),
            BuildTypeResult::Failed(e) => ("failed", e.to_string()),
        };
        println!("{:<20} {:<10} {}", outcome.build_type, result, detail);
    }

    let failed = summary.failed();
    if !failed.is_empty() {
        bail!("Deployment failed for: {}", failed.join(", "));
    }
    Ok(())
}

fn sign_body(config: &ResolvedConfig, file: Option<PathBuf>) -> Result<()> {
    let Some(secret) = &config.webhook_secret else {
        bail!("WEBHOOK_SECRET is not set");
    };

    let body = match file {
        Some(path) => std::fs::read(&path)
            .with_context(|| format!("Failed to read body: {}", path.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read body from stdin")?;
            buf
        }
    };

    let header = signature::sign(secret.as_bytes(), &body)
        .map_err(|e| anyhow!("Failed to sign body: {}", e))?;
    println!("{}", header);
    Ok(())
}

async fn show_history(config: &ResolvedConfig, limit: usize) -> Result<()> {
    let history = DeployHistory::new(config.history_path());
    let jobs = history.recent(limit).await?;

    if jobs.is_empty() {
        println!("No deployments recorded");
        return Ok(());
    }

    println!(
        "{:<38} {:<10} {:<20} {:<20} {:>10}  {}",
        "JOB ID", "STATE", "QUEUED", "FINISHED", "DURATION", "SUMMARY"
    );
    println!("{}", "-".repeat(120));

    for job in jobs {
        let duration = job
            .duration_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let finished = job
            .finished_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<10} {:<20} {:<20} {:>10}  {}",
            job.id,
            job.state.label(),
            job.queued_at.format("%Y-%m-%d %H:%M:%S"),
            finished,
            duration,
            job.summary
        );
        if let JobState::Failed { error } = &job.state {
            println!("{:<38} error: {}", "", error);
        }
    }

    Ok(())
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(&config.redacted()).context("Failed to render config")?;
    print!("{}", yaml);
    Ok(())
}
