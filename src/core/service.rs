//! Build-service driver.
//!
//! Redeploys a script-managed backend service: optional `git pull`, a
//! best-effort shutdown, an optional rebuild, then startup. Each stage is an
//! external command run in the build run directory; only shutdown may fail
//! without stopping the sequence.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::adapters::{CommandSpec, ProcessRunner};
use crate::config::ScriptSettings;
use crate::domain::{validate_identifier, ServiceDeployRequest};
use crate::error::DeployError;

pub struct ServiceDriver {
    runner: Arc<dyn ProcessRunner>,
    scripts: ScriptSettings,
    repositories_root: PathBuf,
    build_run_dir: PathBuf,
}

impl ServiceDriver {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        scripts: ScriptSettings,
        repositories_root: PathBuf,
        build_run_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            scripts,
            repositories_root,
            build_run_dir,
        }
    }

    fn module_dir(&self, module: &str) -> PathBuf {
        self.repositories_root.join(module)
    }

    pub fn pull_command(&self, request: &ServiceDeployRequest) -> CommandSpec {
        CommandSpec::new("git", self.module_dir(&request.module)).arg("pull")
    }

    pub fn shutdown_command(&self, request: &ServiceDeployRequest) -> CommandSpec {
        CommandSpec::new(&self.scripts.shell, &self.build_run_dir)
            .arg(&self.scripts.shutdown)
            .arg(&request.service)
    }

    pub fn build_command(&self, request: &ServiceDeployRequest) -> CommandSpec {
        CommandSpec::new(&self.scripts.shell, &self.build_run_dir)
            .arg(&self.scripts.build)
            .arg(self.module_dir(&request.module).to_string_lossy())
            .arg(&request.service)
    }

    pub fn startup_command(&self, request: &ServiceDeployRequest) -> CommandSpec {
        CommandSpec::new(&self.scripts.shell, &self.build_run_dir)
            .arg(&self.scripts.startup)
            .arg(self.scripts.artifact_glob_for(&request.service))
            .arg(&request.service)
    }

    #[instrument(skip(self, request), fields(module = %request.module, service = %request.service))]
    pub async fn deploy(&self, request: &ServiceDeployRequest) -> Result<(), DeployError> {
        validate_identifier(&request.module)?;
        validate_identifier(&request.service)?;

        if request.git_pull {
            info!("Pulling source");
            self.runner.run(&self.pull_command(request)).await?;
        } else {
            debug!("Skipping git pull");
        }

        info!("Shutting down service");
        if let Err(e) = self.runner.run(&self.shutdown_command(request)).await {
            error!(error = %e, "Shutdown failed, continuing");
        }

        if request.build {
            info!("Building service");
            self.runner.run(&self.build_command(request)).await?;
        } else {
            debug!("Skipping build");
        }

        info!("Starting service");
        self.runner.run(&self.startup_command(request)).await?;

        info!("Service deployed");
        Ok(())
    }
}
