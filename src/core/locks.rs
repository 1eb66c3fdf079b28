//! Per-build-type mutual exclusion.
//!
//! Two deployments of the same build type share a staging path, so they must
//! not overlap. Inside one process an async mutex per build type orders them;
//! across processes (the server and a CLI `deploy`) an advisory lock on
//! `{bt}.lock` does. Different build types never wait on each other.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::sync::{Arc, Mutex, PoisonError};

use fs2::FileExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::{BuildType, DeploymentTarget};
use crate::error::DeployError;

/// Held for the duration of one build type's deployment
pub struct BuildGuard {
    _local: OwnedMutexGuard<()>,
    file: File,
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Registry of per-build-type locks
#[derive(Default)]
pub struct BuildLocks {
    local: Mutex<HashMap<BuildType, Arc<AsyncMutex<()>>>>,
}

impl BuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn local_mutex(&self, build_type: &BuildType) -> Arc<AsyncMutex<()>> {
        let mut map = self.local.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(build_type.clone()).or_default())
    }

    /// Wait until no one else is deploying `target`'s build type
    pub async fn acquire(&self, target: &DeploymentTarget) -> Result<BuildGuard, DeployError> {
        let local = self.local_mutex(&target.build_type).lock_owned().await;

        let lock_path = target.lock_file.clone();
        let file = tokio::task::spawn_blocking(move || -> Result<File, DeployError> {
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| DeployError::fs(parent, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .map_err(|e| DeployError::fs(&lock_path, e))?;
            file.lock_exclusive()
                .map_err(|e| DeployError::fs(&lock_path, e))?;
            Ok(file)
        })
        .await
        .map_err(|e| {
            DeployError::fs(
                &target.lock_file,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })??;

        debug!(build_type = %target.build_type, "Build lock acquired");
        Ok(BuildGuard {
            _local: local,
            file,
        })
    }
}
