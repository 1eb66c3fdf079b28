//! Build types and the filesystem layout derived from them.
//!
//! Every path a deployment touches is derived by convention from the build
//! type name, relative to the deploy root:
//!
//! | Path | Role |
//! |------|------|
//! | `{bt}-build.zip` | staging file for a fresh download |
//! | `{bt}/build` | live target directory |
//! | `{bt}/{bt}.zip` | canonical archive |
//! | `{bt}/{bt}.zip.bak` | backup archive |
//! | `{bt}.lock` | advisory lock held during a deployment |

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// Check that an identifier is safe to use in a URL segment and a file name
pub fn validate_identifier(value: &str) -> Result<(), DeployError> {
    let well_formed = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if well_formed {
        Ok(())
    } else {
        Err(DeployError::InvalidIdentifier(value.to_string()))
    }
}

/// A deployable artifact category, e.g. "citizen" or "employee"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildType(String);

impl BuildType {
    pub fn new(name: impl Into<String>) -> Result<Self, DeployError> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BuildType {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BuildType> for String {
    fn from(bt: BuildType) -> Self {
        bt.0
    }
}

impl std::str::FromStr for BuildType {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A repository on the CI provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Result<Self, DeployError> {
        let owner = owner.into();
        let repo = repo.into();
        validate_identifier(&owner)?;
        validate_identifier(&repo)?;
        Ok(Self { owner, repo })
    }

    /// `owner/repo`, the form webhook payloads use
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// All paths involved in deploying one build type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub build_type: BuildType,
    /// Freshly downloaded archive waiting to be promoted
    pub staged_archive: PathBuf,
    /// Directory serving the expanded archive
    pub target_dir: PathBuf,
    /// Archive of the previous deployment
    pub backup_archive: PathBuf,
    /// Archive of the current deployment
    pub canonical_archive: PathBuf,
    pub lock_file: PathBuf,
}

impl DeploymentTarget {
    pub fn new(root: &Path, build_type: &BuildType) -> Self {
        let bt = build_type.as_str();
        let bt_dir = root.join(bt);

        Self {
            build_type: build_type.clone(),
            staged_archive: root.join(format!("{}-build.zip", bt)),
            target_dir: bt_dir.join("build"),
            backup_archive: bt_dir.join(format!("{}.zip.bak", bt)),
            canonical_archive: bt_dir.join(format!("{}.zip", bt)),
            lock_file: root.join(format!("{}.lock", bt)),
        }
    }
}
