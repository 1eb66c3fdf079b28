//! Error taxonomy for deployments.
//!
//! Filesystem housekeeping errors are produced here like any other error, but
//! the replace orchestrator swallows them; only transport, extraction and
//! process failures end a deployment.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while fetching, staging, replacing or running deployments
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Request to {url} returned HTTP {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Gave up on {url} after {limit} redirects")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not expand {}: {message}", archive.display())]
    Extraction { archive: PathBuf, message: String },

    #[error("Command `{command}` exited with code {code}: {stderr}")]
    Process {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Deployment queue is full")]
    QueueFull,

    #[error("Deployment queue is closed")]
    QueueClosed,
}

/// Coarse error classes used for logging and history records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    NotFound,
    Filesystem,
    Extraction,
    Process,
    Rejected,
}

impl DeployError {
    /// Wrap an I/O error with the path it happened on
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Which class of the taxonomy this error belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::TooManyRedirects { .. } => {
                ErrorKind::Transport
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Process { .. } => ErrorKind::Process,
            Self::InvalidIdentifier(_) | Self::QueueFull | Self::QueueClosed => {
                ErrorKind::Rejected
            }
        }
    }
}

impl From<reqwest::Error> for DeployError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            message: e.to_string(),
        }
    }
}
