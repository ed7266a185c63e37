use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the provisioning core.
///
/// Every variant is recoverable by re-running the action; none of them is
/// fatal to the calling process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Download of {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("{binary} not found in downloaded archive")]
    BinaryNotFoundInArchive { binary: String },

    #[error("Could not read downloaded archive {}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("Failed to extract {binary} to {}: {reason}", path.display())]
    ExtractionFailed {
        binary: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Automatic install is not supported on {os}/{arch}; install ffmpeg and put it in PATH")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("An install is already in progress")]
    InstallInProgress,

    #[error("Could not update settings: {0}")]
    Settings(String),
}

impl ProvisionError {
    pub(crate) fn download(url: &str, reason: impl ToString) -> Self {
        ProvisionError::DownloadFailed {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn extraction(binary: &str, path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ProvisionError::ExtractionFailed {
            binary: binary.to_string(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
