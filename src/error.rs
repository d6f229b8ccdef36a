use std::path::PathBuf;
use thiserror::Error;

use crate::auth;

#[derive(Error, Debug)]
pub enum ShareError {
    /// The input file is missing or unreadable. Raised before any remote call.
    #[error("{message}")]
    LocalFile { path: PathBuf, message: String },
    #[error("Bucket name is required. Please ask the user for a Google Cloud Storage bucket name.")]
    MissingBucketName,
    #[error("Invalid bucket name: {0}")]
    InvalidBucketName(String),
    /// Credentials are absent, invalid or lack permission.
    #[error("{message}")]
    Auth {
        message: String,
        remediation: Vec<String>,
    },
    #[error(
        "No Google Cloud project is configured. Run `gcloud config set project <PROJECT_ID>` or set GCS_SHARE_PROJECT."
    )]
    MissingProject,
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// The credential subsystem itself could not be queried.
    #[error("Credential provider failed: {0}")]
    Credentials(String),
    #[error("{context}: {message}")]
    Remote {
        status: Option<u16>,
        context: String,
        message: String,
    },
}

impl ShareError {
    pub fn local_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ShareError::LocalFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Builds an auth failure carrying the standard login commands.
    pub fn auth(message: impl Into<String>) -> Self {
        ShareError::Auth {
            message: message.into(),
            remediation: auth::remediation_steps(),
        }
    }

    pub fn remote(status: Option<u16>, context: impl Into<String>, message: impl Into<String>) -> Self {
        ShareError::Remote {
            status,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ShareError::Auth { .. })
    }

    /// Stable tag used in tool error descriptors.
    pub fn kind(&self) -> &'static str {
        match self {
            ShareError::LocalFile { .. } => "local_file",
            ShareError::MissingBucketName => "missing_bucket_name",
            ShareError::InvalidBucketName(_) => "invalid_bucket_name",
            ShareError::Auth { .. } => "auth",
            ShareError::MissingProject => "missing_project",
            ShareError::Config(_) => "config",
            ShareError::Credentials(_) => "credentials",
            ShareError::Remote { .. } => "remote",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ShareError::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ShareError {
    fn from(err: serde_json::Error) -> Self {
        ShareError::remote(None, "Unexpected response from Cloud Storage", err.to_string())
    }
}
