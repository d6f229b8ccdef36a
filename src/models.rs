use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::ShareError;
use crate::storage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishRequest {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
}

impl PublishRequest {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn bucket(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = Some(bucket_name.into());
        self
    }

    pub fn destination(mut self, destination_name: impl Into<String>) -> Self {
        self.destination_name = Some(destination_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    pub bucket_name: String,
    pub object_name: String,
    pub public_url: String,
    pub created_bucket: bool,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthAction {
    InstallGcloud,
    RunAdcLogin,
    RunLogin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_required: Option<AuthAction>,
    #[serde(default)]
    pub remediation_steps: Vec<String>,
}

impl AuthStatus {
    pub fn authenticated(account: Option<String>, project_id: Option<String>) -> Self {
        let message = match &project_id {
            Some(project) => format!("Authenticated with Google Cloud. Project: {}", project),
            None => "Authenticated with Google Cloud. No default project is set.".to_string(),
        };
        Self {
            authenticated: true,
            account_identity: account,
            project_id,
            message,
            action_required: None,
            remediation_steps: Vec::new(),
        }
    }

    pub fn gcloud_missing() -> Self {
        let mut remediation_steps = vec![format!("Install the Google Cloud SDK: {}", auth::INSTALL_URL)];
        remediation_steps.extend(auth::remediation_steps());
        Self {
            authenticated: false,
            account_identity: None,
            project_id: None,
            message: format!(
                "Google Cloud SDK (gcloud) is not installed. Please install it from: {}",
                auth::INSTALL_URL
            ),
            action_required: Some(AuthAction::InstallGcloud),
            remediation_steps,
        }
    }

    /// Logged into gcloud, but application default credentials are missing.
    pub fn adc_missing(account: String) -> Self {
        Self {
            message: format!(
                "You are logged into gcloud as {}, but application default credentials are not configured. Please run:\n  {}",
                account,
                auth::ADC_LOGIN_COMMAND
            ),
            account_identity: Some(account),
            project_id: None,
            authenticated: false,
            action_required: Some(AuthAction::RunAdcLogin),
            remediation_steps: auth::remediation_steps(),
        }
    }

    pub fn logged_out() -> Self {
        Self {
            authenticated: false,
            account_identity: None,
            project_id: None,
            message: format!(
                "You are not authenticated with Google Cloud. Please run:\n  {}\nThis will open a browser for SSO authentication.\n\nAfter logging in, also run:\n  {}\nto set up application credentials.",
                auth::LOGIN_COMMAND,
                auth::ADC_LOGIN_COMMAND
            ),
            action_required: Some(AuthAction::RunLogin),
            remediation_steps: auth::remediation_steps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub name: String,
    pub location: String,
    pub storage_class: String,
}

impl From<storage::Bucket> for BucketSummary {
    fn from(bucket: storage::Bucket) -> Self {
        Self {
            name: bucket.name,
            location: bucket.location,
            storage_class: bucket.storage_class,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketListing {
    pub buckets: Vec<BucketSummary>,
    pub message: String,
}

impl From<Vec<BucketSummary>> for BucketListing {
    fn from(buckets: Vec<BucketSummary>) -> Self {
        let message = format!("Found {} bucket(s)", buckets.len());
        Self { buckets, message }
    }
}

/// What a tool returns to the host when an operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDescriptor {
    pub success: bool,
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_input: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_auth: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_steps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&ShareError> for ErrorDescriptor {
    fn from(err: &ShareError) -> Self {
        let mut descriptor = Self {
            success: false,
            kind: err.kind(),
            message: err.to_string(),
            needs_input: None,
            needs_auth: None,
            remediation_steps: None,
            status: err.status(),
        };
        match err {
            ShareError::MissingBucketName => descriptor.needs_input = Some("bucket_name"),
            ShareError::Auth { remediation, .. } => {
                descriptor.needs_auth = Some(true);
                descriptor.remediation_steps = Some(remediation.clone());
            }
            _ => {}
        }
        descriptor
    }
}
