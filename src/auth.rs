use async_trait::async_trait;
use google_cloud_auth::credentials::{self, Credentials};
use log::{debug, info, warn};
use serde::Deserialize;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::Result;
use crate::error::ShareError;
use crate::models::AuthStatus;

pub const LOGIN_COMMAND: &str = "gcloud auth login";
pub const ADC_LOGIN_COMMAND: &str = "gcloud auth application-default login";
pub const INSTALL_URL: &str = "https://cloud.google.com/sdk/docs/install";

const ADC_FILE: &str = "application_default_credentials.json";
const GCLOUD_TIMEOUT: Duration = Duration::from_secs(10);

/// The two commands every "please authenticate" response must carry.
pub fn remediation_steps() -> Vec<String> {
    vec![LOGIN_COMMAND.to_string(), ADC_LOGIN_COMMAND.to_string()]
}

/// Where `gcloud auth application-default login` writes its credentials.
pub fn well_known_adc_file() -> Option<PathBuf> {
    if cfg!(windows) {
        env::var_os("APPDATA").map(|dir| PathBuf::from(dir).join("gcloud").join(ADC_FILE))
    } else {
        home::home_dir().map(|home| home.join(".config").join("gcloud").join(ADC_FILE))
    }
}

/// Credentials for one client session plus the project they point at.
#[derive(Clone)]
pub struct Session {
    pub credentials: Credentials,
    pub project_id: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Reports whether usable credentials exist. Never fails for "logged out".
    async fn status(&self) -> Result<AuthStatus>;

    /// Builds credentials for a new session, or `ShareError::Auth` when there are none.
    async fn session(&self) -> Result<Session>;
}

/// The fields of a credentials file this crate reads.
#[derive(Debug, Clone, Default, Deserialize)]
struct KeyFile {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    quota_project_id: Option<String>,
}

async fn read_key_file(path: &Path) -> Result<(KeyFile, serde_json::Value)> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        ShareError::Credentials(format!(
            "failed to read credentials file '{}': {}",
            path.display(),
            e
        ))
    })?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        ShareError::Credentials(format!("invalid credentials JSON in '{}': {}", path.display(), e))
    })?;
    let key = serde_json::from_value(value.clone()).map_err(|e| {
        ShareError::Credentials(format!("invalid credentials JSON in '{}': {}", path.display(), e))
    })?;
    Ok((key, value))
}

/// A service account key file named in the configuration.
#[derive(Debug, Clone)]
pub struct ServiceAccountKey {
    path: PathBuf,
    project_override: Option<String>,
}

impl ServiceAccountKey {
    pub fn new(path: impl Into<PathBuf>, project_override: Option<String>) -> Self {
        Self {
            path: path.into(),
            project_override,
        }
    }

    async fn load(&self) -> Result<(KeyFile, serde_json::Value)> {
        let (key, value) = read_key_file(&self.path).await?;
        if key.kind != "service_account" {
            return Err(ShareError::Credentials(format!(
                "'{}' is not a service account key (type: {})",
                self.path.display(),
                key.kind
            )));
        }
        Ok((key, value))
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountKey {
    async fn status(&self) -> Result<AuthStatus> {
        let (key, _) = self.load().await?;
        Ok(AuthStatus::authenticated(
            key.client_email,
            self.project_override.clone().or(key.project_id),
        ))
    }

    async fn session(&self) -> Result<Session> {
        let (key, value) = self.load().await?;
        info!("Loading Google Cloud credentials from service account file");
        let credentials = credentials::service_account::Builder::new(value)
            .build()
            .map_err(|e| {
                ShareError::auth(format!("Failed to build service account credentials: {}", e))
            })?;
        Ok(Session {
            credentials,
            project_id: self.project_override.clone().or(key.project_id),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum GcloudOutput {
    Output(String),
    Failed,
    Missing,
}

/// Read-only queries against the `gcloud` CLI.
#[derive(Debug, Clone)]
pub struct Gcloud {
    program: String,
}

impl Gcloud {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<GcloudOutput> {
        debug!("Running {} {}", self.program, args.join(" "));
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(GCLOUD_TIMEOUT, child).await {
            Err(_) => {
                warn!("{} {} timed out", self.program, args.join(" "));
                return Ok(GcloudOutput::Failed);
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => return Ok(GcloudOutput::Missing),
            Ok(Err(e)) => {
                return Err(ShareError::Credentials(format!(
                    "failed to run {}: {}",
                    self.program, e
                )));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            debug!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(GcloudOutput::Failed);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if stdout.is_empty() || stdout == "(unset)" {
            Ok(GcloudOutput::Failed)
        } else {
            Ok(GcloudOutput::Output(stdout))
        }
    }

    pub async fn installed(&self) -> Result<bool> {
        Ok(matches!(self.run(&["--version"]).await?, GcloudOutput::Output(_)))
    }

    /// `gcloud config get-value <key>`, `None` when unset or gcloud is absent.
    pub async fn config_value(&self, key: &str) -> Result<Option<String>> {
        match self.run(&["config", "get-value", key]).await? {
            GcloudOutput::Output(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }
}

/// Application default credentials: `GOOGLE_APPLICATION_CREDENTIALS`, the
/// gcloud ADC file, or the metadata server. `gcloud` is only consulted for
/// the active account, the default project and the remediation path.
#[derive(Debug, Clone)]
pub struct ApplicationDefault {
    gcloud: Gcloud,
    project_override: Option<String>,
    key_file: Option<PathBuf>,
    well_known: Option<PathBuf>,
}

impl ApplicationDefault {
    pub fn new(
        gcloud: impl Into<String>,
        project_override: Option<String>,
        key_file: Option<PathBuf>,
    ) -> Self {
        Self {
            gcloud: Gcloud::new(gcloud),
            project_override,
            key_file,
            well_known: well_known_adc_file(),
        }
    }

    pub fn with_well_known(mut self, path: Option<PathBuf>) -> Self {
        self.well_known = path;
        self
    }

    /// The credentials file ADC would pick, if any.
    async fn adc_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.key_file {
            return Some(path.clone());
        }
        let path = self.well_known.as_ref()?;
        match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => Some(path.clone()),
            _ => None,
        }
    }

    async fn project(&self, key: Option<&KeyFile>) -> Result<Option<String>> {
        if let Some(project) = &self.project_override {
            return Ok(Some(project.clone()));
        }
        if let Some(project) = key.and_then(|k| k.project_id.clone()) {
            return Ok(Some(project));
        }
        if let Some(project) = self.gcloud.config_value("project").await? {
            return Ok(Some(project));
        }
        Ok(key.and_then(|k| k.quota_project_id.clone()))
    }
}

#[async_trait]
impl CredentialProvider for ApplicationDefault {
    async fn status(&self) -> Result<AuthStatus> {
        if let Some(path) = self.adc_file().await {
            let (key, _) = read_key_file(&path).await?;
            let account = match key.client_email.clone() {
                Some(email) => Some(email),
                None => self.gcloud.config_value("account").await?,
            };
            let project = self.project(Some(&key)).await?;
            return Ok(AuthStatus::authenticated(account, project));
        }

        if !self.gcloud.installed().await? {
            return Ok(AuthStatus::gcloud_missing());
        }
        Ok(match self.gcloud.config_value("account").await? {
            Some(account) => AuthStatus::adc_missing(account),
            None => AuthStatus::logged_out(),
        })
    }

    async fn session(&self) -> Result<Session> {
        let key = match self.adc_file().await {
            Some(path) => Some(read_key_file(&path).await?.0),
            None => None,
        };
        info!("Using Application Default Credentials for Google Cloud");
        let credentials = credentials::Builder::default().build().map_err(|e| {
            ShareError::auth(format!("No valid Google Cloud credentials found: {}", e))
        })?;
        Ok(Session {
            credentials,
            project_id: self.project(key.as_ref()).await?,
        })
    }
}
