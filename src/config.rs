use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use url::Url;

use crate::Result;
use crate::error::ShareError;
use crate::utils;

pub const ENV_PROJECT: &str = "GCS_SHARE_PROJECT";
pub const ENV_CREDENTIALS: &str = "GCS_SHARE_CREDENTIALS";
pub const ENV_ENDPOINT: &str = "GCS_SHARE_ENDPOINT";
pub const ENV_GCLOUD: &str = "GCS_SHARE_GCLOUD";
pub const ENV_ADC: &str = "GOOGLE_APPLICATION_CREDENTIALS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Project used for bucket creation and listing. Falls back to the credentials' project.
    pub project: Option<String>,
    /// Service account key used instead of application default credentials.
    pub credentials_file: Option<PathBuf>,
    /// Key file application default credentials will load, when set.
    pub adc_file: Option<PathBuf>,
    /// Overrides the Cloud Storage endpoint, e.g. for an emulator.
    pub endpoint: Option<String>,
    pub gcloud: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: None,
            credentials_file: None,
            adc_file: None,
            endpoint: None,
            gcloud: "gcloud".to_string(),
        }
    }
}

impl Config {
    /// Reads `.env` and the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            project: get(ENV_PROJECT),
            credentials_file: get(ENV_CREDENTIALS).map(|p| utils::expand_path(&p)),
            adc_file: get(ENV_ADC).map(PathBuf::from),
            endpoint: match get(ENV_ENDPOINT) {
                Some(endpoint) => Some(normalize_endpoint(&endpoint)?),
                None => defaults.endpoint,
            },
            gcloud: get(ENV_GCLOUD).unwrap_or(defaults.gcloud),
        })
    }

    pub fn with_project(mut self, project: Option<String>) -> Self {
        if let Some(project) = project.filter(|p| !p.is_empty()) {
            self.project = Some(project);
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Result<Self> {
        if let Some(endpoint) = endpoint {
            self.endpoint = Some(normalize_endpoint(&endpoint)?);
        }
        Ok(self)
    }
}

/// Adds a scheme when missing and drops trailing slashes.
fn normalize_endpoint(endpoint: &str) -> Result<String> {
    let base_url = if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
        format!("https://{}", endpoint)
    } else {
        endpoint.to_string()
    };
    let base_url = base_url.trim_end_matches('/').to_string();

    Url::parse(&base_url)
        .map_err(|e| ShareError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;
    Ok(base_url)
}
