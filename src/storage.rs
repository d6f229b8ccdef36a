use async_trait::async_trait;
use bytes::Bytes;
use google_cloud_gax::error::Error as GcsError;
use google_cloud_gax::error::rpc::Code;
use google_cloud_iam_v1::model as iam;
use google_cloud_storage::client::{Storage, StorageControl};
use google_cloud_storage::model;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;
use crate::auth::CredentialProvider;
use crate::error::ShareError;

pub const DEFAULT_LOCATION: &str = "US-EAST1";
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";
pub const PUBLIC_READ_ROLE: &str = "roles/storage.objectViewer";
pub const ALL_USERS: &str = "allUsers";

const IAM_POLICY_VERSION: i32 = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub location: String,
    pub storage_class: String,
    pub iam_configuration: Option<IamConfiguration>,
}

impl Bucket {
    fn from_model(bucket: model::Bucket) -> Self {
        // Full resource names look like `projects/_/buckets/{id}`.
        let name = if bucket.bucket_id.is_empty() {
            bucket
                .name
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        } else {
            bucket.bucket_id
        };
        Self {
            name,
            location: bucket.location,
            storage_class: bucket.storage_class,
            iam_configuration: bucket.iam_config.map(|config| IamConfiguration {
                uniform_bucket_level_access: config
                    .uniform_bucket_level_access
                    .map(|u| UniformBucketLevelAccess { enabled: u.enabled }),
            }),
        }
    }

    pub fn uniform_access_enabled(&self) -> bool {
        self.iam_configuration
            .as_ref()
            .and_then(|c| c.uniform_bucket_level_access.as_ref())
            .is_some_and(|u| u.enabled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IamConfiguration {
    pub uniform_bucket_level_access: Option<UniformBucketLevelAccess>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformBucketLevelAccess {
    pub enabled: bool,
}

/// A bucket IAM policy in its JSON shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub version: i32,
    pub bindings: Vec<Binding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binding {
    pub role: String,
    pub members: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<serde_json::Value>,
}

impl Policy {
    fn from_model(policy: iam::Policy) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::to_value(policy)?)?)
    }

    fn to_model(&self) -> Result<iam::Policy> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    pub fn grants(&self, role: &str, member: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == role && b.condition.is_none() && b.members.iter().any(|m| m == member))
    }

    /// Adds `member` to `role`. Returns false when the grant was already there.
    pub fn grant(&mut self, role: &str, member: &str) -> bool {
        if self.grants(role, member) {
            return false;
        }
        match self
            .bindings
            .iter_mut()
            .find(|b| b.role == role && b.condition.is_none())
        {
            Some(binding) => binding.members.push(member.to_string()),
            None => self.bindings.push(Binding {
                role: role.to_string(),
                members: vec![member.to_string()],
                condition: None,
            }),
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateBucket {
    Created(Bucket),
    /// The name is taken, by us or by someone else. Carries the service's message.
    AlreadyExists { message: String },
}

/// The remote calls the tools need, one session per tool invocation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `None` when the bucket does not exist or is not visible to the caller.
    async fn get_bucket(&self, bucket: &str) -> Result<Option<Bucket>>;

    async fn create_bucket(
        &self,
        bucket: &str,
        location: &str,
        storage_class: &str,
    ) -> Result<CreateBucket>;

    async fn enable_uniform_access(&self, bucket: &str) -> Result<()>;

    /// Writes the object, replacing any existing one under the same key.
    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()>;

    async fn get_iam_policy(&self, bucket: &str) -> Result<Policy>;

    async fn set_iam_policy(&self, bucket: &str, policy: &Policy) -> Result<()>;

    /// All buckets of the session's project, in the order the service returns them.
    async fn list_buckets(&self) -> Result<Vec<Bucket>>;
}

/// Builds a fresh session for each operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ObjectStore>>;
}

pub struct GcsConnector {
    endpoint: Option<String>,
    project: Option<String>,
    credentials: Arc<dyn CredentialProvider>,
}

impl GcsConnector {
    pub fn new(
        endpoint: Option<String>,
        project: Option<String>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            endpoint,
            project,
            credentials,
        }
    }
}

#[async_trait]
impl Connector for GcsConnector {
    async fn connect(&self) -> Result<Box<dyn ObjectStore>> {
        let session = self.credentials.session().await?;
        let project = self.project.clone().or(session.project_id);

        let mut storage_builder = Storage::builder();
        if let Some(endpoint) = &self.endpoint {
            storage_builder = storage_builder.with_endpoint(endpoint);
        }
        let storage = storage_builder
            .with_credentials(session.credentials.clone())
            .build()
            .await
            .map_err(|e| {
                ShareError::remote(None, "Failed to build the Cloud Storage client", e.to_string())
            })?;

        let mut control_builder = StorageControl::builder();
        if let Some(endpoint) = &self.endpoint {
            control_builder = control_builder.with_endpoint(endpoint);
        }
        let control = control_builder
            .with_credentials(session.credentials)
            .build()
            .await
            .map_err(|e| {
                ShareError::remote(
                    None,
                    "Failed to build the Cloud Storage control client",
                    e.to_string(),
                )
            })?;

        Ok(Box::new(GcsStore {
            storage,
            control,
            project,
        }))
    }
}

/// HTTP status equivalent of a service status code.
fn http_status(code: &Code) -> Option<u16> {
    let status = match code {
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => 400,
        Code::Unauthenticated => 401,
        Code::PermissionDenied => 403,
        Code::NotFound => 404,
        Code::AlreadyExists | Code::Aborted => 409,
        Code::ResourceExhausted => 429,
        Code::Cancelled => 499,
        Code::Unimplemented => 501,
        Code::Unavailable => 503,
        Code::DeadlineExceeded => 504,
        Code::Unknown | Code::Internal | Code::DataLoss => 500,
        _ => return None,
    };
    Some(status)
}

fn status_of(err: &GcsError) -> Option<u16> {
    err.http_status_code()
        .or_else(|| err.status().and_then(|s| http_status(&s.code)))
}

/// The service's own words, when it sent any.
fn message_of(err: &GcsError) -> String {
    match err.status() {
        Some(status) if !status.message.is_empty() => status.message.clone(),
        _ => err.to_string(),
    }
}

/// Maps a client error, keeping the provider's status and message.
fn classify(err: GcsError, context: String) -> ShareError {
    if err.is_authentication() {
        return ShareError::auth(format!("{}: {}", context, err));
    }
    match status_of(&err) {
        Some(401) | Some(403) => ShareError::auth(format!("{}: {}", context, message_of(&err))),
        status => ShareError::remote(status, context, message_of(&err)),
    }
}

fn lookup_outcome(
    bucket: &str,
    outcome: std::result::Result<model::Bucket, GcsError>,
) -> Result<Option<Bucket>> {
    match outcome {
        Ok(found) => Ok(Some(Bucket::from_model(found))),
        Err(err) => match status_of(&err) {
            // 403 here means the name exists but belongs to someone we cannot see.
            Some(404) | Some(403) => {
                debug!("Bucket {} is not visible: {}", bucket, message_of(&err));
                Ok(None)
            }
            _ => Err(classify(err, format!("Failed to look up bucket {}", bucket))),
        },
    }
}

fn create_outcome(
    bucket: &str,
    outcome: std::result::Result<model::Bucket, GcsError>,
) -> Result<CreateBucket> {
    match outcome {
        Ok(created) => Ok(CreateBucket::Created(Bucket::from_model(created))),
        Err(err) if status_of(&err) == Some(409) => Ok(CreateBucket::AlreadyExists {
            message: message_of(&err),
        }),
        Err(err) => Err(classify(err, format!("Failed to create bucket {}", bucket))),
    }
}

fn bucket_path(bucket: &str) -> String {
    format!("projects/_/buckets/{}", bucket)
}

/// Cloud Storage session: the object client plus the bucket/IAM control client.
pub struct GcsStore {
    storage: Storage,
    control: StorageControl,
    project: Option<String>,
}

impl GcsStore {
    fn project(&self) -> Result<&str> {
        self.project.as_deref().ok_or(ShareError::MissingProject)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn get_bucket(&self, bucket: &str) -> Result<Option<Bucket>> {
        let outcome = self
            .control
            .get_bucket()
            .set_name(bucket_path(bucket))
            .send()
            .await;
        lookup_outcome(bucket, outcome)
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        location: &str,
        storage_class: &str,
    ) -> Result<CreateBucket> {
        let project = self.project()?;
        let outcome = self
            .control
            .create_bucket()
            .set_parent("projects/_")
            .set_bucket_id(bucket)
            .set_bucket(
                model::Bucket::new()
                    .set_project(format!("projects/{}", project))
                    .set_location(location)
                    .set_storage_class(storage_class)
                    .set_iam_config(uniform_access()),
            )
            .send()
            .await;
        create_outcome(bucket, outcome)
    }

    async fn enable_uniform_access(&self, bucket: &str) -> Result<()> {
        self.control
            .update_bucket()
            .set_bucket(
                model::Bucket::new()
                    .set_name(bucket_path(bucket))
                    .set_iam_config(uniform_access()),
            )
            .set_update_mask(
                google_cloud_wkt::FieldMask::default()
                    .set_paths(["iam_config.uniform_bucket_level_access.enabled"]),
            )
            .send()
            .await
            .map_err(|e| {
                classify(
                    e,
                    format!("Failed to enable uniform bucket-level access on {}", bucket),
                )
            })?;
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        object: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.storage
            .write_object(bucket_path(bucket), object, body)
            .set_content_type(content_type)
            .send_buffered()
            .await
            .map_err(|e| classify(e, format!("Failed to upload gs://{}/{}", bucket, object)))?;
        Ok(())
    }

    async fn get_iam_policy(&self, bucket: &str) -> Result<Policy> {
        let policy = self
            .control
            .get_iam_policy()
            .set_resource(bucket_path(bucket))
            .set_options(
                iam::GetPolicyOptions::new().set_requested_policy_version(IAM_POLICY_VERSION),
            )
            .send()
            .await
            .map_err(|e| classify(e, format!("Failed to read the IAM policy of {}", bucket)))?;
        Policy::from_model(policy)
    }

    async fn set_iam_policy(&self, bucket: &str, policy: &Policy) -> Result<()> {
        let mut policy = policy.clone();
        policy.version = IAM_POLICY_VERSION;

        self.control
            .set_iam_policy()
            .set_resource(bucket_path(bucket))
            .set_policy(policy.to_model()?)
            .send()
            .await
            .map_err(|e| {
                classify(
                    e,
                    format!(
                        "Failed to grant public access on {} (public access may be blocked by organization policy)",
                        bucket
                    ),
                )
            })?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let project = self.project()?;
        let mut buckets = Vec::new();
        let mut page_token = String::new();

        loop {
            let page = self
                .control
                .list_buckets()
                .set_parent(format!("projects/{}", project))
                .set_page_token(page_token.clone())
                .send()
                .await
                .map_err(|e| classify(e, "Failed to list buckets".to_string()))?;

            buckets.extend(page.buckets.into_iter().map(Bucket::from_model));
            if page.next_page_token.is_empty() {
                break;
            }
            page_token = page.next_page_token;
        }

        info!("Listed {} bucket(s) in project {}", buckets.len(), project);
        Ok(buckets)
    }
}

fn uniform_access() -> model::bucket::IamConfig {
    model::bucket::IamConfig::new().set_uniform_bucket_level_access(
        model::bucket::iam_config::UniformBucketLevelAccess::new().set_enabled(true),
    )
}
