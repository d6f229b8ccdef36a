use bytes::Bytes;
use log::{info, warn};
use std::io;
use std::sync::Arc;

use crate::Result;
use crate::auth::{ApplicationDefault, CredentialProvider, ServiceAccountKey};
use crate::config::Config;
use crate::error::ShareError;
use crate::models::{AuthStatus, BucketSummary, PublishRequest, PublishResult};
use crate::storage::{
    ALL_USERS, Bucket, Connector, CreateBucket, DEFAULT_LOCATION, DEFAULT_STORAGE_CLASS,
    GcsConnector, ObjectStore, PUBLIC_READ_ROLE,
};
use crate::utils;

/// Runs the three tools. Holds no remote state between calls.
#[derive(Clone)]
pub struct ShareManager {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
}

/// A local file read into memory, ready for upload.
struct LocalFile {
    object_name: String,
    content_type: String,
    body: Bytes,
}

impl ShareManager {
    pub fn new(connector: Arc<dyn Connector>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            connector,
            credentials,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let credentials: Arc<dyn CredentialProvider> = match &config.credentials_file {
            Some(path) => Arc::new(ServiceAccountKey::new(path, config.project.clone())),
            None => Arc::new(ApplicationDefault::new(
                config.gcloud.clone(),
                config.project.clone(),
                config.adc_file.clone(),
            )),
        };
        let connector = Arc::new(GcsConnector::new(
            config.endpoint.clone(),
            config.project.clone(),
            credentials.clone(),
        ));
        Self::new(connector, credentials)
    }

    /// Uploads a local file and makes it readable by anyone with the link.
    ///
    /// Local inputs are checked before a session is opened, so a bad path or
    /// bucket name never reaches the remote service. The remote steps are not
    /// atomic: a bucket created here stays even if the upload then fails.
    pub async fn share_file_public(&self, request: &PublishRequest) -> Result<PublishResult> {
        let file = read_local_file(request).await?;

        let bucket_name = match request.bucket_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(ShareError::MissingBucketName),
        };
        utils::validate_bucket_name(bucket_name).map_err(ShareError::InvalidBucketName)?;

        let store = self.connector.connect().await?;

        let (bucket, created_bucket) = ensure_bucket(store.as_ref(), bucket_name).await?;
        if created_bucket {
            info!("Created new bucket: {}", bucket_name);
        }

        let size = file.body.len() as u64;
        store
            .upload_object(bucket_name, &file.object_name, file.body, &file.content_type)
            .await?;
        info!(
            "Uploaded {} ({}) to gs://{}/{}",
            request.file_path,
            utils::format_file_size(size),
            bucket_name,
            file.object_name
        );

        make_public(store.as_ref(), &bucket).await?;

        Ok(PublishResult {
            bucket_name: bucket_name.to_string(),
            public_url: utils::public_url(bucket_name, &file.object_name),
            object_name: file.object_name,
            created_bucket,
            content_type: file.content_type,
            size,
        })
    }

    /// Reports credential status. "Not logged in" is a normal answer.
    pub async fn check_auth(&self) -> Result<AuthStatus> {
        self.credentials.status().await
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>> {
        let store = self.connector.connect().await?;
        let buckets = store.list_buckets().await?;
        Ok(buckets.into_iter().map(BucketSummary::from).collect())
    }
}

async fn read_local_file(request: &PublishRequest) -> Result<LocalFile> {
    let path = utils::expand_path(&request.file_path);

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ShareError::local_file(
                &path,
                format!("File not found: {}", request.file_path),
            ));
        }
        Err(e) => {
            return Err(ShareError::local_file(
                &path,
                format!("Cannot access {}: {}", request.file_path, e),
            ));
        }
    };
    if !metadata.is_file() {
        return Err(ShareError::local_file(
            &path,
            format!("Path is not a file: {}", request.file_path),
        ));
    }

    // Resolves `..` and symlinks so the default object name is the real file name.
    let path = tokio::fs::canonicalize(&path).await.map_err(|e| {
        ShareError::local_file(&path, format!("Cannot resolve {}: {}", request.file_path, e))
    })?;

    let object_name = match request.destination_name.as_deref() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => utils::default_object_name(&path).ok_or_else(|| {
            ShareError::local_file(&path, format!("Cannot derive an object name from {}", request.file_path))
        })?,
    };

    let body = tokio::fs::read(&path).await.map_err(|e| {
        ShareError::local_file(&path, format!("Failed to read {}: {}", request.file_path, e))
    })?;

    Ok(LocalFile {
        object_name,
        content_type: utils::content_type(&path),
        body: Bytes::from(body),
    })
}

/// Returns the bucket and whether this call created it.
async fn ensure_bucket(store: &dyn ObjectStore, name: &str) -> Result<(Bucket, bool)> {
    if let Some(bucket) = store.get_bucket(name).await? {
        info!("Bucket {} already exists", name);
        return Ok((bucket, false));
    }

    match store
        .create_bucket(name, DEFAULT_LOCATION, DEFAULT_STORAGE_CLASS)
        .await?
    {
        CreateBucket::Created(bucket) => {
            info!("Created bucket {} in {}", name, DEFAULT_LOCATION);
            Ok((bucket, true))
        }
        // Lost a race with another creator, or the name belongs to someone else.
        CreateBucket::AlreadyExists { message } => match store.get_bucket(name).await? {
            Some(bucket) => {
                warn!("Bucket {} already exists (conflict)", name);
                Ok((bucket, false))
            }
            None => Err(ShareError::remote(
                Some(409),
                format!("Failed to create bucket {}", name),
                message,
            )),
        },
    }
}

/// Grants `allUsers` read access through the bucket IAM policy.
async fn make_public(store: &dyn ObjectStore, bucket: &Bucket) -> Result<()> {
    if !bucket.uniform_access_enabled() {
        store.enable_uniform_access(&bucket.name).await?;
        info!("Enabled uniform bucket-level access for {}", bucket.name);
    }

    let mut policy = store.get_iam_policy(&bucket.name).await?;
    if policy.grant(PUBLIC_READ_ROLE, ALL_USERS) {
        store.set_iam_policy(&bucket.name, &policy).await?;
        info!("Made bucket {} publicly readable", bucket.name);
    }
    Ok(())
}
