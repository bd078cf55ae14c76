use async_trait::async_trait;
use aws_sdk_s3 as s3;
use axum::body::Bytes;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};

use crate::models::ImageRef;

// --- Contract ---

/// StorageService
///
/// Where listing photos go. Handlers only see this trait, so router tests run against
/// `MockStorageService` while the server talks to S3.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup to provision
    /// the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    /// The public URL an object will be served from once uploaded under `key`.
    ///
    /// Deterministic, so a submission can be validated before anything is written.
    fn object_url(&self, key: &str) -> String;

    /// Uploads `body` under `key` and returns the stored image reference
    /// (`url` from `object_url`, `filename` = the key).
    async fn upload_object(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<ImageRef, String>;
}

// --- S3 ---

/// S3StorageClient
///
/// Uploads to any S3-compatible endpoint: MinIO locally, Supabase Storage in production.
/// Both only accept path-style addressing (`{endpoint}/{bucket}/{key}`).
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3StorageClient {
    /// new
    ///
    /// Builds the client from the storage settings in `AppConfig`. `public_url` is the base
    /// uploaded photos are served from; a trailing slash is ignored.
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        let client = s3::Client::from_conf(config);

        Self {
            client,
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// ensure_bucket_exists
    ///
    /// Calls the S3 CreateBucket API. An "already exists" answer is expected and ignored.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!("create_bucket({}) skipped: {:?}", self.bucket_name, e);
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, sanitize_key(key))
    }

    async fn upload_object(
        &self,
        key: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<ImageRef, String> {
        let key = sanitize_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        tracing::info!(bucket = %self.bucket_name, %key, "uploaded listing image");
        Ok(ImageRef {
            url: self.object_url(&key),
            filename: Some(key),
        })
    }
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from an object key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// --- Test double ---
/// MockStorageService
///
/// In-memory `StorageService`. Records every uploaded key so tests can assert that a
/// rejected submission never reached storage.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, uploads return a simulated failure.
    pub should_fail: bool,
    uploads: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Keys uploaded so far, in order.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .map(|uploads| uploads.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    fn object_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }

    async fn upload_object(
        &self,
        key: &str,
        _content_type: &str,
        _body: Bytes,
    ) -> Result<ImageRef, String> {
        if self.should_fail {
            return Err("mock storage: upload rejected".to_string());
        }

        let key = sanitize_key(key);
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(key.clone());
        }
        Ok(ImageRef {
            url: self.object_url(&key),
            filename: Some(key),
        })
    }
}

/// StorageState
///
/// Shared handle on the photo store, as held by `AppState`.
pub type StorageState = Arc<dyn StorageService>;
