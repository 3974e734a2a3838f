use async_trait::async_trait;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use std::time::Duration;
use uuid::Uuid;

use crate::config::{AppConfig, StoreKind};
use crate::error::TryOnError;
use crate::models::tryon::UploadedImage;

/// Upper bound on each HEAD check of an uploaded object.
const URL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Key prefix for uploaded source images.
const KEY_PREFIX: &str = "tryon";

/// How a source image is handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Inline { base64: String, content_type: String },
    Url(String),
}

impl ImageRef {
    /// Value for vendors that accept raw base64 or a URL in the same field.
    pub fn as_payload(&self) -> &str {
        match self {
            ImageRef::Inline { base64, .. } => base64,
            ImageRef::Url(url) => url,
        }
    }

    /// Value for vendors that only take URLs; inline images become data URIs.
    pub fn as_url(&self) -> String {
        match self {
            ImageRef::Inline {
                base64,
                content_type,
            } => format!("data:{content_type};base64,{base64}"),
            ImageRef::Url(url) => url.clone(),
        }
    }
}

/// Stages source images somewhere the provider can read them.
#[async_trait]
pub trait ImageStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Check required credentials without touching the network.
    fn check_configuration(&self) -> Result<(), TryOnError>;

    async fn stage_pair(
        &self,
        person: &UploadedImage,
        garment: &UploadedImage,
    ) -> Result<(ImageRef, ImageRef), StorageError>;
}

/// Passes images through as base64.
pub struct InlineStore;

impl InlineStore {
    pub fn encode(image: &UploadedImage) -> ImageRef {
        ImageRef::Inline {
            base64: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            content_type: image.content_type.clone(),
        }
    }
}

#[async_trait]
impl ImageStore for InlineStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Inline
    }

    fn check_configuration(&self) -> Result<(), TryOnError> {
        Ok(())
    }

    async fn stage_pair(
        &self,
        person: &UploadedImage,
        garment: &UploadedImage,
    ) -> Result<(ImageRef, ImageRef), StorageError> {
        Ok((Self::encode(person), Self::encode(garment)))
    }
}

/// Client for an S3-compatible bucket (AWS S3, Supabase Storage, R2).
pub struct BucketClient {
    bucket: Box<Bucket>,
    public_url: String,
}

impl BucketClient {
    pub fn new(
        bucket_name: &str,
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        public_url: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload image bytes and return their public URL.
    pub async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> Result<String, StorageError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Upload {
                key: key.to_string(),
                status,
            });
        }

        Ok(self.public_url(key))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

/// Uploads images to a bucket and hands out public URLs.
pub struct ObjectStore {
    client: Option<BucketClient>,
    missing: Vec<&'static str>,
    http: Client,
    validate_urls: bool,
}

impl ObjectStore {
    /// Builds the bucket client when every setting is present; otherwise the
    /// store is created unconfigured and reports what is missing per request.
    pub fn from_config(http: Client, config: &AppConfig) -> Result<Self, StorageError> {
        let settings = [
            ("STORAGE_BUCKET", config.storage_bucket.as_deref()),
            ("STORAGE_ENDPOINT", config.storage_endpoint.as_deref()),
            ("STORAGE_ACCESS_KEY", config.storage_access_key.as_deref()),
            ("STORAGE_SECRET_KEY", config.storage_secret_key.as_deref()),
            ("STORAGE_PUBLIC_URL", config.storage_public_url.as_deref()),
        ];
        let missing: Vec<&'static str> = settings
            .iter()
            .filter(|(_, v)| v.map_or(true, |v| v.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();

        let client = match settings.map(|(_, v)| v) {
            [Some(bucket), Some(endpoint), Some(access), Some(secret), Some(public)]
                if missing.is_empty() =>
            {
                Some(BucketClient::new(
                    bucket,
                    &config.storage_region,
                    endpoint,
                    access,
                    secret,
                    public,
                )?)
            }
            _ => None,
        };

        Ok(Self {
            client,
            missing,
            http,
            validate_urls: config.validate_uploaded_urls,
        })
    }

    fn client(&self) -> Result<&BucketClient, StorageError> {
        self.client
            .as_ref()
            .ok_or_else(|| StorageError::Config(format!("{} not set", self.missing.join(", "))))
    }

    async fn upload(&self, image: &UploadedImage) -> Result<String, StorageError> {
        let key = object_key(&image.file_name);
        let url = self
            .client()?
            .upload(&key, &image.bytes, &image.content_type)
            .await?;
        tracing::debug!(key = %key, "Uploaded source image");
        Ok(url)
    }
}

#[async_trait]
impl ImageStore for ObjectStore {
    fn kind(&self) -> StoreKind {
        StoreKind::ObjectStorage
    }

    fn check_configuration(&self) -> Result<(), TryOnError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(TryOnError::Configuration(format!(
                "{} not set",
                self.missing.join(", ")
            )))
        }
    }

    async fn stage_pair(
        &self,
        person: &UploadedImage,
        garment: &UploadedImage,
    ) -> Result<(ImageRef, ImageRef), StorageError> {
        let person_url = self.upload(person).await?;
        let garment_url = self.upload(garment).await?;

        if self.validate_urls {
            tokio::try_join!(
                validate_image_url(&self.http, &person_url),
                validate_image_url(&self.http, &garment_url),
            )?;
        }

        Ok((ImageRef::Url(person_url), ImageRef::Url(garment_url)))
    }
}

/// Collision-resistant object key for an uploaded file.
pub fn object_key(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.trim_matches('_').is_empty() {
        "image".to_string()
    } else {
        safe
    };
    format!("{KEY_PREFIX}/{}-{}", Uuid::new_v4(), safe)
}

/// HEAD the URL and require a 2xx `image/*` response.
pub async fn validate_image_url(http: &Client, url: &str) -> Result<(), StorageError> {
    let response = http
        .head(url)
        .timeout(URL_CHECK_TIMEOUT)
        .send()
        .await
        .map_err(StorageError::Http)?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !status.is_success() || !content_type.starts_with("image/") {
        return Err(StorageError::Validation(format!(
            "{url} (content-type: {content_type}, status: {})",
            status.as_u16()
        )));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Upload of {key} returned HTTP {status}")]
    Upload { key: String, status: u16 },

    #[error("URL validation failed: {0}")]
    Validation(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}
