use garde::Validate;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Largest seed accepted by the vendor.
pub const MAX_SEED: u32 = 999_999;

/// An image received from the caller, held in memory.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
}

impl UploadedImage {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A decoded try-on request, independent of the wire encoding it arrived in.
#[derive(Debug, Validate)]
pub struct TryOnRequest {
    #[garde(skip)]
    pub person_image: UploadedImage,

    #[garde(skip)]
    pub garment_image: UploadedImage,

    /// Requested seed; ignored when `randomize_seed` is set.
    #[garde(range(max = MAX_SEED))]
    pub seed: u32,

    #[garde(skip)]
    pub randomize_seed: bool,
}

impl TryOnRequest {
    /// The seed sent to the vendor: drawn uniformly from `[0, MAX_SEED]` when
    /// randomised, otherwise the requested seed.
    pub fn resolve_seed(&self) -> u32 {
        if self.randomize_seed {
            rand::rng().random_range(0..=MAX_SEED)
        } else {
            self.seed
        }
    }
}

/// Generated image, either inline base64 or a URL the caller can fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultImage {
    Base64(String),
    Url(String),
}

impl ResultImage {
    /// Classify a raw vendor result field.
    pub fn from_vendor(raw: String) -> Self {
        if raw.starts_with("https://") || raw.starts_with("http://") {
            Self::Url(raw)
        } else {
            Self::Base64(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Base64(s) | Self::Url(s) => s,
        }
    }
}

/// Terminal value of a successful run.
#[derive(Debug, Clone)]
pub struct TryOnResult {
    pub image: ResultImage,
    pub seed: u32,
    pub task_id: Option<String>,
}

/// JSON body of `POST /api/tryon`, for both success and failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct TryOnResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub image: Option<String>,
    pub seed: u32,
    pub info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_image_url: Option<String>,
}

impl TryOnResponse {
    pub fn success(result: TryOnResult) -> Self {
        let generated_image_url = match &result.image {
            ResultImage::Url(url) => Some(url.clone()),
            ResultImage::Base64(_) => None,
        };
        Self {
            error: None,
            image: Some(result.image.as_str().to_string()),
            seed: result.seed,
            info: "Success".to_string(),
            status: Some("success".to_string()),
            task_id: result.task_id,
            generated_image_url,
        }
    }

    pub fn failure(error: String, seed: u32, info: String) -> Self {
        Self {
            error: Some(error),
            image: None,
            seed,
            info,
            status: None,
            task_id: None,
            generated_image_url: None,
        }
    }
}
