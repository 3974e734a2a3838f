use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use strum::Display;

/// Which vendor generates the try-on image.
#[derive(Debug, Clone, Copy, Default, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderKind {
    /// Kolors / Kling submit-then-poll API.
    #[default]
    Kolors,
    /// Hugging Face hosted endpoint, single synchronous call.
    HuggingFace,
    /// Fal.ai `fashn/tryon`, single synchronous call.
    Fal,
}

/// Where source images live before they are handed to the provider.
#[derive(Debug, Clone, Copy, Default, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Inline,
    ObjectStorage,
}

/// What the poll loop does when a query fails at the transport level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportErrorPolicy {
    /// Record the failure and keep polling within the budget.
    #[default]
    Retry,
    /// Stop polling and fail the request.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub tryon_provider: ProviderKind,

    #[serde(default)]
    pub image_store: StoreKind,

    /// Kolors API base URL, e.g. "https://api.klingai.com/kolors-virtual-try-on/"
    pub kolors_api_url: Option<String>,

    /// Kolors access key id (JWT issuer)
    pub access_key_id: Option<String>,

    /// Kolors access key secret (JWT HMAC key)
    pub access_key_secret: Option<String>,

    /// Bearer token validity in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,

    #[serde(default = "default_poll_initial_delay_ms")]
    pub poll_initial_delay_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Optional wall-clock cap on the whole wait, counted from submission.
    pub poll_max_wait_ms: Option<u64>,

    #[serde(default)]
    pub poll_on_transport_error: TransportErrorPolicy,

    /// Timeout applied to every outbound HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Hugging Face endpoint URL
    pub hf_api_url: Option<String>,

    /// Hugging Face API key
    pub hf_api_key: Option<String>,

    /// Fal.ai API key
    pub fal_key: Option<String>,

    #[serde(default = "default_fal_api_url")]
    pub fal_api_url: String,

    /// Garment category sent to Fal ("tops", "bottoms", "one-pieces")
    #[serde(default = "default_fal_category")]
    pub fal_category: String,

    /// S3-compatible bucket name (AWS S3, Supabase Storage)
    pub storage_bucket: Option<String>,

    /// S3-compatible endpoint URL
    pub storage_endpoint: Option<String>,

    #[serde(default = "default_storage_region")]
    pub storage_region: String,

    pub storage_access_key: Option<String>,

    pub storage_secret_key: Option<String>,

    /// Public URL prefix under which uploaded objects are reachable
    pub storage_public_url: Option<String>,

    /// HEAD-check uploaded URLs before handing them to the provider
    #[serde(default = "default_true")]
    pub validate_uploaded_urls: bool,

    /// Re-encode source images before submission
    #[serde(default)]
    pub normalize_images: bool,

    #[serde(default = "default_normalize_jpeg_quality")]
    pub normalize_jpeg_quality: u8,

    #[serde(default = "default_normalize_max_dimension")]
    pub normalize_max_dimension: u32,

    /// Cloudflare account ID (matching analysis)
    pub cf_account_id: Option<String>,

    /// Cloudflare Workers AI API token (matching analysis)
    pub cf_api_token: Option<String>,

    #[serde(default = "default_cf_api_base")]
    pub cf_api_base: String,

    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Directory for spooled multipart uploads
    pub upload_dir: Option<PathBuf>,

    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_token_ttl_secs() -> u64 {
    1800
}

fn default_poll_initial_delay_ms() -> u64 {
    9000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_max_attempts() -> u32 {
    12
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_fal_api_url() -> String {
    "https://fal.run/fashn/tryon".to_string()
}

fn default_fal_category() -> String {
    "tops".to_string()
}

fn default_storage_region() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

fn default_normalize_jpeg_quality() -> u8 {
    90
}

fn default_normalize_max_dimension() -> u32 {
    2048
}

fn default_cf_api_base() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_analysis_model() -> String {
    "@cf/llava-hf/llava-1.5-7b-hf".to_string()
}

fn default_body_limit_bytes() -> usize {
    25 * 1024 * 1024
}

/// Budget and pacing of the vendor poll loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_wait: Option<Duration>,
    pub on_transport_error: TransportErrorPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build a config from explicit `NAME=value` pairs, ignoring the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        envy::from_iter(vars.into_iter().map(|(k, v)| (k.into(), v.into())))
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            initial_delay: Duration::from_millis(self.poll_initial_delay_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.poll_max_attempts.max(1),
            max_wait: self.poll_max_wait_ms.map(Duration::from_millis),
            on_transport_error: self.poll_on_transport_error,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
