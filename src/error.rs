use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::tryon::TryOnResponse;
use crate::services::storage::StorageError;

pub const EMPTY_IMAGE: &str = "Empty image";
pub const URL_ERROR_INFO: &str = "URL error, please contact the admin";
pub const HTTP_TIMEOUT_INFO: &str = "Http Timeout, please try again later";

/// Every way a try-on request can end without an image.
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedImage(String),

    #[error("Missing API configuration: {0}")]
    Configuration(String),

    #[error("Error during job submission: {body}")]
    Submission { status: u16, body: String },

    #[error("Try-on API returned an error during submission")]
    Vendor(String),

    /// A synchronous provider answered but produced no image.
    #[error("Try-on API did not return an image")]
    Generation(String),

    #[error("{0}")]
    Query(String),

    #[error("Try-on job did not finish after {attempts} queries")]
    Timeout {
        attempts: u32,
        last_info: Option<String>,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Image storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Unexpected error occurred: {0}")]
    Unexpected(String),
}

impl TryOnError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TryOnError::Validation(_) => StatusCode::BAD_REQUEST,
            TryOnError::UnsupportedImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            TryOnError::Submission { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            TryOnError::Storage(_) => StatusCode::BAD_GATEWAY,
            TryOnError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TryOnError::Configuration(_)
            | TryOnError::Vendor(_)
            | TryOnError::Generation(_)
            | TryOnError::Query(_)
            | TryOnError::Cancelled
            | TryOnError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human status shown to the caller in `info`.
    pub fn info(&self) -> String {
        match self {
            TryOnError::Validation(info) => info.clone(),
            TryOnError::UnsupportedImage(_) => "Unsupported image".to_string(),
            TryOnError::Configuration(_) => "Configuration error".to_string(),
            TryOnError::Submission { .. } => "Submission error".to_string(),
            TryOnError::Vendor(status) => status.clone(),
            TryOnError::Generation(info) => info.clone(),
            TryOnError::Query(info) => info.clone(),
            TryOnError::Timeout { last_info, .. } => {
                last_info.clone().unwrap_or_else(|| "Timeout".to_string())
            }
            TryOnError::Cancelled => "Cancelled".to_string(),
            TryOnError::Storage(_) => "Storage error".to_string(),
            TryOnError::Unexpected(_) => "Error".to_string(),
        }
    }

    /// Label used for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            TryOnError::Validation(_) => "validation",
            TryOnError::UnsupportedImage(_) => "unsupported_image",
            TryOnError::Configuration(_) => "configuration",
            TryOnError::Submission { .. } => "submission",
            TryOnError::Vendor(_) => "vendor",
            TryOnError::Generation(_) => "generation",
            TryOnError::Query(_) => "query",
            TryOnError::Timeout { .. } => "timeout",
            TryOnError::Cancelled => "cancelled",
            TryOnError::Storage(_) => "storage",
            TryOnError::Unexpected(_) => "unexpected",
        }
    }

    /// Text for the `error` field of the response body. Internal detail of
    /// unexpected failures stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            TryOnError::Unexpected(_) => "Unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }

    /// Attach the seed that the failure response should echo.
    pub fn with_seed(self, seed: u32) -> TryOnFailure {
        TryOnFailure { error: self, seed }
    }
}

/// A terminal error plus the seed to report; renders the failure body.
#[derive(Debug)]
pub struct TryOnFailure {
    pub error: TryOnError,
    pub seed: u32,
}

impl From<TryOnError> for TryOnFailure {
    fn from(error: TryOnError) -> Self {
        error.with_seed(0)
    }
}

impl IntoResponse for TryOnFailure {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = TryOnResponse::failure(self.error.public_message(), self.seed, self.error.info());
        (status, Json(body)).into_response()
    }
}
