use axum::http::StatusCode;
use image::ImageFormat;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::models::analysis::MatchingAnalysis;
use crate::services::imaging;

const RUBRIC: &str = concat!(
    "You are a fashion stylist. Look at this virtual try-on result and judge how well ",
    "the garment matches the person: fit, colour harmony with skin tone and hair, and ",
    "suitability of the style. Reply with a single line starting with the match as a ",
    "percentage (for example \"Match: 78%\"), followed by a short description of what ",
    "works and what does not."
);

/// Client for a Workers AI multimodal model used to score try-on results.
pub struct MatchingAnalyzer {
    http: Client,
    api_base: String,
    account_id: Option<String>,
    api_token: Option<String>,
    model: String,
    max_download_bytes: usize,
}

#[derive(Serialize)]
struct LlavaRequest<'a> {
    image: Vec<u8>,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct LlavaResponse {
    result: LlavaResult,
}

#[derive(Deserialize)]
struct LlavaResult {
    description: String,
}

impl MatchingAnalyzer {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            api_base: config.cf_api_base.trim_end_matches('/').to_string(),
            account_id: config.cf_account_id.clone(),
            api_token: config.cf_api_token.clone(),
            model: config.analysis_model.clone(),
            max_download_bytes: config.body_limit_bytes,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    fn credentials(&self) -> Result<(&str, &str), AnalysisError> {
        let account = self
            .account_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AnalysisError::NotConfigured("CF_ACCOUNT_ID"))?;
        let token = self
            .api_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AnalysisError::NotConfigured("CF_API_TOKEN"))?;
        Ok((account, token))
    }

    /// Download a generated image and ask the model how well the outfit matches.
    pub async fn analyze(&self, image_url: &str) -> Result<MatchingAnalysis, AnalysisError> {
        let (account_id, api_token) = self.credentials()?;

        let url = reqwest::Url::parse(image_url)
            .map_err(|e| AnalysisError::InvalidUrl(format!("{image_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AnalysisError::InvalidUrl(format!(
                "{image_url}: only http and https are supported"
            )));
        }

        let mut response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AnalysisError::Download(response.status().as_u16()));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        if response
            .content_length()
            .is_some_and(|len| len > self.max_download_bytes as u64)
        {
            return Err(AnalysisError::TooLarge(self.max_download_bytes));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_download_bytes {
                return Err(AnalysisError::TooLarge(self.max_download_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        let format = declared
            .as_deref()
            .and_then(ImageFormat::from_mime_type)
            .map(Ok)
            .unwrap_or_else(|| imaging::detect_format(&bytes))?;

        let image = match format {
            ImageFormat::Jpeg | ImageFormat::Png => bytes,
            _ => imaging::to_png(&bytes)?,
        };

        tracing::debug!(
            format = ?format,
            bytes = image.len(),
            model = %self.model,
            "Submitting image for matching analysis"
        );

        let url = format!(
            "{}/accounts/{}/ai/run/{}",
            self.api_base, account_id, self.model
        );
        let request_body = LlavaRequest {
            image,
            prompt: RUBRIC,
            max_tokens: 512,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_token)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Model { status, body });
        }

        let llava_resp: LlavaResponse = response.json().await?;
        Ok(parse_reply(&llava_resp.result.description))
    }
}

/// Pull the first `NN%` out of the model reply; the full text is the description.
pub fn parse_reply(reply: &str) -> MatchingAnalysis {
    let description = reply.trim().to_string();
    let bytes = description.as_bytes();

    let percentage = bytes.iter().enumerate().find_map(|(i, b)| {
        if *b != b'%' {
            return None;
        }
        let start = bytes[..i]
            .iter()
            .rposition(|c| !c.is_ascii_digit())
            .map_or(0, |p| p + 1);
        description[start..i]
            .parse::<u16>()
            .ok()
            .filter(|v| *v <= 100)
            .map(|v| v as u8)
    });

    MatchingAnalysis {
        percentage,
        description,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Matching analysis is not configured: {0} is not set")]
    NotConfigured(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid image URL {0}")]
    InvalidUrl(String),

    #[error("Image download exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Image download returned HTTP {0}")]
    Download(u16),

    #[error("Unsupported image: {0}")]
    Image(#[from] imaging::ImagingError),

    #[error("Analysis model returned HTTP {status}: {body}")]
    Model { status: u16, body: String },
}

impl AnalysisError {
    /// HTTP status for the analyze endpoint.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AnalysisError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            AnalysisError::Image(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
