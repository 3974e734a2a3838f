use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ProviderKind};
use crate::error::TryOnError;
use crate::models::tryon::{ResultImage, TryOnResult, UploadedImage};
use crate::services::provider::{required, TryOnJob, TryOnProvider};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HfReply {
    #[serde(default)]
    image_url: Option<String>,
}

/// Single synchronous call to a Hugging Face hosted try-on endpoint.
pub struct HuggingFaceProvider {
    http: Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl HuggingFaceProvider {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            api_url: config.hf_api_url.clone(),
            api_key: config.hf_api_key.clone(),
        }
    }

    fn part(image: &UploadedImage, file_name: &str) -> Result<Part, TryOnError> {
        Part::bytes(image.bytes.clone())
            .file_name(file_name.to_string())
            .mime_str(&image.content_type)
            .map_err(|e| TryOnError::Unexpected(e.to_string()))
    }
}

#[async_trait]
impl TryOnProvider for HuggingFaceProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::HuggingFace
    }

    fn check_configuration(&self) -> Result<(), TryOnError> {
        required(self.api_url.as_deref(), "HF_API_URL")?;
        required(self.api_key.as_deref(), "HF_API_KEY")?;
        Ok(())
    }

    async fn generate(
        &self,
        job: TryOnJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<TryOnResult, TryOnError> {
        let url = required(self.api_url.as_deref(), "HF_API_URL")?;
        let key = required(self.api_key.as_deref(), "HF_API_KEY")?;

        let form = Form::new()
            .part("personImg", Self::part(&job.person.upload, "person.jpg")?)
            .part("garmentImg", Self::part(&job.garment.upload, "garment.jpg")?);

        tracing::info!(seed = job.seed, "Sending images to Hugging Face endpoint");

        let request = self.http.post(url).bearer_auth(key).multipart(form).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
            response = request => response
                .map_err(|e| TryOnError::Unexpected(format!("Hugging Face request failed: {e}")))?,
        };

        let status = response.status();
        let reply: Option<HfReply> = response.json().await.ok();

        match reply.and_then(|r| r.image_url).filter(|u| !u.is_empty()) {
            Some(image_url) if status.is_success() => Ok(TryOnResult {
                image: ResultImage::Url(image_url),
                seed: job.seed,
                task_id: None,
            }),
            _ => {
                tracing::warn!(status = status.as_u16(), "Hugging Face returned no image");
                Err(TryOnError::Generation("Failed to generate image".to_string()))
            }
        }
    }
}
