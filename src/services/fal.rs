use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ProviderKind};
use crate::error::TryOnError;
use crate::models::tryon::{ResultImage, TryOnResult};
use crate::services::provider::{required, TryOnJob, TryOnProvider};

#[derive(Serialize)]
struct FalInput<'a> {
    model_image: &'a str,
    garment_image: &'a str,
    category: &'a str,
}

#[derive(Deserialize)]
struct FalReply {
    #[serde(default)]
    images: Vec<FalImage>,
}

#[derive(Deserialize)]
struct FalImage {
    url: String,
}

/// Single synchronous call to Fal.ai's `fashn/tryon` model.
pub struct FalProvider {
    http: Client,
    api_url: String,
    api_key: Option<String>,
    category: String,
}

impl FalProvider {
    pub fn new(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            api_url: config.fal_api_url.clone(),
            api_key: config.fal_key.clone(),
            category: config.fal_category.clone(),
        }
    }
}

#[async_trait]
impl TryOnProvider for FalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Fal
    }

    fn check_configuration(&self) -> Result<(), TryOnError> {
        required(self.api_key.as_deref(), "FAL_KEY")?;
        Ok(())
    }

    async fn generate(
        &self,
        job: TryOnJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<TryOnResult, TryOnError> {
        let key = required(self.api_key.as_deref(), "FAL_KEY")?;
        let model_image = job.person.reference.as_url();
        let garment_image = job.garment.reference.as_url();

        let input = FalInput {
            model_image: &model_image,
            garment_image: &garment_image,
            category: &self.category,
        };

        let request = self
            .http
            .post(&self.api_url)
            .header(AUTHORIZATION, format!("Key {key}"))
            .json(&input)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(TryOnError::Cancelled),
            response = request => response
                .map_err(|e| TryOnError::Unexpected(format!("Fal request failed: {e}")))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TryOnError::Submission {
                status: status.as_u16(),
                body,
            });
        }

        let reply: FalReply = response
            .json()
            .await
            .map_err(|e| TryOnError::Unexpected(format!("unreadable Fal reply: {e}")))?;

        let url = reply
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| TryOnError::Generation("No image URL returned from Fal.ai API".to_string()))?;

        tracing::info!(category = %self.category, "Fal try-on completed");

        Ok(TryOnResult {
            image: ResultImage::Url(url),
            seed: job.seed,
            task_id: None,
        })
    }
}
