use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderKind;
use crate::error::TryOnError;
use crate::models::tryon::{TryOnResult, UploadedImage};
use crate::services::storage::ImageRef;

/// A source image together with the reference the store produced for it.
#[derive(Debug, Clone)]
pub struct StagedImage {
    pub upload: UploadedImage,
    pub reference: ImageRef,
}

/// Everything a provider needs to generate one try-on image.
#[derive(Debug, Clone, Copy)]
pub struct TryOnJob<'a> {
    pub person: &'a StagedImage,
    pub garment: &'a StagedImage,
    pub seed: u32,
}

/// A vendor capable of compositing a garment onto a person.
#[async_trait]
pub trait TryOnProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Check required credentials without touching the network.
    fn check_configuration(&self) -> Result<(), TryOnError>;

    /// Run the vendor call to completion. Implementations must stop early
    /// once `cancel` fires.
    async fn generate(
        &self,
        job: TryOnJob<'_>,
        cancel: &CancellationToken,
    ) -> Result<TryOnResult, TryOnError>;
}

/// Require a non-blank configuration value.
pub(crate) fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, TryOnError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| TryOnError::Configuration(format!("{name} is not set")))
}
