use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, ProviderKind, StoreKind};
use crate::services::{
    analysis::MatchingAnalyzer,
    fal::FalProvider,
    huggingface::HuggingFaceProvider,
    imaging::NormalizeOptions,
    kolors::KolorsProvider,
    provider::TryOnProvider,
    storage::{ImageStore, InlineStore, ObjectStore, StorageError},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn TryOnProvider>,
    pub store: Arc<dyn ImageStore>,
    pub analyzer: Arc<MatchingAnalyzer>,
    pub upload_dir: Arc<PathBuf>,
    pub normalize: Option<NormalizeOptions>,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn TryOnProvider>,
        store: Arc<dyn ImageStore>,
        analyzer: MatchingAnalyzer,
        upload_dir: PathBuf,
        normalize: Option<NormalizeOptions>,
    ) -> Self {
        Self {
            provider,
            store,
            analyzer: Arc::new(analyzer),
            upload_dir: Arc::new(upload_dir),
            normalize,
        }
    }

    /// Wire provider, store and analyzer as selected by configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(StartupError::Http)?;

        let provider: Arc<dyn TryOnProvider> = match config.tryon_provider {
            ProviderKind::Kolors => Arc::new(KolorsProvider::new(http.clone(), config)),
            ProviderKind::HuggingFace => Arc::new(HuggingFaceProvider::new(http.clone(), config)),
            ProviderKind::Fal => Arc::new(FalProvider::new(http.clone(), config)),
        };

        let store: Arc<dyn ImageStore> = match config.image_store {
            StoreKind::Inline => Arc::new(InlineStore),
            StoreKind::ObjectStorage => {
                Arc::new(ObjectStore::from_config(http.clone(), config).map_err(StartupError::Storage)?)
            }
        };

        let normalize = config.normalize_images.then(|| NormalizeOptions {
            jpeg_quality: config.normalize_jpeg_quality,
            max_dimension: config.normalize_max_dimension,
        });

        let upload_dir = config.upload_dir();
        std::fs::create_dir_all(&upload_dir).map_err(StartupError::UploadDir)?;

        Ok(Self::new(
            provider,
            store,
            MatchingAnalyzer::new(http, config),
            upload_dir,
            normalize,
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to build HTTP client: {0}")]
    Http(reqwest::Error),

    #[error("Failed to initialize image store: {0}")]
    Storage(StorageError),

    #[error("Upload directory is not usable: {0}")]
    UploadDir(std::io::Error),
}
