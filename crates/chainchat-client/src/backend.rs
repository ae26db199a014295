use async_trait::async_trait;
use chainchat_core::AvailableModels;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogClient, ProgressStream};
use crate::generate::{GenerateRequest, GenerationClient, TextStream};

/// Source of streamed generations
pub trait GenerationBackend: Send + Sync {
    fn generate(&self, request: GenerateRequest, cancel: CancellationToken) -> TextStream;
}

/// Installed-model listing and model downloads
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn fetch_available_models(&self) -> AvailableModels;

    fn pull_model(&self, name: &str, cancel: CancellationToken) -> ProgressStream;
}

impl GenerationBackend for GenerationClient {
    fn generate(&self, request: GenerateRequest, cancel: CancellationToken) -> TextStream {
        GenerationClient::generate(self, request, cancel)
    }
}

#[async_trait]
impl CatalogBackend for CatalogClient {
    async fn fetch_available_models(&self) -> AvailableModels {
        CatalogClient::fetch_available_models(self).await
    }

    fn pull_model(&self, name: &str, cancel: CancellationToken) -> ProgressStream {
        CatalogClient::pull_model(self, name, cancel)
    }
}
