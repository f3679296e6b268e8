use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::document::Document,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};

use crate::chunker;
use crate::extraction;
use crate::ocr::{OcrEngine, VisionOcr};

/// The pipeline's side-effecting collaborators behind one seam, so the
/// coordinator can be driven by stubs in tests.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn extract_text(&self, document: &Document, bytes: Vec<u8>) -> Result<String, AppError>;

    async fn split_chunks(&self, text: String) -> Result<Vec<String>, AppError>;

    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

pub struct DefaultPipelineServices {
    ocr: Arc<dyn OcrEngine>,
    embedding_provider: Arc<EmbeddingProvider>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DefaultPipelineServices {
    pub fn new(config: &AppConfig, embedding_provider: Arc<EmbeddingProvider>) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.openai_api_key.clone())
            .with_api_base(config.openai_base_url.clone());
        let ocr = VisionOcr::new(
            Arc::new(Client::with_config(openai_config)),
            config.ocr_model.clone(),
        );

        Self::with_ocr(config, embedding_provider, Arc::new(ocr))
    }

    pub fn with_ocr(
        config: &AppConfig,
        embedding_provider: Arc<EmbeddingProvider>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            ocr,
            embedding_provider,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn extract_text(&self, document: &Document, bytes: Vec<u8>) -> Result<String, AppError> {
        extraction::extract_text(bytes, &document.mime_type, self.ocr.as_ref()).await
    }

    async fn split_chunks(&self, text: String) -> Result<Vec<String>, AppError> {
        let size = self.chunk_size;
        let overlap = self.chunk_overlap;
        // Splitting is CPU-bound on large documents.
        tokio::task::spawn_blocking(move || chunker::split_text(&text, size, overlap)).await?
    }

    async fn embed_chunks(&self, chunks: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.embedding_provider.embed_batch(chunks).await
    }
}
