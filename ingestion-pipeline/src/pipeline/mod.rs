mod services;
mod state;

#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{
        chunk_index::ChunkIndex,
        db::SurrealDbClient,
        types::document::{Document, ProcessingStatus},
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use state_machines::core::GuardError;
use tracing::{info, warn};

use self::state::ready;
use crate::extraction;

/// Coordinates a document's walk from raw bytes to indexed chunks.
///
/// Concurrent calls for different documents run freely; calls for the same
/// document serialize on a per-document lock so the index never sees
/// interleaved writes for one document.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    index: ChunkIndex,
    services: Arc<dyn PipelineServices>,
    document_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: &AppConfig,
        embedding_provider: Arc<EmbeddingProvider>,
    ) -> Self {
        let index = ChunkIndex::new(Arc::clone(&db), embedding_provider.dimension());
        let services = DefaultPipelineServices::new(config, embedding_provider);

        Self::with_services(db, index, Arc::new(services))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        index: ChunkIndex,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            db,
            index,
            services,
            document_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    /// Creates the chunk table and vector index. Call once at startup.
    pub async fn init(&self) -> Result<(), AppError> {
        self.index.ensure_ready().await
    }

    /// Registers an upload and returns its `Pending` document record.
    pub async fn register_document(
        &self,
        file_name: &str,
        declared_mime: Option<&str>,
        owner_id: &str,
    ) -> Result<Document, AppError> {
        let mime_type = extraction::resolve_mime(declared_mime, file_name);
        let document = Document::new(file_name.to_owned(), mime_type, owner_id.to_owned());

        let stored = self.db.store_item(document).await?;
        stored.ok_or_else(|| AppError::Internal("document insert returned no record".into()))
    }

    /// Runs the full ingestion for a registered document.
    ///
    /// The document must be `Pending`; it ends `Completed` with its chunks
    /// indexed, or `Failed` with no partial chunk records left behind.
    #[tracing::instrument(skip_all, fields(document_id = %document_id))]
    pub async fn process_document(
        &self,
        document_id: &str,
        bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        let lock = self.document_lock(document_id);
        let _guard = lock.lock().await;

        let document = Document::mark_processing(document_id, &self.db).await?;

        match self.drive_pipeline(&document, bytes).await {
            Ok(chunk_count) => {
                Document::mark_completed(document_id, &self.db).await?;
                info!(chunk_count, "document ingestion succeeded");
                Ok(())
            }
            Err(err) => {
                if let Err(status_err) = Document::mark_failed(document_id, &self.db).await {
                    warn!(error = %status_err, "failed to record Failed status");
                }
                tracing::error!(error = %err, "document ingestion failed");
                Err(err)
            }
        }
    }

    pub async fn get_status(&self, document_id: &str) -> Result<ProcessingStatus, AppError> {
        Document::get_status(document_id, &self.db).await
    }

    /// Flips a `Failed` document back to `Pending` so it can be reprocessed.
    pub async fn retry_document(&self, document_id: &str) -> Result<Document, AppError> {
        Document::mark_retryable(document_id, &self.db).await
    }

    /// Removes the document record and all of its index records.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), AppError> {
        let lock = self.document_lock(document_id);
        let _guard = lock.lock().await;

        Document::delete(document_id, &self.db, &self.index).await
    }

    #[tracing::instrument(skip_all, fields(document_id = %document.id, mime_type = %document.mime_type))]
    async fn drive_pipeline(&self, document: &Document, bytes: Vec<u8>) -> Result<usize, AppError> {
        let machine = ready();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let text = self.services.extract_text(document, bytes).await?;
        let machine = machine
            .extract()
            .map_err(|(_, guard)| map_guard_error("extract", &guard))?;
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let chunks = self.services.split_chunks(text).await?;
        let machine = machine
            .chunk()
            .map_err(|(_, guard)| map_guard_error("chunk", &guard))?;
        let chunk_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let vectors = self.services.embed_chunks(&chunks).await?;
        let machine = machine
            .embed()
            .map_err(|(_, guard)| map_guard_error("embed", &guard))?;
        let embed_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let written = self.replace_index_records(&document.id, &chunks, vectors).await?;
        let _machine = machine
            .index()
            .map_err(|(_, guard)| map_guard_error("index", &guard))?;
        let index_duration = stage_start.elapsed();

        info!(
            chunk_count = written,
            total_ms = duration_millis(pipeline_started.elapsed()),
            extract_ms = duration_millis(extract_duration),
            chunk_ms = duration_millis(chunk_duration),
            embed_ms = duration_millis(embed_duration),
            index_ms = duration_millis(index_duration),
            "document pipeline finished"
        );

        Ok(written)
    }

    /// Drops the document's old records, then writes the new batch. A write
    /// failure mid-batch triggers a cleanup delete so the index holds either
    /// the full new batch or nothing for this document.
    async fn replace_index_records(
        &self,
        document_id: &str,
        chunks: &[String],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, AppError> {
        self.index.delete_by_document(document_id).await?;

        match self.index.upsert_document(document_id, chunks, vectors).await {
            Ok(written) => Ok(written),
            Err(err) => {
                if let Err(cleanup_err) = self.index.delete_by_document(document_id).await {
                    warn!(
                        document_id,
                        error = %cleanup_err,
                        "failed to clean up partial chunk records"
                    );
                }
                Err(err)
            }
        }
    }

    fn document_lock(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .document_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(document_id.to_owned())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::Internal(format!(
        "invalid document pipeline transition during {event}: {guard:?}"
    ))
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
