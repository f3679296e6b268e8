use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::AppError;

use super::{db::SurrealDbClient, types::document_chunk::DocumentChunk};

const CHUNK_TABLE: &str = "document_chunk";
const EMBEDDING_INDEX: &str = "idx_embedding_document_chunk";
// HNSW beam width for KNN queries; matches the index build parameters below.
const KNN_EF_SEARCH: usize = 40;

/// A search hit: the chunk payload plus its cosine distance to the query
/// vector. Smaller distance means higher similarity.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub distance: f32,
}

/// The vector index over document chunks.
///
/// Dimensionality is pinned when the index is created; every vector written
/// or searched afterwards must match it exactly. Records are keyed by
/// `(document_id, chunk_index)` so writes are idempotent and deletion can be
/// filtered per document.
#[derive(Clone)]
pub struct ChunkIndex {
    db: Arc<SurrealDbClient>,
    dimension: usize,
}

impl ChunkIndex {
    pub fn new(db: Arc<SurrealDbClient>, dimension: usize) -> Self {
        Self { db, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Defines the chunk table and its HNSW cosine index. Idempotent; the
    /// OVERWRITE form re-pins the dimension if configuration changed between
    /// runs.
    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        let definition = format!(
            "DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS; \
             DEFINE INDEX OVERWRITE {index} ON TABLE {table} \
             FIELDS embedding HNSW DIMENSION {dimension} DIST COSINE TYPE F32 EFC 100 M 8;",
            table = CHUNK_TABLE,
            index = EMBEDDING_INDEX,
            dimension = self.dimension,
        );

        let response = self.db.client.query(definition).await?;
        response.check()?;

        info!(dimension = self.dimension, "chunk index ready");
        Ok(())
    }

    /// Writes one record per chunk under the document's namespace. Re-running
    /// with the same `(document_id, chunk_index)` pairs replaces the prior
    /// records rather than duplicating them. Vector validation happens before
    /// any write, so a bad batch leaves the index untouched.
    pub async fn upsert_document(
        &self,
        document_id: &str,
        chunks: &[String],
        vectors: Vec<Vec<f32>>,
    ) -> Result<usize, AppError> {
        if chunks.len() != vectors.len() {
            return Err(AppError::Index(format!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        for vector in &vectors {
            self.check_dimension(vector.len())?;
        }

        let mut written = 0usize;
        for (chunk_index, (text, embedding)) in chunks.iter().zip(vectors).enumerate() {
            let record = DocumentChunk::new(
                document_id.to_owned(),
                chunk_index as u32,
                text.clone(),
                embedding,
            );
            self.db.upsert_item(record).await?;
            written += 1;
        }

        debug!(document_id, records = written, "upserted chunk records");
        Ok(written)
    }

    /// KNN search by cosine distance, closest first. Returning fewer than
    /// `limit` hits is normal for a sparse index.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        self.check_dimension(query_vector.len())?;

        let query = format!(
            "SELECT document_id, chunk_index, text, vector::distance::knn() AS distance \
             FROM {CHUNK_TABLE} WHERE embedding <|{limit},{KNN_EF_SEARCH}|> {query_vector:?} \
             ORDER BY distance"
        );

        let hits: Vec<ScoredChunk> = self.db.client.query(query).await?.take(0)?;
        Ok(hits)
    }

    /// Removes every record belonging to the document. Safe to call for a
    /// document with zero records.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<(), AppError> {
        self.db
            .client
            .query(format!("DELETE {CHUNK_TABLE} WHERE document_id = $document_id"))
            .bind(("document_id", document_id.to_owned()))
            .await?;

        Ok(())
    }

    pub async fn count_for_document(&self, document_id: &str) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: usize,
        }

        let mut response = self
            .db
            .client
            .query(format!(
                "SELECT count() AS count FROM {CHUNK_TABLE} \
                 WHERE document_id = $document_id GROUP ALL"
            ))
            .bind(("document_id", document_id.to_owned()))
            .await?;

        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map(|row| row.count).unwrap_or(0))
    }

    fn check_dimension(&self, got: usize) -> Result<(), AppError> {
        if got != self.dimension {
            return Err(AppError::Index(format!(
                "vector dimension {got} does not match index dimension {}",
                self.dimension
            )));
        }
        Ok(())
    }
}
