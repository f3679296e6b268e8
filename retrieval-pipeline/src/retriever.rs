use std::sync::Arc;

use tracing::debug;

use common::{
    error::AppError,
    storage::chunk_index::{ChunkIndex, ScoredChunk},
    utils::embedding::EmbeddingProvider,
};

/// Query-time lookup: embeds the query and asks the vector index for the
/// nearest chunks.
pub struct Retriever {
    index: ChunkIndex,
    embedding_provider: Arc<EmbeddingProvider>,
}

impl Retriever {
    pub fn new(index: ChunkIndex, embedding_provider: Arc<EmbeddingProvider>) -> Self {
        Self {
            index,
            embedding_provider,
        }
    }

    /// Top `k` chunks by cosine similarity, best first. Fewer than `k` hits
    /// is normal when the index is sparse.
    #[tracing::instrument(skip(self, query))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, AppError> {
        let query_vector = self.embedding_provider.embed(query).await?;
        let hits = self.index.search(&query_vector, k).await?;

        debug!(hits = hits.len(), "retrieval finished");
        Ok(hits)
    }
}
