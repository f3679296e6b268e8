use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
};

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use tracing::debug;

use crate::error::AppError;

/// Converts chunk and query text into fixed-dimension vectors.
///
/// The provider is constructed once and injected wherever embeddings are
/// needed; backends share the same contract so tests can swap the network
/// call for the deterministic hashed variant.
#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    OpenAI {
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        dimensions: u32,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn new_openai(client: Arc<Client<OpenAIConfig>>, model: String, dimensions: u32) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            },
        }
    }

    /// Deterministic token-bucket embeddings. No network, stable across runs;
    /// used by tests and offline tooling.
    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }

    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::OpenAI { .. } => "openai",
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::OpenAI { dimensions, .. } => *dimensions as usize,
            EmbeddingInner::Hashed { dimension } => *dimension,
        }
    }

    /// Embeds a batch of texts in a single model call, returning one vector
    /// per input in input order. The batch is all-or-nothing: any upstream
    /// failure surfaces unmodified, with no partial results.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .iter()
                .map(|text| hashed_embedding(text, *dimension))
                .collect()),
            EmbeddingInner::OpenAI {
                client,
                model,
                dimensions,
            } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input(texts.to_vec())
                    .dimensions(*dimensions)
                    .build()?;

                let response = client.embeddings().create(request).await?;

                let embeddings: Vec<Vec<f32>> = response
                    .data
                    .into_iter()
                    .map(|item| item.embedding)
                    .collect();

                if embeddings.len() != texts.len() {
                    return Err(AppError::Embedding(format!(
                        "expected {} embeddings, model returned {}",
                        texts.len(),
                        embeddings.len()
                    )));
                }

                debug!(
                    batch = texts.len(),
                    dimension = dimensions,
                    "generated embedding batch"
                );

                Ok(embeddings)
            }
        }
    }

    /// Embeds a single text as a batch of one.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let input = [text.to_owned()];
        let mut vectors = self.embed_batch(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::Embedding("model returned no embedding for input".into()))
    }
}

fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    for token in tokens(text) {
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_batch_is_order_preserving_and_deterministic() {
        let provider = EmbeddingProvider::new_hashed(32);
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];

        let first = provider.embed_batch(&texts).await.expect("embed batch");
        let second = provider.embed_batch(&texts).await.expect("embed batch");

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(first[1], provider.embed("gamma").await.expect("embed"));
    }

    #[tokio::test]
    async fn hashed_vectors_are_unit_length() {
        let provider = EmbeddingProvider::new_hashed(16);
        let vector = provider.embed("some words to bucket").await.expect("embed");

        assert_eq!(vector.len(), 16);
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let provider = EmbeddingProvider::new_hashed(8);
        let vectors = provider.embed_batch(&[]).await.expect("embed batch");
        assert!(vectors.is_empty());
    }

    #[test]
    fn dimension_reports_configured_size() {
        assert_eq!(EmbeddingProvider::new_hashed(384).dimension(), 384);
        assert_eq!(EmbeddingProvider::new_hashed(0).dimension(), 1);
    }
}
