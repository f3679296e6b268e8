use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tracing::{debug, error};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::message::{Message, MessageRole},
    },
    utils::config::AppConfig,
};

use crate::{
    generation::{AnswerStream, ResponseGenerator},
    prompt,
    retriever::Retriever,
};

/// The single fragment shown to the user when generation fails. The failure
/// itself is logged; the transport never sees an error.
pub const GENERATION_APOLOGY: &str =
    "I'm sorry, something went wrong while generating a response. Please try again.";

/// Query-time coordinator: retrieve, assemble, generate.
pub struct ChatService {
    retriever: Retriever,
    generator: Arc<dyn ResponseGenerator>,
    max_context_chunks: usize,
    max_history_messages: usize,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn ResponseGenerator>,
        config: &AppConfig,
    ) -> Self {
        Self::with_limits(
            retriever,
            generator,
            config.max_context_chunks,
            config.max_history_messages,
        )
    }

    pub fn with_limits(
        retriever: Retriever,
        generator: Arc<dyn ResponseGenerator>,
        max_context_chunks: usize,
        max_history_messages: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            max_context_chunks,
            max_history_messages,
        }
    }

    /// Streams the answer to `query`, grounded in retrieved context and the
    /// recent history. Failures surface as `Err` items; wrap the result in
    /// [`with_apology`] before handing it to a user-facing transport.
    #[tracing::instrument(skip_all, fields(history_len = history.len()))]
    pub async fn respond(&self, query: &str, history: &[Message]) -> AnswerStream {
        match self.answer_stream(query, history).await {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "failed to start answer stream");
                Box::pin(futures::stream::once(async move { Err(err) }))
            }
        }
    }

    async fn answer_stream(
        &self,
        query: &str,
        history: &[Message],
    ) -> Result<AnswerStream, AppError> {
        let hits = self
            .retriever
            .retrieve(query, self.max_context_chunks)
            .await?;
        let context: Vec<String> = hits.into_iter().map(|hit| hit.text).collect();
        debug!(context_chunks = context.len(), "assembled generation context");

        let messages =
            prompt::build_messages(query, &context, history, self.max_history_messages)?;
        self.generator.generate(messages).await
    }
}

/// Transport adapter: replaces the first `Err` item with the fixed apology
/// fragment and ends the stream, so user-facing streams never carry errors.
pub fn with_apology(answer: AnswerStream) -> AnswerStream {
    Box::pin(stream! {
        let mut answer = answer;
        while let Some(item) = answer.next().await {
            match item {
                Ok(fragment) => yield Ok(fragment),
                Err(err) => {
                    error!(error = %err, "generation failed; emitting apology");
                    yield Ok(GENERATION_APOLOGY.to_owned());
                    return;
                }
            }
        }
    })
}

/// Drains a stream into the complete answer. Any `Err` item aborts with that
/// error so partial output is never treated as a finished turn.
pub async fn collect_answer(mut answer: AnswerStream) -> Result<String, AppError> {
    let mut full = String::new();
    while let Some(item) = answer.next().await {
        full.push_str(&item?);
    }
    Ok(full)
}

/// Persists a completed assistant turn. Call only with the output of a
/// successful [`collect_answer`].
pub async fn store_answer(
    db: &SurrealDbClient,
    conversation_id: &str,
    content: String,
) -> Result<Message, AppError> {
    let message = Message::new(conversation_id.to_owned(), MessageRole::Assistant, content);
    let stored = db.store_item(message).await?;
    stored.ok_or_else(|| AppError::Internal("message insert returned no record".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::chunk_index::ChunkIndex;
    use common::utils::embedding::EmbeddingProvider;
    use uuid::Uuid;

    use crate::generation::ScriptedGenerator;

    const DIM: usize = 16;

    async fn memory_db() -> Arc<SurrealDbClient> {
        Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        )
    }

    async fn chat_service(
        db: Arc<SurrealDbClient>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> ChatService {
        let index = ChunkIndex::new(db, DIM);
        index.ensure_ready().await.expect("index setup");

        let provider = Arc::new(EmbeddingProvider::new_hashed(DIM));
        let texts = vec!["grounding context chunk".to_owned()];
        let vectors = provider.embed_batch(&texts).await.expect("embed");
        index
            .upsert_document("doc1", &texts, vectors)
            .await
            .expect("upsert");

        let retriever = Retriever::new(index, provider);
        ChatService::with_limits(retriever, generator, 5, 5)
    }

    #[tokio::test]
    async fn a_successful_stream_collects_into_the_full_answer() {
        let db = memory_db().await;
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "The answer ".to_owned(),
            "is 42.".to_owned(),
        ]));
        let service = chat_service(Arc::clone(&db), generator).await;

        let stream = service.respond("what is the answer?", &[]).await;
        let answer = collect_answer(stream).await.expect("collect");
        assert_eq!(answer, "The answer is 42.");

        let stored = store_answer(&db, "conv1", answer).await.expect("store");
        assert_eq!(stored.role, MessageRole::Assistant);
        let fetched: Option<Message> = db.get_item(&stored.id).await.expect("fetch");
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn a_mid_stream_failure_aborts_collection() {
        let db = memory_db().await;
        let generator = Arc::new(ScriptedGenerator::failing_after(
            vec!["partial ".to_owned(), "answer".to_owned()],
            1,
        ));
        let service = chat_service(db, generator).await;

        let stream = service.respond("question", &[]).await;
        let err = collect_answer(stream)
            .await
            .expect_err("failure must abort collection");
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn the_apology_adapter_swallows_failures() {
        let db = memory_db().await;
        let generator = Arc::new(ScriptedGenerator::failing_after(
            vec!["partial".to_owned()],
            1,
        ));
        let service = chat_service(db, generator).await;

        let stream = with_apology(service.respond("question", &[]).await);
        let fragments: Vec<String> = stream
            .map(|item| item.expect("apology streams never error"))
            .collect()
            .await;

        assert_eq!(fragments, vec!["partial".to_owned(), GENERATION_APOLOGY.to_owned()]);
    }

    #[tokio::test]
    async fn cancellation_persists_nothing() {
        let db = memory_db().await;
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "first".to_owned(),
            "second".to_owned(),
        ]));
        let service = chat_service(Arc::clone(&db), generator).await;

        let mut stream = service.respond("question", &[]).await;
        let first = stream.next().await.expect("one fragment").expect("ok");
        assert_eq!(first, "first");
        drop(stream);

        let mut response = db
            .client
            .query("SELECT count() AS count FROM message GROUP ALL")
            .await
            .expect("query");
        let rows: Vec<std::collections::HashMap<String, usize>> =
            response.take(0).expect("rows");
        let stored = rows.first().and_then(|row| row.get("count")).copied();
        assert_eq!(stored.unwrap_or(0), 0, "no assistant turn was stored");
    }
}
