use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{chunk_index::ChunkIndex, db::SurrealDbClient, types::document::ProcessingStatus},
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use ingestion_pipeline::{
    ocr::OcrEngine, pdf::PageImage, DefaultPipelineServices, IngestionPipeline,
};
use retrieval_pipeline::{collect_answer, ChatService, Retriever, ScriptedGenerator};
use uuid::Uuid;

const DIM: usize = 16;

struct StubOcr;

#[async_trait]
impl OcrEngine for StubOcr {
    async fn recognize(&self, _image: &PageImage) -> Result<String, AppError> {
        Ok(String::new())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        openai_api_key: "test-key".into(),
        surrealdb_address: "mem://".into(),
        surrealdb_username: String::new(),
        surrealdb_password: String::new(),
        surrealdb_namespace: "test".into(),
        surrealdb_database: "test".into(),
        openai_base_url: "http://localhost/v1".into(),
        embedding_model: "hashed".into(),
        embedding_dimensions: DIM as u32,
        query_model: "scripted".into(),
        ocr_model: "stub".into(),
        chunk_size: 80,
        chunk_overlap: 16,
        max_context_chunks: 5,
        max_history_messages: 5,
    }
}

async fn build_stack() -> (IngestionPipeline, ChunkIndex, Arc<EmbeddingProvider>) {
    let db = Arc::new(
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb"),
    );
    let provider = Arc::new(EmbeddingProvider::new_hashed(DIM));
    let services = Arc::new(DefaultPipelineServices::with_ocr(
        &test_config(),
        Arc::clone(&provider),
        Arc::new(StubOcr),
    ));
    let index = ChunkIndex::new(Arc::clone(&db), provider.dimension());
    let pipeline = IngestionPipeline::with_services(db, index.clone(), services);
    pipeline.init().await.expect("index setup");

    (pipeline, index, provider)
}

#[tokio::test]
async fn ingested_text_is_retrievable_and_answerable() {
    let (pipeline, index, provider) = build_stack().await;

    let document = pipeline
        .register_document("handbook.md", None, "user1")
        .await
        .expect("register");
    assert_eq!(document.mime_type, "text/markdown");

    let body = "The deployment runbook lives in the operations handbook. \
                Rollbacks require a signed change ticket before execution. \
                On-call engineers rotate every Monday at 09:00 UTC.";
    pipeline
        .process_document(&document.id, body.as_bytes().to_vec())
        .await
        .expect("process");

    assert_eq!(
        pipeline.get_status(&document.id).await.expect("status"),
        ProcessingStatus::Completed
    );
    assert!(
        index
            .count_for_document(&document.id)
            .await
            .expect("count")
            > 1,
        "the body is long enough to produce several chunks"
    );

    let retriever = Retriever::new(index, provider);
    let hits = retriever
        .retrieve("when do on-call engineers rotate?", 3)
        .await
        .expect("retrieve");
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.document_id == document.id));

    let generator = Arc::new(ScriptedGenerator::new(vec![
        "Every Monday ".to_owned(),
        "at 09:00 UTC.".to_owned(),
    ]));
    let chat = ChatService::with_limits(retriever, generator, 5, 5);
    let answer = collect_answer(chat.respond("when do on-call engineers rotate?", &[]).await)
        .await
        .expect("collect");
    assert_eq!(answer, "Every Monday at 09:00 UTC.");
}

#[tokio::test]
async fn deleting_an_ingested_document_empties_its_index_entries() {
    let (pipeline, index, _provider) = build_stack().await;

    let document = pipeline
        .register_document("notes.txt", Some("text/plain"), "user1")
        .await
        .expect("register");
    pipeline
        .process_document(&document.id, b"short note about nothing in particular".to_vec())
        .await
        .expect("process");

    pipeline
        .delete_document(&document.id)
        .await
        .expect("delete");
    assert_eq!(
        index
            .count_for_document(&document.id)
            .await
            .expect("count"),
        0
    );
}
