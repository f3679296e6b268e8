use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{chunk_index::ChunkIndex, db::SurrealDbClient},
};

use super::{record, StoredObject};

/// Lifecycle of an uploaded document. Transitions are owned exclusively by
/// the ingestion coordinator; the only backwards edge is the manual
/// `Failed -> Pending` retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "Pending",
            ProcessingStatus::Processing => "Processing",
            ProcessingStatus::Completed => "Completed",
            ProcessingStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(deserialize_with = "record::deserialize_id")]
    pub id: String,
    #[serde(with = "record::datetime", default)]
    pub created_at: DateTime<Utc>,
    #[serde(with = "record::datetime", default)]
    pub updated_at: DateTime<Utc>,
    pub file_name: String,
    pub mime_type: String,
    pub owner_id: String,
    pub status: ProcessingStatus,
}

impl StoredObject for Document {
    fn table_name() -> &'static str {
        "document"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl Document {
    pub fn new(file_name: String, mime_type: String, owner_id: String) -> Self {
        let (created_at, updated_at) = record::now_pair();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            updated_at,
            file_name,
            mime_type,
            owner_id,
            status: ProcessingStatus::Pending,
        }
    }

    pub async fn get_status(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<ProcessingStatus, AppError> {
        let document: Option<Document> = db.get_item(document_id).await?;
        document
            .map(|doc| doc.status)
            .ok_or_else(|| AppError::NotFound(format!("document {document_id}")))
    }

    pub async fn mark_processing(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        Self::transition(
            document_id,
            &[ProcessingStatus::Pending],
            ProcessingStatus::Processing,
            db,
        )
        .await
    }

    pub async fn mark_completed(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        Self::transition(
            document_id,
            &[ProcessingStatus::Processing],
            ProcessingStatus::Completed,
            db,
        )
        .await
    }

    pub async fn mark_failed(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        Self::transition(
            document_id,
            &[ProcessingStatus::Processing],
            ProcessingStatus::Failed,
            db,
        )
        .await
    }

    /// Manual retry hook for the external task layer.
    pub async fn mark_retryable(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        Self::transition(
            document_id,
            &[ProcessingStatus::Failed],
            ProcessingStatus::Pending,
            db,
        )
        .await
    }

    /// Removes the document and every index record derived from it. Index
    /// records go first so a crash between the two deletes cannot leave
    /// orphaned chunks behind a missing document.
    pub async fn delete(
        document_id: &str,
        db: &SurrealDbClient,
        index: &ChunkIndex,
    ) -> Result<(), AppError> {
        index.delete_by_document(document_id).await?;
        let _: Option<Document> = db.delete_item(document_id).await?;
        Ok(())
    }

    async fn transition(
        document_id: &str,
        allowed_from: &[ProcessingStatus],
        to: ProcessingStatus,
        db: &SurrealDbClient,
    ) -> Result<Document, AppError> {
        let mut response = db
            .client
            .query(
                "UPDATE type::thing('document', $id) \
                 SET status = $to, updated_at = time::now() \
                 WHERE status IN $from RETURN AFTER",
            )
            .bind(("id", document_id.to_owned()))
            .bind(("to", to))
            .bind(("from", allowed_from.to_vec()))
            .await?;

        let updated: Option<Document> = response.take(0)?;
        match updated {
            Some(document) => Ok(document),
            None => {
                let current: Option<Document> = db.get_item(document_id).await?;
                match current {
                    Some(document) => Err(AppError::Validation(format!(
                        "invalid status transition {} -> {to} for document {document_id}",
                        document.status
                    ))),
                    None => Err(AppError::NotFound(format!("document {document_id}"))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    fn sample_document() -> Document {
        Document::new(
            "report.pdf".into(),
            "application/pdf".into(),
            "user123".into(),
        )
    }

    #[tokio::test]
    async fn new_documents_start_pending() {
        let document = sample_document();
        assert_eq!(document.status, ProcessingStatus::Pending);
        assert!(!document.id.is_empty());
    }

    #[tokio::test]
    async fn status_walks_the_happy_path() {
        let db = memory_db().await;
        let document = sample_document();
        let id = document.id.clone();
        db.store_item(document).await.expect("store document");

        let doc = Document::mark_processing(&id, &db).await.expect("processing");
        assert_eq!(doc.status, ProcessingStatus::Processing);

        let doc = Document::mark_completed(&id, &db).await.expect("completed");
        assert_eq!(doc.status, ProcessingStatus::Completed);

        assert_eq!(
            Document::get_status(&id, &db).await.expect("status"),
            ProcessingStatus::Completed
        );
    }

    #[tokio::test]
    async fn failed_documents_can_be_retried() {
        let db = memory_db().await;
        let document = sample_document();
        let id = document.id.clone();
        db.store_item(document).await.expect("store document");

        Document::mark_processing(&id, &db).await.expect("processing");
        Document::mark_failed(&id, &db).await.expect("failed");

        let doc = Document::mark_retryable(&id, &db).await.expect("retry");
        assert_eq!(doc.status, ProcessingStatus::Pending);
    }

    #[tokio::test]
    async fn completed_documents_reject_further_transitions() {
        let db = memory_db().await;
        let document = sample_document();
        let id = document.id.clone();
        db.store_item(document).await.expect("store document");

        Document::mark_processing(&id, &db).await.expect("processing");
        Document::mark_completed(&id, &db).await.expect("completed");

        let err = Document::mark_processing(&id, &db)
            .await
            .expect_err("completed documents must not re-enter processing");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn transitions_on_unknown_documents_are_not_found() {
        let db = memory_db().await;
        let err = Document::mark_processing("missing", &db)
            .await
            .expect_err("unknown document");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
