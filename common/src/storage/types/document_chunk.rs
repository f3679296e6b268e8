use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{record, StoredObject};

/// Persisted unit of the vector index. The record key is derived from
/// `(document_id, chunk_index)` so re-upserting the same chunk replaces the
/// prior record instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentChunk {
    #[serde(deserialize_with = "record::deserialize_id")]
    pub id: String,
    #[serde(with = "record::datetime", default)]
    pub created_at: DateTime<Utc>,
    #[serde(with = "record::datetime", default)]
    pub updated_at: DateTime<Utc>,
    pub document_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl StoredObject for DocumentChunk {
    fn table_name() -> &'static str {
        "document_chunk"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl DocumentChunk {
    pub fn new(document_id: String, chunk_index: u32, text: String, embedding: Vec<f32>) -> Self {
        let (created_at, updated_at) = record::now_pair();
        Self {
            id: Self::record_key(&document_id, chunk_index),
            created_at,
            updated_at,
            document_id,
            chunk_index,
            text,
            embedding,
        }
    }

    pub fn record_key(document_id: &str, chunk_index: u32) -> String {
        format!("{document_id}_{chunk_index}")
    }
}
