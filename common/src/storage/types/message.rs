use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{record, StoredObject};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn of a conversation. Messages are append-only: history is read as
/// bounded look-back context and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(deserialize_with = "record::deserialize_id")]
    pub id: String,
    #[serde(with = "record::datetime", default)]
    pub created_at: DateTime<Utc>,
    #[serde(with = "record::datetime", default)]
    pub updated_at: DateTime<Utc>,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
}

impl StoredObject for Message {
    fn table_name() -> &'static str {
        "message"
    }

    fn get_id(&self) -> &str {
        &self.id
    }
}

impl Message {
    pub fn new(conversation_id: String, role: MessageRole, content: String) -> Self {
        let (created_at, updated_at) = record::now_pair();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at,
            updated_at,
            conversation_id,
            role,
            content,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "User"),
            MessageRole::Assistant => write!(f, "Assistant"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;

    #[test]
    fn messages_format_with_their_role() {
        let message = Message::new(
            "conv1".into(),
            MessageRole::Assistant,
            "Grounded answer".into(),
        );
        assert_eq!(format!("{message}"), "Assistant: Grounded answer");
    }

    #[tokio::test]
    async fn messages_round_trip_through_storage() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");

        let message = Message::new("conv1".into(), MessageRole::User, "Hello".into());
        let id = message.id.clone();
        db.store_item(message.clone()).await.expect("store message");

        let fetched: Option<Message> = db.get_item(&id).await.expect("fetch message");
        let fetched = fetched.expect("message should exist");
        assert_eq!(fetched.content, "Hello");
        assert_eq!(fetched.role, MessageRole::User);
    }
}
