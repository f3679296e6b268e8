use std::{pin::Pin, sync::Arc};

use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs},
    Client,
};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};

use common::error::AppError;

const GENERATION_MAX_TOKENS: u32 = 1000;
const GENERATION_TEMPERATURE: f32 = 0.7;

/// A finite, single-pass stream of answer fragments. Dropping it before the
/// end closes the upstream connection.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, AppError>> + Send>>;

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Opens a fresh upstream stream for the given message sequence.
    async fn generate(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<AnswerStream, AppError>;
}

/// Streams completions from the chat API, forwarding non-empty content
/// deltas. An upstream error ends the stream with a single `Err` item.
pub struct OpenAiGenerator {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ResponseGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<AnswerStream, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .temperature(GENERATION_TEMPERATURE)
            .max_tokens(GENERATION_MAX_TOKENS)
            .build()?;

        let mut upstream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream! {
            while let Some(result) = upstream.next().await {
                match result {
                    Ok(chunk) => {
                        let content = chunk
                            .choices
                            .first()
                            .and_then(|choice| choice.delta.content.clone())
                            .unwrap_or_default();
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                    Err(err) => {
                        yield Err(AppError::Generation(err.to_string()));
                        return;
                    }
                }
            }
        }))
    }
}

/// Deterministic generator used by tests: replays fixed fragments and can
/// inject a failure after a given number of them.
pub struct ScriptedGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
}

impl ScriptedGenerator {
    pub fn new(fragments: Vec<String>) -> Self {
        Self {
            fragments,
            fail_after: None,
        }
    }

    pub fn failing_after(fragments: Vec<String>, fail_after: usize) -> Self {
        Self {
            fragments,
            fail_after: Some(fail_after),
        }
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<AnswerStream, AppError> {
        let fragments = self.fragments.clone();
        let fail_after = self.fail_after;

        Ok(Box::pin(stream! {
            let total = fragments.len();
            for (emitted, fragment) in fragments.into_iter().enumerate() {
                if fail_after == Some(emitted) {
                    yield Err(AppError::Generation("scripted stream failure".into()));
                    return;
                }
                yield Ok(fragment);
            }
            if fail_after.is_some_and(|limit| limit >= total) {
                yield Err(AppError::Generation("scripted stream failure".into()));
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_fragments_replay_in_order() {
        let generator =
            ScriptedGenerator::new(vec!["Hello".to_owned(), ", ".to_owned(), "world".to_owned()]);
        let stream = generator.generate(Vec::new()).await.expect("generate");

        let fragments: Vec<Result<String, AppError>> = stream.collect().await;
        let joined: String = fragments
            .into_iter()
            .map(|f| f.expect("no failure scripted"))
            .collect();
        assert_eq!(joined, "Hello, world");
    }

    #[tokio::test]
    async fn scripted_failure_ends_the_stream() {
        let generator =
            ScriptedGenerator::failing_after(vec!["partial".to_owned(), "never".to_owned()], 1);
        let stream = generator.generate(Vec::new()).await.expect("generate");

        let items: Vec<Result<String, AppError>> = stream.collect().await;
        assert_eq!(items.len(), 2, "nothing is emitted after the failure");
        assert_eq!(items[0].as_deref().expect("first fragment"), "partial");
        assert!(items[1].is_err());
    }
}
