pub mod chat;
pub mod generation;
pub mod prompt;
pub mod retriever;

pub use chat::{collect_answer, store_answer, ChatService, GENERATION_APOLOGY};
pub use generation::{AnswerStream, OpenAiGenerator, ResponseGenerator, ScriptedGenerator};
pub use prompt::CONTEXT_FALLBACK_PHRASE;
pub use retriever::Retriever;
