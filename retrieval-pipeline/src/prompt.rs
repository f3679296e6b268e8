use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
};

use common::{
    error::AppError,
    storage::types::message::{Message, MessageRole},
};

/// The phrase the model is instructed to emit when the context does not
/// contain the answer.
pub const CONTEXT_FALLBACK_PHRASE: &str = "I don't have enough information to answer that.";

const SYSTEM_PROMPT_BASE: &str = "You are a helpful AI assistant that answers questions based on the provided context.";

fn system_prompt(context_texts: &[String]) -> String {
    let base = format!(
        "{SYSTEM_PROMPT_BASE}\n\
         If the answer cannot be found in the context, say \"{CONTEXT_FALLBACK_PHRASE}\"\n\
         Always be clear, concise, and accurate."
    );

    if context_texts.is_empty() {
        return base;
    }

    format!("{base}\n\nContext:\n{}", context_texts.join("\n\n"))
}

/// Assembles the message sequence for one generation call: the grounding
/// system prompt, then the last `max_history` turns in their original order,
/// then the query as the final user message. Pure and deterministic.
pub fn build_messages(
    query: &str,
    context_texts: &[String],
    history: &[Message],
    max_history: usize,
) -> Result<Vec<ChatCompletionRequestMessage>, AppError> {
    let recent = &history[history.len().saturating_sub(max_history)..];

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatCompletionRequestSystemMessage::from(system_prompt(context_texts)).into());

    for turn in recent {
        let message = match turn.role {
            MessageRole::User => {
                ChatCompletionRequestUserMessage::from(turn.content.clone()).into()
            }
            MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
        };
        messages.push(message);
    }

    messages.push(ChatCompletionRequestUserMessage::from(query.to_owned()).into());
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::types::{
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageContent,
    };

    fn history_of(turns: &[(MessageRole, &str)]) -> Vec<Message> {
        turns
            .iter()
            .map(|(role, content)| {
                Message::new("conv1".into(), role.clone(), (*content).to_owned())
            })
            .collect()
    }

    fn system_text(message: &ChatCompletionRequestMessage) -> &str {
        match message {
            ChatCompletionRequestMessage::System(system) => match &system.content {
                ChatCompletionRequestSystemMessageContent::Text(text) => text,
                ChatCompletionRequestSystemMessageContent::Array(_) => {
                    panic!("system prompt is plain text")
                }
            },
            other => panic!("expected a system message, got {other:?}"),
        }
    }

    fn user_text(message: &ChatCompletionRequestMessage) -> &str {
        match message {
            ChatCompletionRequestMessage::User(user) => match &user.content {
                ChatCompletionRequestUserMessageContent::Text(text) => text,
                ChatCompletionRequestUserMessageContent::Array(_) => {
                    panic!("user turns are plain text")
                }
            },
            other => panic!("expected a user message, got {other:?}"),
        }
    }

    #[test]
    fn system_history_query_in_that_order() {
        let history = history_of(&[
            (MessageRole::User, "first question"),
            (MessageRole::Assistant, "first answer"),
        ]);

        let messages = build_messages("second question", &["ctx".to_owned()], &history, 5)
            .expect("build");

        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert_eq!(user_text(&messages[1]), "first question");
        assert!(matches!(
            messages[2],
            ChatCompletionRequestMessage::Assistant(_)
        ));
        assert_eq!(user_text(&messages[3]), "second question");
    }

    #[test]
    fn history_is_capped_to_the_most_recent_turns() {
        let history = history_of(&[
            (MessageRole::User, "q1"),
            (MessageRole::Assistant, "a1"),
            (MessageRole::User, "q2"),
            (MessageRole::Assistant, "a2"),
        ]);

        let messages = build_messages("q3", &[], &history, 2).expect("build");

        // system + 2 recent turns + query
        assert_eq!(messages.len(), 4);
        assert_eq!(user_text(&messages[1]), "q2");
    }

    #[test]
    fn context_and_fallback_phrase_appear_in_the_system_prompt() {
        let context = vec!["alpha chunk".to_owned(), "beta chunk".to_owned()];
        let messages = build_messages("q", &context, &[], 5).expect("build");

        let prompt = system_text(&messages[0]);
        assert!(prompt.contains(CONTEXT_FALLBACK_PHRASE));
        assert!(prompt.contains("alpha chunk\n\nbeta chunk"));
    }

    #[test]
    fn empty_context_omits_the_context_block() {
        let messages = build_messages("q", &[], &[], 5).expect("build");
        let prompt = system_text(&messages[0]);
        assert!(!prompt.contains("Context:"));
        assert!(prompt.contains(CONTEXT_FALLBACK_PHRASE));
    }

    #[test]
    fn assembly_is_deterministic() {
        let history = history_of(&[(MessageRole::User, "q1")]);
        let context = vec!["ctx".to_owned()];

        let first = build_messages("q", &context, &history, 5).expect("build");
        let second = build_messages("q", &context, &history, 5).expect("build");
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }
}
