//! Conversation building

use crate::agent::types::{Conversation, Message};

/// First-turn assembly for an agent request.
///
/// A non-empty `existing` conversation only gains the user message. Otherwise
/// a single SYSTEM message is synthesized from the trimmed system and tool
/// prompts (blank-line separated, empty parts skipped) ahead of it.
pub fn build_conversation(
    existing: Option<&Conversation>,
    user_message: &str,
    system_prompt: Option<&str>,
    tool_prompt: Option<&str>,
) -> Conversation {
    let base = match existing {
        Some(conversation) => conversation.clone(),
        None => Conversation::new(),
    };

    if !base.is_empty() {
        return base.with_message(Message::user(user_message));
    }

    let system_parts: Vec<&str> = [system_prompt, tool_prompt]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let mut messages = Vec::with_capacity(2);
    if !system_parts.is_empty() {
        messages.push(Message::system(system_parts.join("\n\n")));
    }
    messages.push(Message::user(user_message));

    base.with_messages(messages)
}
