//! Conversation window sent to the model.

use crate::llm::{ChatMessage, Role};

/// Keep at most `max` of the most recent messages.
///
/// Trailing messages are dropped until the window ends on a user or tool
/// message, and leading messages are dropped until it starts on a user
/// message, so a tool result is never separated from the call that produced
/// it. System messages are always kept, in front, and count toward `max`.
pub fn trim_history(messages: &[ChatMessage], max: usize) -> Vec<ChatMessage> {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        messages.iter().partition(|m| m.role == Role::System);

    let end = rest
        .iter()
        .rposition(|m| matches!(m.role, Role::User | Role::Tool))
        .map_or(0, |i| i + 1);
    let rest = &rest[..end];

    let budget = max.saturating_sub(system.len());
    let tail = &rest[rest.len().saturating_sub(budget)..];
    let start = tail
        .iter()
        .position(|m| m.role == Role::User)
        .unwrap_or(tail.len());

    system
        .into_iter()
        .chain(tail[start..].iter().copied())
        .cloned()
        .collect()
}
