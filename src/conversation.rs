//! Conversation turns supplied by the caller with every request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InputValidationError;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user asking questions.
    User,
    /// Previous model answers.
    Assistant,
    /// Operator instructions injected by the client.
    System,
}

impl Role {
    /// Label used when rendering history into prompts.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        })
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who wrote the message.
    pub role: Role,
    /// Message body.
    pub content: String,
}

impl ConversationTurn {
    /// Convenience constructor for a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chronologically ordered turns whose last entry is a non-empty user message.
///
/// Only [`Conversation::new`] builds this type, so holding one proves the
/// inbound validation rules were checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    /// Validates caller-supplied turns.
    pub fn new(turns: Vec<ConversationTurn>) -> Result<Self, InputValidationError> {
        let last = turns.last().ok_or(InputValidationError::EmptyConversation)?;
        if last.role != Role::User {
            return Err(InputValidationError::LastTurnNotUser(last.role));
        }
        if last.content.trim().is_empty() {
            return Err(InputValidationError::EmptyUserMessage);
        }
        Ok(Self { turns })
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The most recent `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit.max(1));
        &self.turns[start..]
    }

    /// Trimmed text of the final user turn; never empty.
    pub fn latest_question(&self) -> &str {
        // `new` guarantees at least one turn.
        self.turns
            .last()
            .map(|turn| turn.content.trim())
            .unwrap_or_default()
    }
}
