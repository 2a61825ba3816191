//! Error taxonomy surfaced by the answer pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::conversation::Role;

/// Reasons an inbound conversation is rejected before any outbound call.
#[derive(Debug, Error)]
pub enum InputValidationError {
    /// No turns were supplied.
    #[error("conversation must contain at least one message")]
    EmptyConversation,
    /// The newest turn was not written by the user.
    #[error("last message must come from the user, got {0}")]
    LastTurnNotUser(Role),
    /// The newest user turn is blank.
    #[error("last user message must not be empty")]
    EmptyUserMessage,
}

/// Hard failures that terminate a request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Conversation failed validation.
    #[error(transparent)]
    InvalidInput(#[from] InputValidationError),
    /// Embedding or index search failed.
    #[error("retrieval failed: {0:#}")]
    Retrieval(#[source] anyhow::Error),
    /// The answer model failed or returned nothing.
    #[error("answer generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),
    /// The request exceeded its deadline and in-flight calls were abandoned.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl PipelineError {
    /// Short machine-friendly label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Retrieval(_) => "retrieval",
            PipelineError::Generation(_) => "generation",
            PipelineError::Timeout(_) => "timeout",
        }
    }
}
