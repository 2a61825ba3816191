//! Language model adapters used for query rewriting and answer generation.

use anyhow::Result;
use async_trait::async_trait;

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the model's text reply. Transport and API failures are errors;
    /// an empty reply is returned as-is for the caller to judge.
    async fn answer(&self, request: &ProviderRequest<'_>) -> Result<String>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// Instructions sent as the system message.
    pub system: &'a str,
    /// User-facing prompt body.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token cap.
    pub max_tokens: usize,
}
