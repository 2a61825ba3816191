//! Text-to-vector adapters.

use anyhow::Result;
use async_trait::async_trait;

pub mod openai;

/// Converts text into a fixed-length embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single piece of text. Any failure is a hard error.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
