//! Grounded answer generation over assembled context.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::llm::{LlmProvider, ProviderRequest};

const ANSWER_SYSTEM: &str = "You answer questions about university professors using only the \
profile excerpts supplied in the context. If the excerpts do not contain the information, say \
plainly that it is not available in the profiles instead of guessing. Write for the person who \
asked: do not mention excerpts, records, numbering, search, retrieval, indexes, embeddings, or \
how the information was obtained.";

/// Wraps the answer model call.
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl AnswerGenerator {
    /// Creates a generator with fixed sampling parameters.
    pub fn new(llm: Arc<dyn LlmProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            llm,
            temperature,
            max_tokens: max_tokens.max(1),
        }
    }

    /// Produces answer text; an empty reply is an error.
    pub async fn generate(&self, question: &str, context_block: &str) -> Result<String> {
        let prompt = build_prompt(question, context_block);
        let request = ProviderRequest {
            system: ANSWER_SYSTEM,
            prompt: &prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let answer = self.llm.answer(&request).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            bail!("answer model returned no text");
        }
        Ok(answer.to_string())
    }
}

fn build_prompt(question: &str, context_block: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Context:\n");
    prompt.push_str(context_block);
    prompt.push_str("\n\nQuestion:\n");
    prompt.push_str(question);
    prompt.push_str(
        "\n\nInstructions:\n1. Answer only from the context above.\n2. If the context does not \
         cover the question, say the profiles do not include that information.\n3. Name the \
         professors you draw on.\n",
    );
    prompt
}
