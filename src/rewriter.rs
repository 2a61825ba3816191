//! Turns a conversation into one self-contained search query.

use std::sync::Arc;

use crate::conversation::{Conversation, ConversationTurn};
use crate::llm::{LlmProvider, ProviderRequest};

const REWRITE_SYSTEM: &str = "You rewrite the user's latest message into a standalone search query \
for a directory of professor profiles. Resolve pronouns and vague references (\"she\", \"that lab\", \
\"the second one\") using the conversation. Keep the user's intent. Do not add names, facts, or \
details that are not in the conversation. Reply with the query only, on a single line.";

/// Resolves the latest user turn against recent history.
///
/// Rewriting never fails the request: a model error or empty reply falls back
/// to the latest user message verbatim.
pub struct QueryRewriter {
    llm: Arc<dyn LlmProvider>,
    history_turns: usize,
    temperature: f32,
    max_tokens: usize,
}

impl QueryRewriter {
    /// Builds a rewriter that shows the model at most `history_turns` turns.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        history_turns: usize,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            llm,
            history_turns: history_turns.max(1),
            temperature,
            max_tokens: max_tokens.max(1),
        }
    }

    /// Returns a non-empty standalone query.
    pub async fn rewrite(&self, conversation: &Conversation) -> String {
        let fallback = conversation.latest_question();
        let prompt = render_history(conversation.recent(self.history_turns));
        let request = ProviderRequest {
            system: REWRITE_SYSTEM,
            prompt: &prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        match self.llm.answer(&request).await {
            Ok(reply) => match clean_rewrite(&reply) {
                Some(query) => query,
                None => {
                    tracing::warn!("query rewrite came back empty; using the latest question");
                    fallback.to_string()
                }
            },
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "query rewrite failed; using the latest question");
                fallback.to_string()
            }
        }
    }
}

fn render_history(turns: &[ConversationTurn]) -> String {
    let mut prompt = String::from("Conversation:\n");
    for turn in turns {
        prompt.push_str(turn.role.label());
        prompt.push_str(": ");
        prompt.push_str(turn.content.trim());
        prompt.push('\n');
    }
    prompt.push_str("\nStandalone query:");
    prompt
}

/// First line that still holds text once labels and quotes are removed.
fn clean_rewrite(reply: &str) -> Option<String> {
    reply
        .lines()
        .map(|line| {
            strip_label(line.trim())
                .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`' | '“' | '”'))
                .trim()
        })
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn strip_label(line: &str) -> &str {
    const LABEL: &str = "standalone query:";
    match line.get(..LABEL.len()) {
        Some(head) if head.eq_ignore_ascii_case(LABEL) => line[LABEL.len()..].trim_start(),
        _ => line,
    }
}
