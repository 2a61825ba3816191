use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use profrag::server::{AnswerResponse, ErrorBody};
use profrag::{ClientMatch, ConversationTurn};
use reqwest::blocking::Client;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "profrag-ask",
    about = "Ask profrag-server a question about the professor profiles"
)]
struct AskCli {
    /// Question to ask
    #[arg(long)]
    question: String,

    /// JSON file holding earlier turns ([{"role": "...", "content": "..."}])
    #[arg(long)]
    history: Option<PathBuf>,

    /// Answer endpoint
    #[arg(
        long,
        env = "PROFRAG_SERVER_URL",
        default_value = "http://127.0.0.1:8080/v1/answer"
    )]
    server_url: String,

    /// Seconds to wait for the server
    #[arg(long, default_value_t = 90)]
    timeout_secs: u64,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    messages: &'a [ConversationTurn],
}

fn main() -> Result<()> {
    let cli = AskCli::parse();
    let mut messages = match &cli.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };
    messages.push(ConversationTurn::user(cli.question.clone()));

    let client = Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs.max(1)))
        .build()
        .context("failed to build HTTP client")?;
    let resp = client
        .post(&cli.server_url)
        .json(&AskRequest {
            messages: &messages,
        })
        .send()
        .with_context(|| format!("failed to call profrag-server at {}", cli.server_url))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or(body);
        bail!("server returned {}: {}", status, message);
    }
    let parsed: AnswerResponse = resp.json().context("failed to parse server response")?;

    if let Some(query) = &parsed.rewritten_query {
        println!("(searched for: {query})\n");
    }
    println!("{}", parsed.answer);
    if !parsed.matches.is_empty() {
        println!("\nSources:");
        for (idx, found) in parsed.matches.iter().enumerate() {
            println!("[{}] {}", idx + 1, render_source(found));
        }
    }
    Ok(())
}

fn load_history(path: &Path) -> Result<Vec<ConversationTurn>> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse conversation history in {:?}", path))
}

fn render_source(found: &ClientMatch) -> String {
    let mut parts = vec![if found.professor_name.is_empty() {
        "(unknown professor)".to_string()
    } else {
        found.professor_name.clone()
    }];
    if !found.section_block.is_empty() {
        parts.push(found.section_block.clone());
    }
    if !found.source_url.is_empty() {
        parts.push(found.source_url.clone());
    }
    format!("{} ({:.3})", parts.join(" | "), found.score)
}
