#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use profrag::{
    Embedder, EntryKind, EntryMetadata, GenerationSettings, IndexHit, LlmProvider, Orchestrator,
    PipelineClients, PipelineSettings, ProviderRequest, SearchFilter, SearchRequest, VectorIndex,
};

pub struct CountingEmbedder {
    pub calls: AtomicUsize,
    fail: bool,
    delay: Option<Duration>,
}

impl CountingEmbedder {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            delay: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
            delay: None,
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(anyhow!("embedding service unavailable"));
        }
        Ok(vec![0.1, 0.2, 0.3])
    }
}

/// Answers summary, scoped-chunk and global-chunk searches from fixed lists.
pub struct ScriptedIndex {
    summaries: Vec<IndexHit>,
    scoped_chunks: Vec<IndexHit>,
    global_chunks: Vec<IndexHit>,
    filters: Mutex<Vec<SearchFilter>>,
}

impl ScriptedIndex {
    pub fn new(
        summaries: Vec<IndexHit>,
        scoped_chunks: Vec<IndexHit>,
        global_chunks: Vec<IndexHit>,
    ) -> Arc<Self> {
        Arc::new(Self {
            summaries,
            scoped_chunks,
            global_chunks,
            filters: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.filters.lock().expect("lock").len()
    }

    pub fn filters(&self) -> Vec<SearchFilter> {
        self.filters.lock().expect("lock").clone()
    }
}

#[async_trait]
impl VectorIndex for ScriptedIndex {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<IndexHit>> {
        self.filters
            .lock()
            .expect("lock")
            .push(request.filter.clone());
        let pool = match (request.filter.kind, &request.filter.doc_ids) {
            (EntryKind::Summary, _) => &self.summaries,
            (EntryKind::Chunk, Some(_)) => &self.scoped_chunks,
            (EntryKind::Chunk, None) => &self.global_chunks,
        };
        Ok(pool.iter().take(request.top_k).cloned().collect())
    }
}

pub struct ScriptedLlm {
    reply: Result<String, String>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn replying(reply: &str) -> Arc<Self> {
        Self::build(Ok(reply.to_string()))
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::build(Err(message.to_string()))
    }

    fn build(reply: Result<String, String>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("lock").last().cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn answer(&self, request: &ProviderRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("lock")
            .push(request.prompt.to_string());
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}

pub fn summary(doc: &str, score: f32) -> IndexHit {
    IndexHit {
        id: format!("summary-{doc}"),
        score,
        metadata: EntryMetadata {
            kind: Some(EntryKind::Summary),
            doc_id: Some(doc.to_string()),
            text: format!("Summary of {doc}"),
            ..EntryMetadata::default()
        },
    }
}

pub fn chunk(doc: &str, section: &str, idx: usize, score: f32) -> IndexHit {
    IndexHit {
        id: format!("{doc}-{idx}"),
        score,
        metadata: EntryMetadata {
            kind: Some(EntryKind::Chunk),
            doc_id: Some(doc.to_string()),
            section_block: section.to_string(),
            text: format!("Professor {doc} passage {idx} about quantum cryptography research."),
            source_url: format!("https://faculty.example.edu/{doc}"),
            professor_name: format!("Prof {doc}"),
        },
    }
}

pub struct Harness {
    pub embedder: Arc<CountingEmbedder>,
    pub index: Arc<ScriptedIndex>,
    pub rewrite_llm: Arc<ScriptedLlm>,
    pub answer_llm: Arc<ScriptedLlm>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new(
        embedder: Arc<CountingEmbedder>,
        index: Arc<ScriptedIndex>,
        rewrite_llm: Arc<ScriptedLlm>,
        answer_llm: Arc<ScriptedLlm>,
    ) -> Self {
        let clients = PipelineClients {
            embedder: embedder.clone(),
            index: index.clone(),
            rewrite_llm: rewrite_llm.clone(),
            answer_llm: answer_llm.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(
            clients,
            PipelineSettings::default(),
            GenerationSettings::default(),
        ));
        Self {
            embedder,
            index,
            rewrite_llm,
            answer_llm,
            orchestrator,
        }
    }

    /// Two routed professors with plenty of scoped chunks.
    pub fn well_routed() -> Self {
        Self::new(
            CountingEmbedder::ok(),
            ScriptedIndex::new(
                vec![summary("alice", 0.92), summary("bob", 0.88), summary("alice", 0.80)],
                scoped_pool(),
                global_pool(),
            ),
            ScriptedLlm::replying("Who works on quantum cryptography?"),
            ScriptedLlm::replying("Prof alice and Prof bob both work on quantum cryptography."),
        )
    }
}

pub fn scoped_pool() -> Vec<IndexHit> {
    vec![
        chunk("alice", "Research", 1, 0.91),
        chunk("alice", "Research", 2, 0.89),
        chunk("bob", "Research", 3, 0.87),
        chunk("bob", "Publications", 4, 0.85),
        chunk("alice", "Teaching", 5, 0.80),
        chunk("bob", "", 6, 0.78),
        chunk("alice", "Awards", 7, 0.75),
    ]
}

pub fn global_pool() -> Vec<IndexHit> {
    (0..12)
        .map(|idx| {
            let doc = format!("global{}", idx % 5);
            let section = format!("Section {}", idx % 4);
            chunk(&doc, &section, 100 + idx, 0.7 - idx as f32 * 0.01)
        })
        .collect()
}
