//! Qdrant collection search over the REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntryMetadata, IndexHit, SearchFilter, SearchRequest, VectorIndex};
use crate::retry::{is_retryable_error, retry_backoff, should_retry};

/// Payload keys the collection stores entry kind and owning document under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadKeys {
    /// Key holding `summary` / `chunk`.
    pub kind: String,
    /// Key holding the profile document id.
    pub doc_id: String,
}

impl Default for PayloadKeys {
    fn default() -> Self {
        Self {
            kind: "kind".to_string(),
            doc_id: "doc_id".to_string(),
        }
    }
}

/// Async client for one Qdrant collection.
#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    endpoint: String,
    vector_name: Option<String>,
    payload_keys: PayloadKeys,
    max_attempts: usize,
}

impl QdrantIndex {
    /// Builds a new Qdrant search client.
    ///
    /// # Arguments
    /// * `base_url` - Cluster URL, e.g. `http://127.0.0.1:6333`
    /// * `collection` - Collection holding summary and chunk points
    /// * `api_key` - Optional value for the `api-key` header
    /// * `vector_name` - Named vector to search when the collection has several
    pub fn new(
        base_url: String,
        collection: String,
        api_key: Option<String>,
        vector_name: Option<String>,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self> {
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "Qdrant URL must be an http(s) URL"
        );
        anyhow::ensure!(!collection.trim().is_empty(), "missing Qdrant collection name");
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key.as_deref().map(str::trim).filter(|key| !key.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key).context("invalid Qdrant API key")?,
            );
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;
        let endpoint = format!(
            "{}/collections/{}/points/search",
            base_url.trim_end_matches('/'),
            collection.trim()
        );
        Ok(Self {
            client,
            endpoint,
            vector_name,
            payload_keys: PayloadKeys::default(),
            max_attempts: max_attempts.max(1),
        })
    }

    /// Filters on custom payload keys, e.g. `type` / `docId` for camelCase collections.
    pub fn with_payload_keys(mut self, keys: PayloadKeys) -> Result<Self> {
        anyhow::ensure!(
            !keys.kind.trim().is_empty() && !keys.doc_id.trim().is_empty(),
            "Qdrant payload keys must not be empty"
        );
        self.payload_keys = PayloadKeys {
            kind: keys.kind.trim().to_string(),
            doc_id: keys.doc_id.trim().to_string(),
        };
        Ok(self)
    }

    fn request_body<'a>(&'a self, request: &'a SearchRequest<'a>) -> SearchBody<'a> {
        let vector = match &self.vector_name {
            Some(name) => QueryVector::Named {
                name,
                vector: request.vector,
            },
            None => QueryVector::Plain(request.vector),
        };
        SearchBody {
            vector,
            limit: request.top_k,
            filter: payload_filter(&request.filter, &self.payload_keys),
            with_payload: true,
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<Vec<IndexHit>> {
        let body = self.request_body(request);
        let mut attempt = 0usize;
        loop {
            match self.client.post(&self.endpoint).json(&body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let payload: SearchResponse = resp
                            .json()
                            .await
                            .context("failed to parse Qdrant search response")?;
                        return Ok(payload.into_hits());
                    }
                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_attempts {
                        attempt += 1;
                        tracing::warn!(%status, attempt, "retrying Qdrant search");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    anyhow::bail!("Qdrant search failed ({}): {}", status, text);
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_attempts {
                        attempt += 1;
                        tracing::warn!(error = %err, attempt, "retrying Qdrant search");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err).context("failed to call Qdrant search");
                }
            }
        }
    }
}

fn payload_filter<'a>(filter: &SearchFilter, keys: &'a PayloadKeys) -> PayloadFilter<'a> {
    let mut must = vec![FieldCondition {
        key: &keys.kind,
        r#match: MatchValue::Value(Value::String(filter.kind.as_str().to_string())),
    }];
    if let Some(doc_ids) = &filter.doc_ids {
        must.push(FieldCondition {
            key: &keys.doc_id,
            r#match: MatchValue::Any(doc_ids.iter().cloned().collect()),
        });
    }
    PayloadFilter { must }
}

#[derive(Serialize)]
struct SearchBody<'a> {
    vector: QueryVector<'a>,
    limit: usize,
    filter: PayloadFilter<'a>,
    with_payload: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum QueryVector<'a> {
    Plain(&'a [f32]),
    Named { name: &'a str, vector: &'a [f32] },
}

#[derive(Serialize)]
struct PayloadFilter<'a> {
    must: Vec<FieldCondition<'a>>,
}

#[derive(Serialize)]
struct FieldCondition<'a> {
    key: &'a str,
    r#match: MatchValue,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum MatchValue {
    Value(Value),
    Any(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<EntryMetadata>,
}

impl SearchResponse {
    fn into_hits(self) -> Vec<IndexHit> {
        self.result
            .into_iter()
            .map(|point| IndexHit {
                id: match point.id {
                    Value::String(id) => id,
                    other => other.to_string(),
                },
                score: point.score,
                metadata: point.payload.unwrap_or_default(),
            })
            .collect()
    }
}
