// Client for a Pinecone-compatible vector database
// The control plane manages indexes, the data plane (per-index host) stores and queries vectors


use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::{IndexRecord, SearchResult, VectorIndex};
use crate::RagError;
use crate::config::PineconeConfig;
use crate::http::HttpClient;

const API_KEY_HEADER: &str = "Api-Key";
const API_VERSION_HEADER: &str = "X-Pinecone-API-Version";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

/// An index as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<u32>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub host: String,
    pub status: IndexStatus,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: ServerlessSpec<'a>,
}

#[derive(Debug, Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Debug, Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    vectors: Vec<VectorPayload>,
}

#[derive(Debug, Serialize)]
struct VectorPayload {
    id: String,
    values: Vec<f32>,
    metadata: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

/// Control-plane client: lists, describes and creates indexes
#[derive(Debug, Clone)]
pub struct PineconeClient {
    control_url: Url,
    api_key: String,
    api_version: String,
    cloud: String,
    region: String,
    metric: String,
    dimension: usize,
    upsert_batch_size: usize,
    ready_poll_attempts: u32,
    ready_poll_interval: Duration,
    http: HttpClient,
}

impl PineconeClient {
    /// `environment` is the serverless region new indexes are created in
    #[inline]
    pub fn new(
        config: &PineconeConfig,
        api_key: &str,
        environment: &str,
        dimension: usize,
    ) -> Result<Self> {
        let control_url = config
            .control_url()
            .context("Failed to parse Pinecone control URL from config")?;

        Ok(Self {
            control_url,
            api_key: api_key.to_string(),
            api_version: config.api_version.clone(),
            cloud: config.cloud.clone(),
            region: environment.to_string(),
            metric: config.metric.clone(),
            dimension,
            upsert_batch_size: config.upsert_batch_size.max(1) as usize,
            ready_poll_attempts: config.ready_poll_attempts.max(1),
            ready_poll_interval: Duration::from_millis(config.ready_poll_interval_ms),
            http: HttpClient::new(
                Duration::from_secs(config.timeout_seconds),
                config.retry_attempts,
            ),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            (API_KEY_HEADER, self.api_key.as_str()),
            (API_VERSION_HEADER, self.api_version.as_str()),
        ]
    }

    #[inline]
    pub fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let url = self
            .control_url
            .join("indexes")
            .context("Failed to build list indexes URL")?;
        let response_text = self
            .http
            .get(&url, &self.headers())
            .context("Failed to list indexes")?;
        let list: IndexList =
            serde_json::from_str(&response_text).context("Failed to parse index list")?;
        Ok(list.indexes)
    }

    #[inline]
    pub fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = self
            .control_url
            .join(&format!("indexes/{}", name))
            .context("Failed to build describe index URL")?;
        let response_text = self
            .http
            .get(&url, &self.headers())
            .with_context(|| format!("Failed to describe index '{}'", name))?;
        serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse description of index '{}'", name))
    }

    /// Create a serverless index with this client's dimension and metric
    #[inline]
    pub fn create_index(&self, name: &str) -> Result<IndexDescription> {
        let url = self
            .control_url
            .join("indexes")
            .context("Failed to build create index URL")?;

        let request = CreateIndexRequest {
            name,
            dimension: self.dimension,
            metric: &self.metric,
            spec: ServerlessSpec {
                serverless: CloudRegion {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };

        info!(
            "Creating index '{}' ({} dimensions, {} metric) in {}/{}",
            name, self.dimension, self.metric, self.cloud, self.region
        );

        let response_text = self
            .http
            .post_json(&url, &self.headers(), &request)
            .with_context(|| format!("Failed to create index '{}'", name))?;
        serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse created index '{}'", name))
    }

    /// Poll the control plane until the index reports ready
    #[inline]
    pub fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        for attempt in 1..=self.ready_poll_attempts {
            let description = self.describe_index(name)?;
            if description.status.ready {
                debug!("Index '{}' ready after {} polls", name, attempt);
                return Ok(description);
            }

            debug!(
                "Index '{}' not ready (state: {}), poll {}/{}",
                name, description.status.state, attempt, self.ready_poll_attempts
            );
            if attempt < self.ready_poll_attempts {
                std::thread::sleep(self.ready_poll_interval);
            }
        }

        Err(anyhow::anyhow!(
            "Index '{}' was not ready after {} polls",
            name,
            self.ready_poll_attempts
        ))
    }

    /// Connect to `name`, creating it first when it does not exist
    #[inline]
    pub fn create_or_connect(&self, name: &str) -> crate::Result<PineconeIndex> {
        let exists = self
            .list_indexes()
            .map_err(|e| RagError::Index(format!("{:#}", e)))?
            .iter()
            .any(|index| index.name == name);

        let description = if exists {
            info!("Using existing index '{}'", name);
            self.describe_index(name)
        } else {
            self.create_index(name)
                .and_then(|_| self.wait_until_ready(name))
        }
        .map_err(|e| RagError::Index(format!("{:#}", e)))?;

        if let Some(dimension) = description.dimension {
            if dimension as usize != self.dimension {
                warn!(
                    "Index '{}' has dimension {}, embeddings have {}",
                    name, dimension, self.dimension
                );
            }
        }

        self.index_for(&description)
    }

    fn index_for(&self, description: &IndexDescription) -> crate::Result<PineconeIndex> {
        let host = data_plane_url(&description.host).map_err(|e| {
            RagError::Index(format!(
                "Index '{}' has an unusable host '{}': {:#}",
                description.name, description.host, e
            ))
        })?;

        Ok(PineconeIndex {
            name: description.name.clone(),
            host,
            api_key: self.api_key.clone(),
            api_version: self.api_version.clone(),
            batch_size: self.upsert_batch_size,
            http: self.http.clone(),
        })
    }
}

/// Data-plane URL for an index host; bare hostnames are served over https
fn data_plane_url(host: &str) -> Result<Url> {
    if host.trim().is_empty() {
        return Err(anyhow::anyhow!("Index host is empty"));
    }

    let with_scheme = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };

    let mut url = Url::parse(&with_scheme).context("Failed to parse index host")?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Handle to one remote index's data plane
#[derive(Debug, Clone)]
pub struct PineconeIndex {
    name: String,
    host: Url,
    api_key: String,
    api_version: String,
    batch_size: usize,
    http: HttpClient,
}

impl PineconeIndex {
    #[inline]
    pub fn host(&self) -> &Url {
        &self.host
    }

    fn headers(&self) -> [(&str, &str); 2] {
        [
            (API_KEY_HEADER, self.api_key.as_str()),
            (API_VERSION_HEADER, self.api_version.as_str()),
        ]
    }

    fn upsert_batch(&self, url: &Url, records: &[IndexRecord]) -> Result<()> {
        let uploaded_at = Utc::now().to_rfc3339();
        let vectors = records
            .iter()
            .map(|record| VectorPayload {
                id: record.id.clone(),
                values: record.vector.clone(),
                metadata: json!({
                    "text": record.payload.text,
                    "source": record.payload.source,
                    "chunk_index": record.payload.chunk_index,
                    "uploaded_at": uploaded_at,
                }),
            })
            .collect();

        self.http
            .post_json(url, &self.headers(), &UpsertRequest { vectors })
            .with_context(|| {
                format!(
                    "Failed to upsert {} vectors into '{}'",
                    records.len(),
                    self.name
                )
            })?;
        Ok(())
    }

    fn query_matches(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let url = self
            .host
            .join("query")
            .context("Failed to build query URL")?;
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
        };

        let response_text = self
            .http
            .post_json(&url, &self.headers(), &request)
            .with_context(|| format!("Failed to query index '{}'", self.name))?;
        let response: QueryResponse =
            serde_json::from_str(&response_text).context("Failed to parse query response")?;

        Ok(response
            .matches
            .into_iter()
            .map(|item| {
                let metadata = item.metadata.unwrap_or(Value::Null);
                let field = |key: &str| {
                    metadata
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                SearchResult {
                    text: field("text"),
                    source: field("source"),
                    id: item.id,
                    score: item.score,
                }
            })
            .collect())
    }

    fn vector_count(&self) -> Result<usize> {
        let url = self
            .host
            .join("describe_index_stats")
            .context("Failed to build index stats URL")?;
        let response_text = self
            .http
            .post_json(&url, &self.headers(), &json!({}))
            .with_context(|| format!("Failed to describe stats of '{}'", self.name))?;
        let stats: IndexStats =
            serde_json::from_str(&response_text).context("Failed to parse index stats")?;
        Ok(stats.total_vector_count)
    }
}

impl VectorIndex for PineconeIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn upsert(&mut self, records: Vec<IndexRecord>) -> crate::Result<()> {
        let url = self
            .host
            .join("vectors/upsert")
            .map_err(|e| RagError::Index(format!("Failed to build upsert URL: {}", e)))?;

        for batch in records.chunks(self.batch_size) {
            self.upsert_batch(&url, batch)
                .map_err(|e| RagError::Index(format!("{:#}", e)))?;
            debug!("Upserted {} vectors into '{}'", batch.len(), self.name);
        }
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> crate::Result<Vec<SearchResult>> {
        self.query_matches(vector, top_k)
            .map_err(|e| RagError::Index(format!("{:#}", e)))
    }

    fn count(&self) -> crate::Result<usize> {
        self.vector_count()
            .map_err(|e| RagError::Index(format!("{:#}", e)))
    }
}
