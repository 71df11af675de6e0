#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::RagError;
use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, TextGenerator};
use crate::http::HttpClient;

/// Client for the OpenAI embeddings and completions endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: Url,
    api_key: String,
    embedding_model: String,
    completion_model: String,
    dimension: usize,
    temperature: f32,
    max_tokens: u32,
    batch_size: usize,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig, api_key: &str) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse OpenAI base URL from config")?;

        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            embedding_model: config.embedding_model.clone(),
            completion_model: config.completion_model.clone(),
            dimension: config.embedding_dimension as usize,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            batch_size: config.batch_size.max(1) as usize,
            http: HttpClient::new(
                Duration::from_secs(config.timeout_seconds),
                config.retry_attempts,
            ),
        })
    }

    /// Replace the HTTP client, e.g. to shorten retry backoff
    #[inline]
    #[must_use]
    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    /// Embed texts, issuing one request per `batch_size` inputs
    #[inline]
    pub fn generate_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self
                .generate_embeddings_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            results.extend(embeddings);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join("embeddings")
            .context("Failed to build embeddings URL")?;

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let auth = self.auth_header();
        let response_text = self
            .http
            .post_json(&url, &[("Authorization", auth.as_str())], &request)
            .context("Failed to generate embeddings")?;

        let mut response: EmbeddingResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        if response.data.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.data.len()
            ));
        }

        response.data.sort_by_key(|item| item.index);

        let mut embeddings = Vec::with_capacity(texts.len());
        for item in response.data {
            if item.embedding.len() != self.dimension {
                return Err(anyhow::anyhow!(
                    "Expected {}-dimension embeddings from {}, got {}",
                    self.dimension,
                    self.embedding_model,
                    item.embedding.len()
                ));
            }
            embeddings.push(item.embedding);
        }

        Ok(embeddings)
    }

    /// Run a text completion for `prompt`
    #[inline]
    pub fn complete(&self, prompt: &str) -> Result<String> {
        let url = self
            .base_url
            .join("completions")
            .context("Failed to build completions URL")?;

        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.completion_model,
            prompt.len()
        );

        let request = CompletionRequest {
            model: &self.completion_model,
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let auth = self.auth_header();
        let response_text = self
            .http
            .post_json(&url, &[("Authorization", auth.as_str())], &request)
            .context("Failed to request completion")?;

        let response: CompletionResponse = serde_json::from_str(&response_text)
            .context("Failed to parse completion response")?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))?;

        info!("Received completion of {} characters", text.len());
        Ok(text)
    }
}

impl Embedder for OpenAiClient {
    fn embed_query(&self, text: &str) -> crate::Result<Vec<f32>> {
        self.generate_embeddings(&[text.to_string()])
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("API returned no embedding".to_string()))
    }

    fn embed_documents(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.generate_embeddings(texts)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

impl TextGenerator for OpenAiClient {
    fn generate(&self, prompt: &str) -> crate::Result<String> {
        self.complete(prompt)
            .map_err(|e| RagError::Generation(format!("{:#}", e)))
    }
}
