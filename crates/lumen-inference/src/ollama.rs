//! Ollama embedding backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use lumen_core::{defaults, EmbeddingBackend, Error, Result, Vector};

/// Ollama embedding backend (`/api/embed`).
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    /// Create a new embedder with default settings.
    pub fn new() -> Self {
        Self::with_config(
            defaults::OLLAMA_URL.to_string(),
            defaults::EMBED_MODEL.to_string(),
            defaults::EMBED_DIMENSION,
        )
    }

    /// Create a new embedder with custom configuration.
    pub fn with_config(base_url: String, model: String, dimension: usize) -> Self {
        let timeout_secs = std::env::var("LUMEN_EMBED_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::EMBED_TIMEOUT_SECS);

        info!(
            "Initializing Ollama embedder: url={}, model={}, dim={}",
            base_url, model, dimension
        );

        Self {
            client: Client::new(),
            base_url,
            model,
            dimension,
            timeout_secs,
        }
    }
}

impl Default for OllamaEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbedder {
    #[instrument(skip(self, texts), fields(subsystem = "inference", component = "ollama", op = "embed_texts", model = %self.model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.embeddings.len()
            )));
        }
        if let Some(bad) = result.embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(Error::Embedding(format!(
                "Model {} returned dimension {}, expected {}",
                self.model,
                bad.len(),
                self.dimension
            )));
        }

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = result.embeddings.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }
        Ok(result.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
