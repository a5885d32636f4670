//! Embedding backend selection.

use std::sync::Arc;

use lumen_core::{defaults, EmbeddingBackend};
use tracing::info;

use crate::{HashingEmbedder, OllamaEmbedder};

/// Which embedding backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    /// Local feature hashing (default, no model server required)
    #[default]
    Hashing,
    /// Ollama `/api/embed`
    Ollama,
}

impl std::fmt::Display for EmbeddingBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashing => write!(f, "hashing"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for EmbeddingBackendKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("Invalid embedding backend: {}", s)),
        }
    }
}

/// Embedding backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub kind: EmbeddingBackendKind,
    pub ollama_url: String,
    pub ollama_model: String,
    pub ollama_dimension: usize,
    pub hash_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            kind: EmbeddingBackendKind::default(),
            ollama_url: defaults::OLLAMA_URL.to_string(),
            ollama_model: defaults::EMBED_MODEL.to_string(),
            ollama_dimension: defaults::EMBED_DIMENSION,
            hash_dimension: defaults::HASH_EMBED_DIMENSION,
        }
    }
}

impl EmbeddingConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LUMEN_EMBED_BACKEND` | `hashing` | `hashing` or `ollama` |
    /// | `LUMEN_HASH_DIM` | `512` | Hashing embedder dimension |
    /// | `OLLAMA_BASE` | `http://127.0.0.1:11434` | Ollama URL |
    /// | `OLLAMA_EMBED_MODEL` | `nomic-embed-text` | Ollama embedding model |
    /// | `OLLAMA_EMBED_DIM` | `768` | Ollama embedding dimension |
    pub fn from_env() -> Self {
        let base = Self::default();
        let kind = std::env::var("LUMEN_EMBED_BACKEND")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(base.kind);
        let ollama_url = std::env::var("OLLAMA_BASE").unwrap_or(base.ollama_url);
        let ollama_model = std::env::var("OLLAMA_EMBED_MODEL").unwrap_or(base.ollama_model);
        let ollama_dimension = std::env::var("OLLAMA_EMBED_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(base.ollama_dimension);
        let hash_dimension = std::env::var("LUMEN_HASH_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(base.hash_dimension);

        Self {
            kind,
            ollama_url,
            ollama_model,
            ollama_dimension,
            hash_dimension,
        }
    }

    /// Set the backend kind.
    pub fn with_kind(mut self, kind: EmbeddingBackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Build the configured backend.
    pub fn build(&self) -> Arc<dyn EmbeddingBackend> {
        info!(backend = %self.kind, "Building embedding backend");
        match self.kind {
            EmbeddingBackendKind::Hashing => Arc::new(HashingEmbedder::new(self.hash_dimension)),
            EmbeddingBackendKind::Ollama => Arc::new(OllamaEmbedder::with_config(
                self.ollama_url.clone(),
                self.ollama_model.clone(),
                self.ollama_dimension,
            )),
        }
    }
}
