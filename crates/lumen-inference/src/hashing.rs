//! Local feature-hashing embedder.
//!
//! Maps each content word of a text onto a signed bucket of a fixed-size
//! vector and L2-normalises the result. Texts sharing words end up close in
//! cosine space, which is enough for keyword-level semantic search without a
//! model server. Output is deterministic across runs and platforms.

use async_trait::async_trait;
use lumen_core::{defaults, EmbeddingBackend, Result, Vector};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "its", "near", "of", "on", "or", "scene", "takes", "place", "contains", "the", "their",
    "there", "this", "to", "with",
];

/// Deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model: format!("hashing-{dimension}"),
        }
    }

    /// Embed a single text synchronously.
    pub fn embed(&self, text: &str) -> Vector {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&bytes[..8]);
            let idx = (u64::from_le_bytes(idx_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(defaults::HASH_EMBED_DIMENSION)
    }
}

/// Lowercased content words with a light plural stem.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 1 && !STOPWORDS.contains(&t.as_str()))
        .map(|t| stem(&t))
}

fn stem(token: &str) -> String {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
