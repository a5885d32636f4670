//! # lumen-inference
//!
//! Caption and embedding backends for lumen.
//!
//! This crate provides:
//! - [`OllamaCaptioner`]: scene captions from an Ollama vision model
//! - [`OllamaEmbedder`]: text embeddings from an Ollama embedding model
//! - [`HashingEmbedder`]: local, deterministic feature-hashing embeddings
//!   that need no model server
//! - [`EmbeddingConfig`]: environment-driven backend selection
//!
//! # Example
//!
//! ```rust,no_run
//! use lumen_inference::{EmbeddingConfig, OllamaCaptioner};
//! use lumen_core::{Captioner, EmbeddingBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let captioner = OllamaCaptioner::from_env();
//!     let caption = captioner.caption("beach.jpg".as_ref()).await.unwrap();
//!
//!     let embedder = EmbeddingConfig::from_env().build();
//!     let vectors = embedder.embed_texts(&[caption]).await.unwrap();
//! }
//! ```

pub mod config;
pub mod hashing;
pub mod ollama;
pub mod vision;

pub use config::{EmbeddingBackendKind, EmbeddingConfig};
pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use vision::OllamaCaptioner;
