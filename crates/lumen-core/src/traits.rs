//! Core traits for lumen abstractions.
//!
//! Every external collaborator of the ingestion pipeline sits behind one of
//! these traits so that concrete backends stay pluggable and testable.

use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LIBRARY TRAITS
// =============================================================================

/// Lazy stream of media records for one album.
pub type MediaStream<'a> = BoxStream<'a, Result<MediaRecord>>;

/// Read-only access to a desktop photo library.
#[async_trait]
pub trait LibraryReader: Send + Sync {
    /// Resolve every album in the library.
    async fn albums(&self) -> Result<AlbumIndex>;

    /// Stream the media records of one album.
    ///
    /// Each call starts a fresh, finite stream. A failed item affects only
    /// that record.
    fn stream_media<'a>(&'a self, album: &'a AlbumInfo) -> MediaStream<'a>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend producing a natural-language scene caption for an image.
#[async_trait]
pub trait Captioner: Send + Sync {
    /// Caption the image at `image_path`.
    async fn caption(&self, image_path: &Path) -> Result<String>;

    /// Check if the caption backend is available.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for embedding generation.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts.
    ///
    /// Returns a vector of embedding vectors, one per input text.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// GEOCODING TRAITS
// =============================================================================

/// Reverse geocoding service holding a network session.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Find named places near the given coordinates.
    ///
    /// An empty vector means no places were found; it is not an error.
    async fn find_nearby_place_name(&self, lat: f64, lon: f64) -> Result<Vec<Place>>;

    /// Release the session and any cached lookups. Idempotent.
    fn teardown(&self);
}

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Persistent vector index of enriched image documents keyed by path.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and upsert a batch of documents atomically.
    ///
    /// Re-adding an existing path replaces its record. Returns the number of
    /// records written.
    async fn add_images(&self, documents: &[ImageDocument]) -> Result<usize>;

    /// Nearest-neighbour search, best match first.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>>;

    /// Number of indexed images.
    async fn count(&self) -> Result<u64>;

    /// Fetch a single document by path.
    async fn get(&self, path: &str) -> Result<Option<ImageDocument>>;
}
