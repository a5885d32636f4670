//! # lumen-db
//!
//! SQLite storage layer for lumen.
//!
//! This crate provides:
//! - Connection pool management
//! - [`SqliteVectorStore`], the persistent vector index of image documents
//! - [`DigikamReader`], a read-only [`LibraryReader`](lumen_core::LibraryReader)
//!   over a digiKam catalog
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lumen_db::{SqliteVectorStore, StoreConfig};
//! use lumen_core::VectorStore;
//! use lumen_inference::HashingEmbedder;
//!
//! # async fn run() -> lumen_core::Result<()> {
//! let store = SqliteVectorStore::open(
//!     StoreConfig::from_env(),
//!     Arc::new(HashingEmbedder::default()),
//! )
//! .await?;
//! for hit in store.query("kids at the beach", 5).await? {
//!     println!("{:.2} {}", hit.score, hit.document.path());
//! }
//! # Ok(())
//! # }
//! ```

pub mod digikam;
pub mod pool;
pub mod vector_store;
pub mod vectors;

// Re-export core types
pub use lumen_core::*;

pub use digikam::{album_display_name, resolve_album_root, DigikamConfig, DigikamReader};
pub use pool::{create_pool, log_pool_metrics, PoolConfig};
pub use vector_store::{SqliteVectorStore, StoreConfig};
pub use vectors::{cosine_similarity, from_blob, to_blob};
