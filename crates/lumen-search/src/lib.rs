//! # lumen-search
//!
//! Free-text photo search for lumen.
//!
//! The vector store does the ranking; this crate validates and caps requests
//! and reports timing.
//!
//! ## Example
//!
//! ```ignore
//! use lumen_search::{QueryEngine, SearchRequest};
//!
//! let engine = QueryEngine::new(store);
//!
//! let hits = engine.search("kids building a sandcastle", 5).await?;
//!
//! let response = SearchRequest::new("sunset over the harbour")
//!     .with_top_k(20)
//!     .execute(&engine)
//!     .await?;
//! ```

pub mod engine;

// Re-export core types
pub use lumen_core::*;

pub use engine::{QueryEngine, SearchConfig, SearchRequest, SearchResponse};
