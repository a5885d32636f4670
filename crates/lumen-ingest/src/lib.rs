//! # lumen-ingest
//!
//! Enrichment and ingestion pipeline for lumen.
//!
//! This crate provides:
//! - [`DocumentAssembler`]: caption + people + place descriptions per image
//! - [`GeoDescriber`] and the GeoNames reverse geocoder adapter
//! - [`IngestionBatcher`]: deduplicated, size-bounded batched upserts
//! - [`IngestionPipeline`]: album-by-album ingestion with a run report
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lumen_ingest::{GeoDescriber, GeonamesConfig, GeonamesGeocoder, IngestionPipeline};
//!
//! let mut pipeline = IngestionPipeline::new(library, captioner, store);
//! if let Some(config) = GeonamesConfig::from_env() {
//!     pipeline = pipeline.with_geo(GeoDescriber::new(Arc::new(GeonamesGeocoder::new(config))));
//! }
//!
//! let report = pipeline.run(&["Travel :: 2019".to_string()]).await?;
//! println!("{} documents in {} batches", report.documents_ingested, report.batches_flushed);
//! ```

pub mod adapters;
pub mod assembler;
pub mod batcher;
pub mod geo;
pub mod pipeline;

// Re-export core types
pub use lumen_core::*;

pub use adapters::{GeonamesConfig, GeonamesGeocoder};
pub use assembler::DocumentAssembler;
pub use batcher::{IngestionBatcher, DEFAULT_THRESHOLD};
pub use geo::{GeoDescriber, GeocoderSession};
pub use pipeline::{
    AlbumReport, IngestConfig, IngestEvent, IngestReport, IngestionPipeline, SkippedRecord,
};
