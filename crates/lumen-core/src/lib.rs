//! # lumen-core
//!
//! Core types, traits, and abstractions for the lumen photo search engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other lumen crates depend on:
//! - [`MediaRecord`] / [`ImageDocument`] and the search hit types
//! - Capability traits for every external collaborator (library reader,
//!   captioner, reverse geocoder, embedding backend, vector store)
//! - The people / place sentence formatters used during enrichment
//! - Shared error type, defaults and retry policy
//!
//! ## Logging
//!
//! Events carry `subsystem`, `component` and `op` fields, plus `album`,
//! `path`, `duration_ms`, `result_count` or `error` where they apply.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Run-level failure, requires attention |
//! | WARN  | Recoverable issue, fallback applied (missing enrichment, retry) |
//! | INFO  | Lifecycle events (run start/finish, album done, store opened) |
//! | DEBUG | Decision points, config choices, batch flushes |
//! | TRACE | Per-record iteration, per-hit scores |

pub mod defaults;
pub mod describe;
pub mod error;
pub mod models;
pub mod retry;
pub mod traits;

// Re-export commonly used types at crate root
pub use describe::{describe_geo_location, describe_people_in_scene, split_people_names};
pub use error::{Error, Result};
pub use models::*;
pub use retry::RetryPolicy;
pub use traits::*;
