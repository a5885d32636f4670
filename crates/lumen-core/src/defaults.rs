//! Centralized default constants for lumen.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// INGESTION
// =============================================================================

/// Number of documents buffered before a batch is flushed to the store.
pub const BATCH_SIZE: usize = 256;

/// Attempts made to flush a batch before the run is reported as failed.
pub const FLUSH_MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first flush retry, doubled on each further attempt.
pub const FLUSH_BACKOFF_MS: u64 = 500;

/// Records between two progress log lines.
pub const PROGRESS_EVERY: u64 = 50;

// =============================================================================
// STORE
// =============================================================================

/// Store directory used when neither env var nor override is given.
pub const STORE_DIR: &str = ".lumen";

/// SQLite file inside the store directory.
pub const STORE_FILE: &str = "index.sqlite3";

/// Env var naming the store directory.
pub const ENV_STORE_DIR: &str = "LUMEN_STORE_DIR";

/// Fallback env var for the store directory (shared model cache dir).
pub const ENV_MODEL_CACHE_DIR: &str = "MODEL_CACHE_DIR";

/// Maximum connections in the store pool.
pub const STORE_MAX_CONNECTIONS: u32 = 4;

// =============================================================================
// SEARCH
// =============================================================================

/// Default number of hits returned by a query.
pub const SEARCH_TOP_K: usize = 12;

/// Upper bound accepted for `top_k`.
pub const SEARCH_TOP_K_MAX: usize = 100;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default vision (caption) model.
pub const VISION_MODEL: &str = "llava";

/// Env var naming the vision model.
pub const ENV_OLLAMA_VISION_MODEL: &str = "OLLAMA_VISION_MODEL";

/// Maximum tokens generated for a caption.
pub const CAPTION_MAX_TOKENS: u32 = 32;

/// Timeout for caption requests in seconds.
pub const CAPTION_TIMEOUT_SECS: u64 = 120;

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Dimension of the local hashing embedder.
pub const HASH_EMBED_DIMENSION: usize = 512;

// =============================================================================
// GEOCODING
// =============================================================================

/// GeoNames web service base URL.
pub const GEONAMES_URL: &str = "http://api.geonames.org";

/// Env var holding the GeoNames account name.
pub const ENV_GEONAMES_USERNAME: &str = "GEONAMES_USERNAME";

/// Decimal places kept when caching geocoder lookups.
pub const GEO_CACHE_PRECISION: i32 = 3;

/// Retries after the first failed geocoder call (transient errors only).
pub const GEO_RETRIES: u32 = 1;

/// Backoff before retrying a transient geocoder failure.
pub const GEO_RETRY_BACKOFF_MS: u64 = 250;

/// Timeout for geocoder requests in seconds.
pub const GEO_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// LIBRARY
// =============================================================================

/// digiKam core database file name.
pub const DIGIKAM_CORE_DB: &str = "digikam4.db";

/// Mount point under which digiKam volume UUIDs are resolved.
pub const DIGIKAM_MOUNT_ROOT: &str = "/mnt";
