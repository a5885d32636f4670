//! SQLite-backed vector store for enriched image documents.
//!
//! One row per image path holds the full document metadata plus the
//! embedding of its `search_text` as a little-endian `f32` blob. Queries
//! embed the text with the same backend and rank every stored vector by
//! cosine similarity, which is plenty for personal libraries of a few
//! hundred thousand images.
//!
//! The store lives in a directory (`index.sqlite3` inside it) so it
//! survives restarts and can be shared with a model cache directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use futures::TryStreamExt;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use lumen_core::{
    defaults, EmbeddingBackend, Error, ImageDocument, ImageMetadata, Result, SearchHit, Vector,
    VectorStore, CREATED_FORMAT,
};

use crate::pool::{classify_open_error, create_pool, log_pool_metrics, PoolConfig};
use crate::vectors::{content_hash, cosine_similarity, from_blob, to_blob};

const META_MODEL: &str = "embedding_model";
const META_DIMENSION: &str = "embedding_dimension";

/// Paths bound per `IN (...)` lookup statement.
const LOOKUP_CHUNK: usize = 500;

const DOCUMENT_COLUMNS: &str = "path, album_name, file_name, created, caption, \
     people_description, geo_description";

/// Vector store location and pool settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the index file.
    pub dir: PathBuf,
    /// Refuse to create the directory or index file when missing.
    pub must_exist: bool,
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::STORE_DIR),
            must_exist: false,
            pool: PoolConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LUMEN_STORE_DIR` | - | Store directory |
    /// | `MODEL_CACHE_DIR` | `.lumen` | Fallback store directory |
    pub fn from_env() -> Self {
        let dir = [defaults::ENV_STORE_DIR, defaults::ENV_MODEL_CACHE_DIR]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(defaults::STORE_DIR));
        Self {
            dir,
            ..Self::default()
        }
    }

    /// Override the store directory.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// Only open an index that already exists.
    ///
    /// Used by read paths so a mistyped directory is reported instead of
    /// silently becoming a new empty index.
    pub fn must_exist(mut self) -> Self {
        self.must_exist = true;
        self.pool.create_if_missing = false;
        self
    }

    /// Path of the SQLite index file.
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(defaults::STORE_FILE)
    }
}

/// Persistent vector index keyed by image path.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn EmbeddingBackend>,
    dir: PathBuf,
}

impl SqliteVectorStore {
    /// Open (or create) the store in `config.dir`.
    ///
    /// Fails with [`Error::NotFound`] when `config.must_exist` is set and
    /// there is no index file, with [`Error::Corrupted`] when the index file
    /// does not pass an integrity check and with [`Error::Config`] when a
    /// non-empty index was built with a different embedding model or
    /// dimension.
    pub async fn open(config: StoreConfig, embedder: Arc<dyn EmbeddingBackend>) -> Result<Self> {
        let start = Instant::now();
        let index_path = config.index_path();
        if config.must_exist {
            if !tokio::fs::try_exists(&index_path).await? {
                return Err(Error::NotFound(format!(
                    "no vector store at {}",
                    index_path.display()
                )));
            }
        } else {
            tokio::fs::create_dir_all(&config.dir).await?;
        }

        let pool = create_pool(&index_path, config.pool.clone()).await?;
        check_integrity(&pool).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;

        check_embedding_model(&pool, embedder.as_ref()).await?;

        let store = Self {
            pool,
            embedder,
            dir: config.dir,
        };
        info!(
            subsystem = "store",
            component = "vector_store",
            op = "open",
            dir = %store.dir.display(),
            model = store.embedder.model_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Vector store opened"
        );
        Ok(store)
    }

    /// Directory the store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Name of the embedding model vectors are built with.
    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Number of indexed images per album, sorted by album name.
    pub async fn album_counts(&self) -> Result<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT album_name, COUNT(*) FROM images GROUP BY album_name ORDER BY album_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows
            .into_iter()
            .map(|(album, count)| (album, count.max(0) as u64))
            .collect())
    }

    /// Close the underlying pool, waiting for in-flight statements.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Stored embeddings that can be reused, keyed by path.
    async fn reusable_embeddings(
        &self,
        documents: &[ImageDocument],
    ) -> Result<HashMap<String, StoredEmbedding>> {
        let mut existing = HashMap::new();
        for chunk in documents.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT path, content_hash, model, embedding FROM images WHERE path IN (",
            );
            let mut separated = builder.separated(", ");
            for doc in chunk {
                separated.push_bind(doc.path());
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
            for row in rows {
                let path: String = row.try_get("path")?;
                existing.insert(
                    path,
                    StoredEmbedding {
                        content_hash: row.try_get("content_hash")?,
                        model: row.try_get("model")?,
                        embedding: row.try_get("embedding")?,
                    },
                );
            }
        }
        Ok(existing)
    }

    /// Documents for `paths`, keyed by path. Missing paths are left out.
    async fn get_many(&self, paths: &[&str]) -> Result<HashMap<String, ImageDocument>> {
        let mut documents = HashMap::with_capacity(paths.len());
        for chunk in paths.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {DOCUMENT_COLUMNS} FROM images WHERE path IN ("
            ));
            let mut separated = builder.separated(", ");
            for path in chunk {
                separated.push_bind(*path);
            }
            separated.push_unseparated(")");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
            for row in rows {
                let document = document_from_row(&row)?;
                documents.insert(document.path().to_string(), document);
            }
        }
        Ok(documents)
    }

    async fn embed_one(&self, text: &str) -> Result<Vector> {
        let vector = self
            .embedder
            .embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("backend returned no embedding".to_string()))?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        let expected = self.embedder.dimension();
        if vector.len() != expected {
            return Err(Error::Embedding(format!(
                "Model {} returned dimension {}, expected {}",
                self.embedder.model_name(),
                vector.len(),
                expected
            )));
        }
        Ok(())
    }
}

struct StoredEmbedding {
    content_hash: String,
    model: String,
    embedding: Vec<u8>,
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, documents), fields(subsystem = "store", component = "vector_store", op = "add_images", batch_len = documents.len()))]
    async fn add_images(&self, documents: &[ImageDocument]) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let start = Instant::now();
        let model = self.embedder.model_name().to_string();

        let existing = self.reusable_embeddings(documents).await?;
        let hashes: Vec<String> = documents
            .iter()
            .map(|doc| content_hash(doc.search_text()))
            .collect();

        let mut blobs: Vec<Option<Vec<u8>>> = documents
            .iter()
            .zip(&hashes)
            .map(|(doc, hash)| {
                existing
                    .get(doc.path())
                    .filter(|stored| stored.content_hash == *hash && stored.model == model)
                    .map(|stored| stored.embedding.clone())
            })
            .collect();

        let missing: Vec<usize> = (0..documents.len())
            .filter(|&idx| blobs[idx].is_none())
            .collect();
        let reused = documents.len() - missing.len();

        if !missing.is_empty() {
            let texts: Vec<String> = missing
                .iter()
                .map(|&idx| documents[idx].search_text().to_string())
                .collect();
            let vectors = self.embedder.embed_texts(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(Error::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            for (&idx, vector) in missing.iter().zip(vectors) {
                self.check_dimension(&vector)?;
                blobs[idx] = Some(to_blob(&vector));
            }
        }

        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for ((doc, hash), blob) in documents.iter().zip(&hashes).zip(blobs) {
            let blob = blob.ok_or_else(|| {
                Error::Internal(format!("no embedding prepared for {}", doc.path()))
            })?;
            let facets = doc.facets();
            sqlx::query(
                "INSERT INTO images (path, album_name, file_name, created, year, month,
                     weekday, date, timestamp, caption, people_description,
                     geo_description, search_text, content_hash, model, embedding,
                     updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(path) DO UPDATE SET
                     album_name = excluded.album_name,
                     file_name = excluded.file_name,
                     created = excluded.created,
                     year = excluded.year,
                     month = excluded.month,
                     weekday = excluded.weekday,
                     date = excluded.date,
                     timestamp = excluded.timestamp,
                     caption = excluded.caption,
                     people_description = excluded.people_description,
                     geo_description = excluded.geo_description,
                     search_text = excluded.search_text,
                     content_hash = excluded.content_hash,
                     model = excluded.model,
                     embedding = excluded.embedding,
                     updated_at = excluded.updated_at",
            )
            .bind(doc.path())
            .bind(doc.album_name())
            .bind(doc.file_name())
            .bind(doc.created().format(CREATED_FORMAT).to_string())
            .bind(facets.year)
            .bind(&facets.month)
            .bind(&facets.weekday)
            .bind(&facets.date)
            .bind(facets.timestamp)
            .bind(doc.caption())
            .bind(doc.people_description())
            .bind(doc.geo_description())
            .bind(doc.search_text())
            .bind(hash)
            .bind(&model)
            .bind(blob)
            .bind(&updated_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;

        let written = documents
            .iter()
            .map(ImageDocument::path)
            .collect::<HashSet<_>>()
            .len();
        debug!(
            result_count = written,
            reused_embeddings = reused,
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch upserted"
        );
        log_pool_metrics(&self.pool);
        Ok(written)
    }

    #[instrument(skip(self), fields(subsystem = "store", component = "vector_store", op = "query"))]
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let dimension = self.embedder.dimension();
        let query_vec = self.embed_one(text).await?;

        let mut scored: Vec<(f32, String)> = Vec::new();
        {
            let mut rows = sqlx::query("SELECT path, embedding FROM images").fetch(&self.pool);
            while let Some(row) = rows.try_next().await.map_err(Error::Database)? {
                let path: String = row.try_get("path")?;
                let blob: Vec<u8> = row.try_get("embedding")?;
                let vector = from_blob(&blob, dimension)?;
                scored.push((cosine_similarity(&query_vec, &vector), path));
            }
        }

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(top_k);

        let paths: Vec<&str> = scored.iter().map(|(_, path)| path.as_str()).collect();
        let mut documents = self.get_many(&paths).await?;
        let mut hits = Vec::with_capacity(scored.len());
        for (score, path) in &scored {
            match documents.remove(path) {
                Some(document) => hits.push(SearchHit::new(document, *score)),
                None => warn!(path = %path, "Image removed while querying"),
            }
        }

        debug!(
            result_count = hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(hits)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count.max(0) as u64)
    }

    async fn get(&self, path: &str) -> Result<Option<ImageDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM images WHERE path = ?"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.map(|row| document_from_row(&row)).transpose()
    }
}

fn document_from_row(row: &SqliteRow) -> Result<ImageDocument> {
    let path: String = row.try_get("path")?;
    let created: String = row.try_get("created")?;
    let created = NaiveDateTime::parse_from_str(&created, CREATED_FORMAT).map_err(|e| {
        Error::Corrupted(format!("invalid created timestamp for {}: {}", path, e))
    })?;
    let metadata = ImageMetadata {
        path,
        album_name: row.try_get("album_name")?,
        file_name: row.try_get("file_name")?,
        created,
    };
    ImageDocument::new(
        metadata,
        row.try_get::<String, _>("caption")?,
        row.try_get("people_description")?,
        row.try_get("geo_description")?,
    )
}

async fn check_integrity(pool: &SqlitePool) -> Result<()> {
    let report: Vec<String> = sqlx::query_scalar("PRAGMA integrity_check")
        .fetch_all(pool)
        .await
        .map_err(classify_open_error)?;
    if report.len() == 1 && report[0] == "ok" {
        return Ok(());
    }
    Err(Error::Corrupted(report.join("; ")))
}

/// Record the embedding model on first open and reject a different one later.
async fn check_embedding_model(pool: &SqlitePool, embedder: &dyn EmbeddingBackend) -> Result<()> {
    let meta: HashMap<String, String> =
        sqlx::query_as::<_, (String, String)>("SELECT key, value FROM store_meta")
            .fetch_all(pool)
            .await
            .map_err(Error::Database)?
            .into_iter()
            .collect();

    let model = embedder.model_name();
    let dimension = embedder.dimension().to_string();
    let stored_model = meta.get(META_MODEL);
    let stored_dimension = meta.get(META_DIMENSION);

    if stored_model.map(String::as_str) == Some(model)
        && stored_dimension.map(String::as_str) == Some(dimension.as_str())
    {
        return Ok(());
    }

    if let (Some(stored_model), Some(stored_dimension)) = (stored_model, stored_dimension) {
        let indexed: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(pool)
            .await
            .map_err(Error::Database)?;
        if indexed > 0 {
            return Err(Error::Config(format!(
                "store was built with embedding model {} (dim {}), current backend is {} (dim {})",
                stored_model, stored_dimension, model, dimension
            )));
        }
    }

    for (key, value) in [(META_MODEL, model), (META_DIMENSION, dimension.as_str())] {
        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
    }
    Ok(())
}
