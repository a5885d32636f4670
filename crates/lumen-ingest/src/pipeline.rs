//! Album ingestion: stream, enrich, batch, store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, trace, warn};

use lumen_core::{
    defaults, AlbumInfo, Captioner, Error, LibraryReader, Result, RetryPolicy, VectorStore,
};

use crate::assembler::DocumentAssembler;
use crate::batcher::IngestionBatcher;
use crate::geo::GeoDescriber;

/// Capacity of the progress event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Documents per store write.
    pub batch_size: usize,
    /// Retry policy for failed batch writes.
    pub flush_retry: RetryPolicy,
    /// Records between two progress events.
    pub progress_every: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            flush_retry: RetryPolicy::default(),
            progress_every: defaults::PROGRESS_EVERY,
        }
    }
}

impl IngestConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LUMEN_BATCH_SIZE` | `256` | Documents per store write |
    /// | `LUMEN_FLUSH_MAX_ATTEMPTS` | `3` | Attempts per batch write |
    pub fn from_env() -> Self {
        let batch_size = std::env::var("LUMEN_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::BATCH_SIZE)
            .max(1);

        let max_attempts = std::env::var("LUMEN_FLUSH_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(defaults::FLUSH_MAX_ATTEMPTS);

        Self {
            batch_size,
            flush_retry: RetryPolicy::new(
                max_attempts,
                Duration::from_millis(defaults::FLUSH_BACKOFF_MS),
            ),
            ..Self::default()
        }
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the flush retry policy.
    pub fn with_flush_retry(mut self, retry: RetryPolicy) -> Self {
        self.flush_retry = retry;
        self
    }
}

/// Progress event emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// Streaming of an album began.
    AlbumStarted { album: String, total: u64 },
    /// Periodic progress within an album.
    Progress { album: String, seen: u64, total: u64 },
    /// A record was left out of the index.
    RecordSkipped { album: String, reason: String },
    /// A batch was written to the store.
    BatchFlushed { album: String, documents: usize },
    /// All records of an album were processed.
    AlbumFinished {
        album: String,
        ingested: u64,
        skipped: u64,
    },
}

/// A record left out of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub album: String,
    /// `None` when the library could not even produce the record.
    pub file_name: Option<String>,
    pub reason: String,
}

/// Per-album counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlbumReport {
    pub album: String,
    pub seen: u64,
    pub ingested: u64,
    pub skipped: u64,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub albums: Vec<AlbumReport>,
    pub skipped: Vec<SkippedRecord>,
    pub documents_ingested: u64,
    pub batches_flushed: u64,
    /// Set when a batch could not be written; the run stopped there.
    pub failure: Option<String>,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn records_skipped(&self) -> u64 {
        self.skipped.len() as u64
    }
}

/// Ingests whole albums from a library into a vector store.
pub struct IngestionPipeline {
    library: Arc<dyn LibraryReader>,
    captioner: Arc<dyn Captioner>,
    store: Arc<dyn VectorStore>,
    geo: Option<Arc<GeoDescriber>>,
    config: IngestConfig,
    event_tx: broadcast::Sender<IngestEvent>,
}

impl IngestionPipeline {
    pub fn new(
        library: Arc<dyn LibraryReader>,
        captioner: Arc<dyn Captioner>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            library,
            captioner,
            store,
            geo: None,
            config: IngestConfig::default(),
            event_tx,
        }
    }

    /// Enable place descriptions.
    pub fn with_geo(mut self, geo: GeoDescriber) -> Self {
        self.geo = Some(Arc::new(geo));
        self
    }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Receiver for progress events of subsequent runs.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: IngestEvent) {
        // No receivers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Ingest the named albums in order.
    ///
    /// Every album name is resolved before anything is streamed; an unknown
    /// name fails with [`Error::AlbumNotFound`]. Per-record problems are
    /// recorded in the report. A batch that cannot be written after the
    /// configured retries stops the run with `failure` set; batches written
    /// before it stay in the store.
    #[instrument(skip(self), fields(subsystem = "ingest", component = "pipeline", op = "run"))]
    pub async fn run(&self, albums: &[String]) -> Result<IngestReport> {
        let start = Instant::now();
        let index = self.library.albums().await?;
        if albums.is_empty() {
            return Err(Error::InvalidInput(format!(
                "no albums requested (available: {})",
                index.available_names().join(", ")
            )));
        }
        let targets = index.resolve_all(albums)?;

        info!(
            albums = targets.len(),
            batch_size = self.config.batch_size,
            geocoding = self.geo.is_some(),
            "Ingestion run started"
        );

        let _session = self.geo.as_ref().map(|geo| geo.session());
        let mut assembler = DocumentAssembler::new(Arc::clone(&self.captioner));
        if let Some(geo) = &self.geo {
            assembler = assembler.with_geo(Arc::clone(geo));
        }

        let mut report = IngestReport::default();
        for album in &targets {
            self.ingest_album(&assembler, album, &mut report).await;
            if report.failure.is_some() {
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        match &report.failure {
            None => info!(
                documents = report.documents_ingested,
                batches = report.batches_flushed,
                skipped = report.records_skipped(),
                duration_ms,
                "Ingestion run finished"
            ),
            Some(failure) => error!(
                documents = report.documents_ingested,
                batches = report.batches_flushed,
                skipped = report.records_skipped(),
                duration_ms,
                failure = %failure,
                "Ingestion run failed"
            ),
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(subsystem = "ingest", component = "pipeline", op = "ingest_album", album = %album.name))]
    async fn ingest_album(
        &self,
        assembler: &DocumentAssembler,
        album: &AlbumInfo,
        report: &mut IngestReport,
    ) {
        let mut batcher = IngestionBatcher::new(Arc::clone(&self.store), self.config.batch_size)
            .with_retry(self.config.flush_retry);
        let mut album_report = AlbumReport {
            album: album.name.clone(),
            ..AlbumReport::default()
        };
        self.emit(IngestEvent::AlbumStarted {
            album: album.name.clone(),
            total: album.count,
        });

        let mut failure = None;
        let mut records = self.library.stream_media(album);
        while let Some(item) = records.next().await {
            album_report.seen += 1;
            if album_report.seen % self.config.progress_every.max(1) == 0 {
                debug!(seen = album_report.seen, total = album.count, "Progress");
                self.emit(IngestEvent::Progress {
                    album: album.name.clone(),
                    seen: album_report.seen,
                    total: album.count,
                });
            }

            let (file_name, outcome) = match item {
                Ok(record) => {
                    trace!(file = %record.file_name, "Record received");
                    let outcome = assembler.assemble(album, &record).await;
                    (Some(record.file_name), outcome)
                }
                Err(e) => (None, Err(e)),
            };

            let document = match outcome {
                Ok(document) => document,
                Err(e) => {
                    warn!(
                        file = file_name.as_deref().unwrap_or("<unreadable>"),
                        error = %e,
                        "Record skipped"
                    );
                    album_report.skipped += 1;
                    self.emit(IngestEvent::RecordSkipped {
                        album: album.name.clone(),
                        reason: e.to_string(),
                    });
                    report.skipped.push(SkippedRecord {
                        album: album.name.clone(),
                        file_name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match batcher.add(document).await {
                Ok(Some(written)) => self.emit(IngestEvent::BatchFlushed {
                    album: album.name.clone(),
                    documents: written,
                }),
                Ok(None) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(records);

        if failure.is_none() {
            match batcher.flush().await {
                Ok(0) => {}
                Ok(written) => self.emit(IngestEvent::BatchFlushed {
                    album: album.name.clone(),
                    documents: written,
                }),
                Err(e) => failure = Some(e),
            }
        }

        album_report.ingested = batcher.documents_flushed();
        report.documents_ingested += batcher.documents_flushed();
        report.batches_flushed += batcher.batches_flushed();

        if let Some(e) = failure {
            error!(
                pending = batcher.len(),
                error = %e,
                "Batch write failed after retries, stopping run"
            );
            report.failure = Some(format!(
                "album {}: failed to write batch of {} documents: {}",
                album.name,
                batcher.len(),
                e
            ));
        } else {
            info!(
                seen = album_report.seen,
                ingested = album_report.ingested,
                skipped = album_report.skipped,
                "Album finished"
            );
            self.emit(IngestEvent::AlbumFinished {
                album: album.name.clone(),
                ingested: album_report.ingested,
                skipped: album_report.skipped,
            });
        }
        report.albums.push(album_report);
    }
}
