//! Size-bounded, path-deduplicated write buffer in front of a vector store.

use std::collections::HashMap;
use std::sync::Arc;

use lumen_core::{defaults, ImageDocument, Result, RetryPolicy, VectorStore};
use tracing::{debug, instrument};

/// Default flush threshold.
pub const DEFAULT_THRESHOLD: usize = defaults::BATCH_SIZE;

/// Accumulates documents and writes them to the store in batches.
///
/// A document whose path is already buffered replaces the earlier entry in
/// place. The buffer is cleared only after the store confirms a write; a
/// failed flush leaves it untouched.
pub struct IngestionBatcher {
    store: Arc<dyn VectorStore>,
    threshold: usize,
    retry: RetryPolicy,
    documents: Vec<ImageDocument>,
    positions: HashMap<String, usize>,
    batches_flushed: u64,
    documents_flushed: u64,
}

impl IngestionBatcher {
    /// Create a batcher flushing every `threshold` documents (at least 1).
    pub fn new(store: Arc<dyn VectorStore>, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            threshold,
            retry: RetryPolicy::none(),
            documents: Vec::with_capacity(threshold),
            positions: HashMap::with_capacity(threshold),
            batches_flushed: 0,
            documents_flushed: 0,
        }
    }

    /// Retry failed flushes with the given policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Buffer a document, flushing once the threshold is reached.
    ///
    /// Returns the number of documents written when a flush happened.
    pub async fn add(&mut self, document: ImageDocument) -> Result<Option<usize>> {
        match self.positions.get(document.path()) {
            Some(&idx) => self.documents[idx] = document,
            None => {
                self.positions
                    .insert(document.path().to_string(), self.documents.len());
                self.documents.push(document);
            }
        }

        if self.documents.len() >= self.threshold {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    /// Write all buffered documents. A no-op on an empty buffer.
    #[instrument(skip(self), fields(subsystem = "ingest", component = "batcher", op = "flush", batch_len = self.documents.len()))]
    pub async fn flush(&mut self) -> Result<usize> {
        if self.documents.is_empty() {
            return Ok(0);
        }

        let store = &self.store;
        let batch = &self.documents;
        self.retry
            .run("flush", |_| true, || store.add_images(batch))
            .await?;

        let written = self.documents.len();
        self.documents.clear();
        self.positions.clear();
        self.batches_flushed += 1;
        self.documents_flushed += written as u64;
        debug!(result_count = written, "Batch flushed");
        Ok(written)
    }

    /// Buffered documents in insertion order.
    pub fn pending(&self) -> &[ImageDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Successful flushes so far.
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed
    }

    /// Documents written by successful flushes so far.
    pub fn documents_flushed(&self) -> u64 {
        self.documents_flushed
    }
}

impl std::fmt::Debug for IngestionBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionBatcher")
            .field("threshold", &self.threshold)
            .field("pending", &self.documents.len())
            .field("batches_flushed", &self.batches_flushed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use lumen_core::{Error, ImageMetadata, SearchHit};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory store recording every batch it receives.
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<String>>>,
        records: Mutex<HashMap<String, ImageDocument>>,
        failures_left: AtomicU32,
    }

    impl RecordingStore {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                ..Self::default()
            }
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn add_images(&self, documents: &[ImageDocument]) -> Result<usize> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Unavailable("store offline".to_string()));
            }
            self.batches
                .lock()
                .unwrap()
                .push(documents.iter().map(|d| d.path().to_string()).collect());
            let mut records = self.records.lock().unwrap();
            for doc in documents {
                records.insert(doc.path().to_string(), doc.clone());
            }
            Ok(documents.len())
        }

        async fn query(&self, _text: &str, _top_k: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<u64> {
            Ok(self.records.lock().unwrap().len() as u64)
        }

        async fn get(&self, path: &str) -> Result<Option<ImageDocument>> {
            Ok(self.records.lock().unwrap().get(path).cloned())
        }
    }

    fn doc(path: &str, caption: &str) -> ImageDocument {
        ImageDocument::new(
            ImageMetadata {
                path: path.to_string(),
                album_name: "Album".to_string(),
                file_name: path.to_string(),
                created: NaiveDate::from_ymd_opt(2022, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            },
            caption,
            None,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_threshold_triggers_exactly_one_flush() {
        let store = Arc::new(RecordingStore::default());
        let mut batcher = IngestionBatcher::new(store.clone(), DEFAULT_THRESHOLD);

        for i in 0..DEFAULT_THRESHOLD - 1 {
            assert_eq!(batcher.add(doc(&format!("/p/{i}"), "x")).await.unwrap(), None);
        }
        assert!(store.batch_sizes().is_empty());

        let flushed = batcher.add(doc("/p/255", "x")).await.unwrap();
        assert_eq!(flushed, Some(256));
        assert_eq!(store.batch_sizes(), vec![256]);

        batcher.add(doc("/p/256", "x")).await.unwrap();
        assert_eq!(store.batch_sizes(), vec![256]);
        assert_eq!(batcher.len(), 1);
    }

    #[tokio::test]
    async fn test_final_partial_flush() {
        let store = Arc::new(RecordingStore::default());
        let mut batcher = IngestionBatcher::new(store.clone(), 3);

        for i in 0..7 {
            batcher.add(doc(&format!("/p/{i}"), "x")).await.unwrap();
        }
        assert_eq!(batcher.flush().await.unwrap(), 1);

        assert_eq!(store.batch_sizes(), vec![3, 3, 1]);
        assert_eq!(batcher.batches_flushed(), 3);
        assert_eq!(batcher.documents_flushed(), 7);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let store = Arc::new(RecordingStore::default());
        let mut batcher = IngestionBatcher::new(store.clone(), 4);

        assert_eq!(batcher.flush().await.unwrap(), 0);
        assert!(store.batch_sizes().is_empty());
        assert_eq!(batcher.batches_flushed(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_path_replaced_in_place() {
        let store = Arc::new(RecordingStore::default());
        let mut batcher = IngestionBatcher::new(store.clone(), 10);

        batcher.add(doc("/a", "first")).await.unwrap();
        batcher.add(doc("/b", "other")).await.unwrap();
        batcher.add(doc("/a", "second")).await.unwrap();

        assert_eq!(batcher.len(), 2);
        assert_eq!(batcher.pending()[0].caption(), "second");
        batcher.flush().await.unwrap();
        assert_eq!(
            store.get("/a").await.unwrap().unwrap().caption(),
            "second"
        );
    }

    #[tokio::test]
    async fn test_failed_flush_retains_batch() {
        let store = Arc::new(RecordingStore::failing(1));
        let mut batcher = IngestionBatcher::new(store.clone(), 10);
        batcher.add(doc("/a", "x")).await.unwrap();
        batcher.add(doc("/b", "x")).await.unwrap();

        let result = batcher.flush().await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert_eq!(batcher.len(), 2);
        assert_eq!(batcher.batches_flushed(), 0);

        assert_eq!(batcher.flush().await.unwrap(), 2);
        assert_eq!(store.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_failed_auto_flush_keeps_added_document() {
        let store = Arc::new(RecordingStore::failing(1));
        let mut batcher = IngestionBatcher::new(store.clone(), 2);
        batcher.add(doc("/a", "x")).await.unwrap();

        assert!(batcher.add(doc("/b", "x")).await.is_err());
        assert_eq!(batcher.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_retries_with_policy() {
        let store = Arc::new(RecordingStore::failing(2));
        let mut batcher = IngestionBatcher::new(store.clone(), 10)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(500)));
        batcher.add(doc("/a", "x")).await.unwrap();

        assert_eq!(batcher.flush().await.unwrap(), 1);
        assert_eq!(store.batch_sizes(), vec![1]);
    }

    #[test]
    fn test_zero_threshold_clamped() {
        let batcher = IngestionBatcher::new(Arc::new(RecordingStore::default()), 0);
        assert_eq!(batcher.threshold(), 1);
    }
}
