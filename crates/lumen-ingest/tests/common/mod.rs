//! Hand-written fakes of the core traits shared by the pipeline tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt};
use lumen_core::{
    AlbumIndex, AlbumInfo, Captioner, Coordinates, Error, ImageDocument, LibraryReader,
    MediaRecord, MediaStream, Place, Result, ReverseGeocoder, SearchHit, VectorStore,
};

pub fn created() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 7, 4)
        .unwrap()
        .and_hms_opt(10, 30, 0)
        .unwrap()
}

pub fn record(
    album: &str,
    file_name: &str,
    people: Option<&str>,
    coordinates: Option<(f64, f64)>,
) -> MediaRecord {
    MediaRecord {
        relative_path: album.to_string(),
        album_name: album.to_string(),
        file_name: file_name.to_string(),
        created: created(),
        people_names: people.map(str::to_string),
        coordinates: coordinates.map(|(lat, lon)| Coordinates { lat, lon }),
    }
}

/// A library entry: either a record or a read failure.
#[derive(Clone)]
pub enum Entry {
    Record(MediaRecord),
    Broken(String),
}

/// In-memory photo library.
#[derive(Default)]
pub struct MemoryLibrary {
    albums: Vec<(AlbumInfo, Vec<Entry>)>,
    pub streams_opened: AtomicUsize,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_album(mut self, name: &str, entries: Vec<Entry>) -> Self {
        let album_id = self.albums.len() as i64 + 1;
        let info = AlbumInfo {
            album_id,
            name: name.to_string(),
            relative_path: name.to_string(),
            path: PathBuf::from("/photos").join(name),
            count: entries.len() as u64,
        };
        self.albums.push((info, entries));
        self
    }

    /// Album with `n` plain records named `img_0000.jpg`, ...
    pub fn with_records(self, name: &str, n: usize) -> Self {
        let entries = (0..n)
            .map(|i| Entry::Record(record(name, &format!("img_{i:04}.jpg"), None, None)))
            .collect();
        self.with_album(name, entries)
    }
}

#[async_trait]
impl LibraryReader for MemoryLibrary {
    async fn albums(&self) -> Result<AlbumIndex> {
        Ok(AlbumIndex::new(
            self.albums.iter().map(|(info, _)| info.clone()).collect(),
        ))
    }

    fn stream_media<'a>(&'a self, album: &'a AlbumInfo) -> MediaStream<'a> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let entries = self
            .albums
            .iter()
            .find(|(info, _)| info.album_id == album.album_id)
            .map(|(_, entries)| entries.clone())
            .unwrap_or_default();
        stream::iter(entries.into_iter().map(|entry| match entry {
            Entry::Record(record) => Ok(record),
            Entry::Broken(reason) => Err(Error::InvalidInput(reason)),
        }))
        .boxed()
    }
}

/// Captions every image except the listed file names.
#[derive(Default)]
pub struct ScriptedCaptioner {
    failing: HashSet<String>,
    pub calls: AtomicUsize,
}

impl ScriptedCaptioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(files: &[&str]) -> Self {
        Self {
            failing: files.iter().map(|f| f.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Captioner for ScriptedCaptioner {
    async fn caption(&self, image_path: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let file = image_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&file) {
            return Err(Error::Caption(format!("cannot caption {file}")));
        }
        if file == "p1.jpg" {
            return Ok("three people swimming".to_string());
        }
        Ok(format!("a photo named {file}"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// In-memory vector store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ImageDocument>>,
    batches: Mutex<Vec<usize>>,
    failures_left: AtomicU32,
    accepted_batches: Option<usize>,
    pub write_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` writes.
    pub fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    /// Accept the first `ok_batches` writes, then fail every write.
    pub fn failing_after(ok_batches: usize) -> Self {
        Self {
            accepted_batches: Some(ok_batches),
            ..Self::default()
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn document(&self, path: &str) -> Option<ImageDocument> {
        self.records.lock().unwrap().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add_images(&self, documents: &[ImageDocument]) -> Result<usize> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Unavailable("store offline".to_string()));
        }
        let mut batches = self.batches.lock().unwrap();
        if self.accepted_batches.is_some_and(|limit| batches.len() >= limit) {
            return Err(Error::Internal("disk full".to_string()));
        }
        batches.push(documents.len());
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
        Ok(self.len() as u64)
    }

    async fn get(&self, path: &str) -> Result<Option<ImageDocument>> {
        Ok(self.document(path))
    }
}

/// Geocoder returning fixed places, or failing every call.
pub struct FixedGeocoder {
    places: Vec<Place>,
    fail: bool,
    pub calls: AtomicUsize,
    pub teardowns: AtomicUsize,
}

impl FixedGeocoder {
    pub fn returning(places: Vec<Place>) -> Self {
        Self {
            places,
            fail: false,
            calls: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::returning(Vec::new())
        }
    }
}

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    async fn find_nearby_place_name(&self, _lat: f64, _lon: f64) -> Result<Vec<Place>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Unavailable("connection refused".to_string()));
        }
        Ok(self.places.clone())
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn la_jolla() -> Place {
    Place {
        toponym_name: "La Jolla".to_string(),
        admin_name2: "San Diego County".to_string(),
        admin_name1: "California".to_string(),
        country_name: "United States".to_string(),
        distance_km: Some(0.4),
    }
}
