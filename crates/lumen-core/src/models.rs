//! Domain models shared across lumen crates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp format used when persisting `created` values.
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// =============================================================================
// LIBRARY
// =============================================================================

/// Latitude / longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Raw media record streamed by a [`LibraryReader`](crate::LibraryReader).
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    /// Album-relative directory the image lives in (album index key).
    pub relative_path: String,
    pub album_name: String,
    pub file_name: String,
    pub created: NaiveDateTime,
    /// Comma-separated people names as stored in the library.
    pub people_names: Option<String>,
    pub coordinates: Option<Coordinates>,
}

/// Album metadata resolved from the photo library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumInfo {
    pub album_id: i64,
    /// Display name, e.g. `Travel :: 2019 :: Lisbon`.
    pub name: String,
    pub relative_path: String,
    /// Absolute directory holding the album's files.
    pub path: PathBuf,
    /// Number of images, used for progress reporting.
    pub count: u64,
}

/// Album lookup by display name and by relative path.
#[derive(Debug, Clone, Default)]
pub struct AlbumIndex {
    albums: Vec<AlbumInfo>,
    by_name: HashMap<String, usize>,
    by_relative_path: HashMap<String, usize>,
}

impl AlbumIndex {
    pub fn new(albums: Vec<AlbumInfo>) -> Self {
        let mut by_name = HashMap::with_capacity(albums.len());
        let mut by_relative_path = HashMap::with_capacity(albums.len());
        for (idx, album) in albums.iter().enumerate() {
            by_name.insert(album.name.clone(), idx);
            by_relative_path.insert(album.relative_path.clone(), idx);
        }
        Self {
            albums,
            by_name,
            by_relative_path,
        }
    }

    /// Resolve an album by display name, falling back to relative path.
    pub fn resolve(&self, key: &str) -> Option<&AlbumInfo> {
        self.by_name
            .get(key)
            .or_else(|| self.by_relative_path.get(key))
            .map(|&idx| &self.albums[idx])
    }

    pub fn by_relative_path(&self, relative_path: &str) -> Option<&AlbumInfo> {
        self.by_relative_path
            .get(relative_path)
            .map(|&idx| &self.albums[idx])
    }

    /// Resolve every requested album or fail with the list of non-empty albums.
    pub fn resolve_all(&self, keys: &[String]) -> Result<Vec<AlbumInfo>> {
        keys.iter()
            .map(|key| {
                self.resolve(key)
                    .cloned()
                    .ok_or_else(|| Error::AlbumNotFound {
                        album: key.clone(),
                        available: self.available_names().join(", "),
                    })
            })
            .collect()
    }

    /// Names of albums that contain at least one image, sorted.
    pub fn available_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .albums
            .iter()
            .filter(|a| a.count > 0)
            .map(|a| a.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlbumInfo> {
        self.albums.iter()
    }

    pub fn len(&self) -> usize {
        self.albums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.albums.is_empty()
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Nearby named place returned by a reverse geocoder.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Place {
    pub toponym_name: String,
    /// Second-order administrative division (county).
    pub admin_name2: String,
    /// First-order administrative division (state).
    pub admin_name1: String,
    pub country_name: String,
    pub distance_km: Option<f64>,
}

/// Descriptive metadata copied from the media record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub path: String,
    pub album_name: String,
    pub file_name: String,
    pub created: NaiveDateTime,
}

impl ImageMetadata {
    pub fn date_facets(&self) -> DateFacets {
        DateFacets::from_created(self.created)
    }
}

/// Calendar facets derived from the capture time, stored next to each
/// document so results can be grouped or filtered by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateFacets {
    pub year: i32,
    /// English month name, e.g. `July`.
    pub month: String,
    /// English weekday name, e.g. `Sunday`.
    pub weekday: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Unix seconds, reading `created` as UTC.
    pub timestamp: i64,
}

impl DateFacets {
    pub fn from_created(created: NaiveDateTime) -> Self {
        Self {
            year: created.year(),
            month: created.format("%B").to_string(),
            weekday: created.format("%A").to_string(),
            date: created.format("%Y-%m-%d").to_string(),
            timestamp: created.and_utc().timestamp(),
        }
    }
}

/// Enriched, immutable document stored in the vector index.
///
/// `search_text` is derived from caption, people and place descriptions in
/// that order and is what gets embedded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDocument {
    #[serde(flatten)]
    metadata: ImageMetadata,
    #[serde(flatten)]
    facets: DateFacets,
    caption: String,
    people_description: Option<String>,
    geo_description: Option<String>,
    search_text: String,
}

impl ImageDocument {
    /// Build a document, rejecting an empty caption.
    ///
    /// Blank optional descriptions are normalised to `None`.
    pub fn new(
        metadata: ImageMetadata,
        caption: impl Into<String>,
        people_description: Option<String>,
        geo_description: Option<String>,
    ) -> Result<Self> {
        let caption = caption.into().trim().to_string();
        if caption.is_empty() {
            return Err(Error::Caption(format!(
                "empty caption for {}",
                metadata.path
            )));
        }
        if metadata.path.trim().is_empty() {
            return Err(Error::InvalidInput("document path must not be empty".into()));
        }
        let people_description = non_blank(people_description);
        let geo_description = non_blank(geo_description);
        let search_text = compose_search_text(
            &caption,
            people_description.as_deref(),
            geo_description.as_deref(),
        );
        Ok(Self {
            facets: metadata.date_facets(),
            metadata,
            caption,
            people_description,
            geo_description,
            search_text,
        })
    }

    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    pub fn path(&self) -> &str {
        &self.metadata.path
    }

    pub fn album_name(&self) -> &str {
        &self.metadata.album_name
    }

    pub fn file_name(&self) -> &str {
        &self.metadata.file_name
    }

    pub fn created(&self) -> NaiveDateTime {
        self.metadata.created
    }

    pub fn facets(&self) -> &DateFacets {
        &self.facets
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn people_description(&self) -> Option<&str> {
        self.people_description.as_deref()
    }

    pub fn geo_description(&self) -> Option<&str> {
        self.geo_description.as_deref()
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Join description parts into the embedding input.
///
/// Each part is trimmed and terminated with a period; parts are joined with
/// a single space in caption, people, place order.
pub fn compose_search_text(caption: &str, people: Option<&str>, geo: Option<&str>) -> String {
    [Some(caption), people, geo]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.ends_with('.') {
                part.to_string()
            } else {
                format!("{part}.")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Join an album directory and file name into the absolute image path.
pub fn resolve_image_path(album_dir: &Path, file_name: &str) -> String {
    album_dir.join(file_name).to_string_lossy().into_owned()
}

// =============================================================================
// SEARCH
// =============================================================================

/// Embedding vector.
pub type Vector = Vec<f32>;

/// A ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document: ImageDocument,
    /// Cosine similarity, higher is better.
    pub score: f32,
    /// `1 - score`, lower is better.
    pub distance: f32,
}

impl SearchHit {
    pub fn new(document: ImageDocument, score: f32) -> Self {
        Self {
            document,
            score,
            distance: 1.0 - score,
        }
    }
}
