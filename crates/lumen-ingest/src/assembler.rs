//! Builds one enriched [`ImageDocument`] per library record.

use std::path::Path;
use std::sync::Arc;

use lumen_core::{
    describe_people_in_scene, resolve_image_path, split_people_names, AlbumInfo, Captioner,
    ImageDocument, ImageMetadata, MediaRecord, Result,
};
use tracing::{instrument, trace, warn};

use crate::geo::GeoDescriber;

/// Combines caption, people and place descriptions into a document.
///
/// Only the caption is required. People and place enrichment failures are
/// logged and the document is produced without them.
pub struct DocumentAssembler {
    captioner: Arc<dyn Captioner>,
    geo: Option<Arc<GeoDescriber>>,
}

impl DocumentAssembler {
    pub fn new(captioner: Arc<dyn Captioner>) -> Self {
        Self {
            captioner,
            geo: None,
        }
    }

    /// Enable place descriptions.
    pub fn with_geo(mut self, geo: Arc<GeoDescriber>) -> Self {
        self.geo = Some(geo);
        self
    }

    #[instrument(skip_all, fields(subsystem = "ingest", component = "assembler", op = "assemble", album = %album.name, file = %record.file_name))]
    pub async fn assemble(&self, album: &AlbumInfo, record: &MediaRecord) -> Result<ImageDocument> {
        let path = resolve_image_path(&album.path, &record.file_name);
        let caption = self.captioner.caption(Path::new(&path)).await?;
        trace!(path = %path, caption = %caption, "Captioned");

        let people_description = self.people_description(record);
        let geo_description = self.geo_description(record).await;

        ImageDocument::new(
            ImageMetadata {
                path,
                album_name: record.album_name.clone(),
                file_name: record.file_name.clone(),
                created: record.created,
            },
            caption,
            people_description,
            geo_description,
        )
    }

    fn people_description(&self, record: &MediaRecord) -> Option<String> {
        let names = split_people_names(record.people_names.as_deref()?);
        if names.is_empty() {
            return None;
        }
        match describe_people_in_scene(&names) {
            Ok(sentence) => Some(sentence),
            Err(e) => {
                warn!(error = %e, "People description omitted");
                None
            }
        }
    }

    async fn geo_description(&self, record: &MediaRecord) -> Option<String> {
        let coordinates = record.coordinates?;
        let geo = self.geo.as_ref()?;
        match geo.describe_location(coordinates).await {
            Ok(Some(sentence)) => Some(sentence),
            Ok(None) => {
                warn!(
                    lat = coordinates.lat,
                    lon = coordinates.lon,
                    "No places near coordinates, place description omitted"
                );
                None
            }
            Err(e) => {
                warn!(
                    lat = coordinates.lat,
                    lon = coordinates.lon,
                    error = %e,
                    "Geocoding failed, place description omitted"
                );
                None
            }
        }
    }
}
