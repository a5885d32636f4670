//! Read-only access to a digiKam photo catalog (`digikam4.db`).
//!
//! digiKam keeps album roots as volume identifiers. Roots on removable or
//! secondary volumes are stored as `volumeid:?uuid=<UUID>` and resolved
//! under a mount root (default `/mnt/<UUID>`); local roots are stored as
//! `volumeid:?path=<dir>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::StreamExt;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::{debug, info, instrument, warn};

use lumen_core::{
    defaults, AlbumIndex, AlbumInfo, Coordinates, Error, LibraryReader, MediaRecord, MediaStream,
    Result,
};

use crate::pool::{create_pool, PoolConfig};

const UUID_PREFIX: &str = "volumeid:?uuid=";
const PATH_PREFIX: &str = "volumeid:?path=";

/// Date formats digiKam has used for `creationDate` / `modificationDate`.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

const MEDIA_QUERY: &str = "
    SELECT i.name AS file_name,
           a.relativePath AS relative_path,
           COALESCE(ii.creationDate, i.modificationDate) AS created,
           ip.latitudeNumber AS lat,
           ip.longitudeNumber AS lon,
           (SELECT group_concat(t.name, ',')
              FROM ImageTags it
              JOIN Tags t ON t.id = it.tagid
              JOIN TagProperties tp ON tp.tagid = t.id AND tp.property = 'person'
             WHERE it.imageid = i.id) AS people_names
      FROM Images i
      JOIN Albums a ON a.id = i.album
      LEFT JOIN ImageInformation ii ON ii.imageid = i.id
      LEFT JOIN ImagePositions ip ON ip.imageid = i.id
     WHERE i.album = ? AND i.status = 1
     ORDER BY i.id";

/// Location of a digiKam catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigikamConfig {
    /// Directory containing the catalog database files.
    pub library_dir: PathBuf,
    /// Core database file name.
    pub core_db: String,
    /// Directory under which volume UUIDs are mounted.
    pub mount_root: PathBuf,
}

impl DigikamConfig {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            core_db: defaults::DIGIKAM_CORE_DB.to_string(),
            mount_root: PathBuf::from(defaults::DIGIKAM_MOUNT_ROOT),
        }
    }

    /// Catalog at `library_dir`, mount root from `DIGIKAM_MOUNT_ROOT` (default `/mnt`).
    pub fn from_env(library_dir: impl Into<PathBuf>) -> Self {
        let config = Self::new(library_dir);
        match std::env::var("DIGIKAM_MOUNT_ROOT") {
            Ok(root) if !root.trim().is_empty() => config.with_mount_root(root),
            _ => config,
        }
    }

    pub fn with_mount_root(mut self, mount_root: impl Into<PathBuf>) -> Self {
        self.mount_root = mount_root.into();
        self
    }

    pub fn core_db_path(&self) -> PathBuf {
        self.library_dir.join(&self.core_db)
    }
}

/// Resolve an `AlbumRoots` row to the directory holding its albums.
///
/// Returns `None` for identifiers that are neither volume UUIDs nor paths
/// (network shares).
pub fn resolve_album_root(identifier: &str, specific_path: &str, mount_root: &Path) -> Option<PathBuf> {
    let base = if let Some(uuid) = identifier.strip_prefix(UUID_PREFIX) {
        mount_root.join(uuid.to_uppercase())
    } else if let Some(path) = identifier.strip_prefix(PATH_PREFIX) {
        PathBuf::from(path)
    } else {
        return None;
    };
    let specific = specific_path.trim_start_matches('/');
    Some(if specific.is_empty() {
        base
    } else {
        base.join(specific)
    })
}

/// `Travel/2019/Lisbon` becomes `Travel :: 2019 :: Lisbon`.
pub fn album_display_name(relative_path: &str) -> String {
    relative_path.replace('/', " :: ")
}

fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim(), format).ok())
}

/// [`LibraryReader`] over a digiKam SQLite catalog.
pub struct DigikamReader {
    pool: SqlitePool,
    config: DigikamConfig,
}

impl DigikamReader {
    /// Open the catalog read-only.
    pub async fn open(config: DigikamConfig) -> Result<Self> {
        let path = config.core_db_path();
        if !tokio::fs::try_exists(&path).await? {
            return Err(Error::NotFound(format!(
                "digiKam catalog {}",
                path.display()
            )));
        }
        let pool = create_pool(&path, PoolConfig::read_only().max_connections(2)).await?;
        info!(
            subsystem = "library",
            component = "digikam",
            op = "open",
            path = %path.display(),
            "digiKam catalog opened"
        );
        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &DigikamConfig {
        &self.config
    }

    /// Release the catalog connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn album_roots(&self) -> Result<HashMap<i64, PathBuf>> {
        let rows: Vec<(i64, String, Option<String>)> =
            sqlx::query_as("SELECT id, identifier, specificPath FROM AlbumRoots")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        let mut roots = HashMap::with_capacity(rows.len());
        for (id, identifier, specific_path) in rows {
            match resolve_album_root(
                &identifier,
                specific_path.as_deref().unwrap_or_default(),
                &self.config.mount_root,
            ) {
                Some(root) => {
                    roots.insert(id, root);
                }
                None => warn!(
                    album_root = id,
                    identifier = %identifier,
                    "Unsupported album root, its albums are ignored"
                ),
            }
        }
        Ok(roots)
    }
}

fn record_from_row(row: &SqliteRow, album: &AlbumInfo) -> Result<MediaRecord> {
    let file_name: String = row.try_get("file_name")?;
    let relative_path: String = row.try_get("relative_path")?;
    let created = row
        .try_get::<Option<String>, _>("created")?
        .and_then(|raw| parse_date(&raw))
        .ok_or_else(|| {
            Error::InvalidInput(format!("{} has no readable creation date", file_name))
        })?;
    let lat: Option<f64> = row.try_get("lat")?;
    let lon: Option<f64> = row.try_get("lon")?;

    Ok(MediaRecord {
        relative_path: relative_path.trim_start_matches('/').to_string(),
        album_name: album.name.clone(),
        file_name,
        created,
        people_names: row.try_get("people_names")?,
        coordinates: lat.zip(lon).map(|(lat, lon)| Coordinates { lat, lon }),
    })
}

#[async_trait]
impl LibraryReader for DigikamReader {
    #[instrument(skip(self), fields(subsystem = "library", component = "digikam", op = "albums"))]
    async fn albums(&self) -> Result<AlbumIndex> {
        let roots = self.album_roots().await?;
        let rows: Vec<(i64, i64, String, i64)> = sqlx::query_as(
            "SELECT a.id, a.albumRoot, a.relativePath,
                    (SELECT COUNT(*) FROM Images i WHERE i.album = a.id AND i.status = 1)
               FROM Albums a
              ORDER BY a.relativePath",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let albums: Vec<AlbumInfo> = rows
            .into_iter()
            .filter_map(|(album_id, root_id, relative_path, count)| {
                let root = roots.get(&root_id)?;
                let relative_path = relative_path.trim_start_matches('/').to_string();
                Some(AlbumInfo {
                    album_id,
                    name: album_display_name(&relative_path),
                    path: root.join(&relative_path),
                    relative_path,
                    count: count.max(0) as u64,
                })
            })
            .collect();

        debug!(result_count = albums.len(), "Albums resolved");
        Ok(AlbumIndex::new(albums))
    }

    fn stream_media<'a>(&'a self, album: &'a AlbumInfo) -> MediaStream<'a> {
        sqlx::query(MEDIA_QUERY)
            .bind(album.album_id)
            .fetch(&self.pool)
            .map(move |row| match row {
                Ok(row) => record_from_row(&row, album),
                Err(e) => Err(Error::Database(e)),
            })
            .boxed()
    }
}
