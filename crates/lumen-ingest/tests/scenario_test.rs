//! End-to-end: library fake -> pipeline -> SQLite store -> query.

mod common;

use std::sync::Arc;

use common::{la_jolla, record, Entry, FixedGeocoder, MemoryLibrary, ScriptedCaptioner};
use lumen_core::VectorStore;
use lumen_db::{SqliteVectorStore, StoreConfig};
use lumen_inference::HashingEmbedder;
use lumen_ingest::{GeoDescriber, IngestionPipeline};

const P1: &str = "/photos/Beach/p1.jpg";
const P2: &str = "/photos/Beach/p2.jpg";

async fn ingest_beach(dir: &std::path::Path) -> Arc<SqliteVectorStore> {
    let library = Arc::new(MemoryLibrary::new().with_album(
        "Beach",
        vec![
            Entry::Record(record(
                "Beach",
                "p1.jpg",
                Some("Alice,Bob"),
                Some((32.85, -117.27)),
            )),
            Entry::Record(record("Beach", "p2.jpg", None, None)),
        ],
    ));
    let store = Arc::new(
        SqliteVectorStore::open(
            StoreConfig::default().with_dir(dir),
            Arc::new(HashingEmbedder::default()),
        )
        .await
        .unwrap(),
    );

    let report = IngestionPipeline::new(library, Arc::new(ScriptedCaptioner::new()), store.clone())
        .with_geo(GeoDescriber::new(Arc::new(FixedGeocoder::returning(vec![la_jolla()]))))
        .run(&["Beach".to_string()])
        .await
        .unwrap();
    assert!(report.is_success());
    assert_eq!(report.documents_ingested, 2);
    store
}

#[tokio::test]
async fn test_enriched_photo_found_by_caption_people_and_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = ingest_beach(dir.path()).await;

    for query in [
        "people swimming near the coast",
        "swimming",
        "Alice",
        "La Jolla",
    ] {
        let hits = store.query(query, 1).await.unwrap();
        assert_eq!(hits.len(), 1, "query {query:?}");
        assert_eq!(hits[0].document.path(), P1, "query {query:?}");
        assert!(hits[0].score > 0.0);
    }
}

#[tokio::test]
async fn test_unenriched_photo_has_no_people_or_place() {
    let dir = tempfile::tempdir().unwrap();
    let store = ingest_beach(dir.path()).await;

    let p1 = store.get(P1).await.unwrap().unwrap();
    assert_eq!(p1.caption(), "three people swimming");
    assert_eq!(p1.people_description(), Some("The scene contains Alice and Bob."));
    assert_eq!(
        p1.geo_description(),
        Some("The scene takes place in La Jolla, San Diego County, California.")
    );

    let p2 = store.get(P2).await.unwrap().unwrap();
    assert!(p2.people_description().is_none());
    assert!(p2.geo_description().is_none());
    assert_eq!(p2.album_name(), "Beach");
}

#[tokio::test]
async fn test_reingesting_album_keeps_one_entry_per_photo() {
    let dir = tempfile::tempdir().unwrap();
    let store = ingest_beach(dir.path()).await;
    store.close().await;

    let store = ingest_beach(dir.path()).await;
    assert_eq!(store.count().await.unwrap(), 2);
}
