//! Subcommand implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use lumen_core::{Captioner, LibraryReader, SearchHit, VectorStore, CREATED_FORMAT};
use lumen_db::{DigikamConfig, DigikamReader, SqliteVectorStore, StoreConfig};
use lumen_inference::{EmbeddingConfig, OllamaCaptioner};
use lumen_ingest::{
    GeoDescriber, GeonamesConfig, GeonamesGeocoder, IngestConfig, IngestEvent, IngestReport,
    IngestionPipeline,
};
use lumen_search::QueryEngine;

pub struct BuildArgs {
    pub library: PathBuf,
    pub albums: Vec<String>,
    pub store: Option<PathBuf>,
    pub geonames_user: Option<String>,
    pub batch_size: Option<usize>,
}

async fn open_library(library: PathBuf) -> anyhow::Result<DigikamReader> {
    let config = DigikamConfig::from_env(library);
    DigikamReader::open(config.clone())
        .await
        .with_context(|| format!("opening digiKam catalog {}", config.core_db_path().display()))
}

/// `build` creates the store on first use; read commands require it to exist.
async fn open_store(dir: Option<PathBuf>, create: bool) -> anyhow::Result<SqliteVectorStore> {
    let mut config = StoreConfig::from_env();
    if let Some(dir) = dir {
        config = config.with_dir(dir);
    }
    if !create {
        config = config.must_exist();
    }
    let path = config.index_path();
    SqliteVectorStore::open(config, EmbeddingConfig::from_env().build())
        .await
        .with_context(|| format!("opening vector store {}", path.display()))
}

pub async fn albums(library: PathBuf) -> anyhow::Result<()> {
    let reader = open_library(library).await?;
    let index = reader.albums().await?;

    for album in index.iter() {
        println!("{:>7}  {}  ({})", album.count, album.name, album.path.display());
    }
    println!("{} albums", index.len());
    reader.close().await;
    Ok(())
}

pub async fn build(args: BuildArgs) -> anyhow::Result<()> {
    let reader = open_library(args.library).await?;

    if args.albums.is_empty() {
        let index = reader.albums().await?;
        eprintln!("Available albums:");
        for name in index.available_names() {
            eprintln!("  {}", name);
        }
        bail!("no album given, pass one or more --album");
    }

    let captioner = OllamaCaptioner::from_env();
    match captioner.health_check().await {
        Ok(true) => {}
        Ok(false) | Err(_) => warn!(
            model = captioner.model_name(),
            "Caption model not reachable, every record will be skipped until it is"
        ),
    }

    let store = Arc::new(open_store(args.store, true).await?);

    let mut config = IngestConfig::from_env();
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }

    let reader = Arc::new(reader);
    let mut pipeline = IngestionPipeline::new(reader.clone(), Arc::new(captioner), store.clone())
        .with_config(config);
    match args
        .geonames_user
        .map(GeonamesConfig::new)
        .or_else(GeonamesConfig::from_env)
    {
        Some(geonames) => {
            info!(username = %geonames.username, "Place descriptions enabled");
            pipeline =
                pipeline.with_geo(GeoDescriber::new(Arc::new(GeonamesGeocoder::new(geonames))));
        }
        None => info!("GEONAMES_USERNAME not set, place descriptions disabled"),
    }

    let mut events = pipeline.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("    ({} progress events dropped)", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = pipeline.run(&args.albums).await;
    drop(pipeline);
    // Ends once the pipeline and its sender are gone.
    let _ = progress.await;

    store.close().await;
    reader.close().await;

    let report = result?;
    print_report(&report);
    match report.failure {
        None => Ok(()),
        Some(failure) => bail!(failure),
    }
}

fn print_event(event: &IngestEvent) {
    match event {
        IngestEvent::AlbumStarted { album, total } => {
            eprintln!("==> {} ({} images)", album, total)
        }
        IngestEvent::Progress { seen, total, .. } => eprintln!("    {}/{}", seen, total),
        IngestEvent::RecordSkipped { reason, .. } => eprintln!("    skipped: {}", reason),
        IngestEvent::BatchFlushed { documents, .. } => {
            eprintln!("    stored {} documents", documents)
        }
        IngestEvent::AlbumFinished {
            album,
            ingested,
            skipped,
        } => eprintln!("<== {}: {} indexed, {} skipped", album, ingested, skipped),
    }
}

fn print_report(report: &IngestReport) {
    println!(
        "Indexed {} documents in {} batches, {} records skipped",
        report.documents_ingested,
        report.batches_flushed,
        report.records_skipped()
    );
    for skipped in &report.skipped {
        println!(
            "  skipped {}/{}: {}",
            skipped.album,
            skipped.file_name.as_deref().unwrap_or("?"),
            skipped.reason
        );
    }
}

pub async fn search(
    query: &str,
    top_k: usize,
    store: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(open_store(store, false).await?);
    let engine = QueryEngine::new(store.clone());
    let response = engine.execute(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if response.hits.is_empty() {
        println!("No matches.");
    } else {
        for hit in &response.hits {
            println!("{}", format_hit(hit));
        }
    }
    store.close().await;
    Ok(())
}

/// Two lines per hit: score and path, then album, file, date and text.
pub fn format_hit(hit: &SearchHit) -> String {
    let doc = &hit.document;
    format!(
        "{:.2}  {}\n      {} | {} | {} | {}",
        hit.score,
        doc.path(),
        doc.album_name(),
        doc.file_name(),
        doc.created().format(CREATED_FORMAT),
        doc.search_text()
    )
}

pub async fn stats(store: Option<PathBuf>) -> anyhow::Result<()> {
    let store = open_store(store, false).await?;
    let total = store.count().await?;

    println!("Store:  {}", store.dir().display());
    println!("Model:  {}", store.embedding_model());
    println!("Images: {}", total);
    for (album, count) in store.album_counts().await? {
        println!("{:>7}  {}", count, album);
    }
    store.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lumen_core::{ImageDocument, ImageMetadata};

    #[test]
    fn test_format_hit() {
        let doc = ImageDocument::new(
            ImageMetadata {
                path: "/photos/Beach/p1.jpg".to_string(),
                album_name: "Beach".to_string(),
                file_name: "p1.jpg".to_string(),
                created: NaiveDate::from_ymd_opt(2021, 7, 4)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
            },
            "three people swimming",
            Some("The scene contains Alice and Bob.".to_string()),
            None,
        )
        .unwrap();

        let out = format_hit(&SearchHit::new(doc, 0.8765));

        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("0.88  /photos/Beach/p1.jpg"));
        let details = lines.next().unwrap();
        assert!(details.contains("Beach | p1.jpg | 2021-07-04T10:30:00"));
        assert!(details.ends_with("The scene contains Alice and Bob."));
    }
}
