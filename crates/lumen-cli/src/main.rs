//! lumen: build and search a semantic index of a digiKam photo library.

mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(author, version, about = "Semantic search over your photo library")]
#[command(propagate_version = true)]
struct Cli {
    /// Debug logging for lumen crates (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List library albums with image counts
    Albums {
        /// digiKam library directory (holds digikam4.db)
        #[arg(short, long)]
        library: PathBuf,
    },

    /// Caption, enrich and index the given albums
    Build {
        /// digiKam library directory (holds digikam4.db)
        #[arg(short, long)]
        library: PathBuf,

        /// Album to index, by display name or relative path (repeatable)
        #[arg(short, long = "album")]
        albums: Vec<String>,

        /// Vector store directory (default: LUMEN_STORE_DIR, MODEL_CACHE_DIR or .lumen)
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// GeoNames account; enables place descriptions (default: GEONAMES_USERNAME)
        #[arg(long)]
        geonames_user: Option<String>,

        /// Documents per store write (default: LUMEN_BATCH_SIZE or 256)
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search the index with free text
    Search {
        /// What to look for, e.g. "kids playing in the snow"
        query: String,

        /// Number of hits
        #[arg(short = 'k', long, default_value_t = lumen_core::defaults::SEARCH_TOP_K)]
        top_k: usize,

        /// Vector store directory
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what the index contains
    Stats {
        /// Vector store directory
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Albums { library } => commands::albums(library).await,
        Commands::Build {
            library,
            albums,
            store,
            geonames_user,
            batch_size,
        } => {
            commands::build(commands::BuildArgs {
                library,
                albums,
                store,
                geonames_user,
                batch_size,
            })
            .await
        }
        Commands::Search {
            query,
            top_k,
            store,
            json,
        } => commands::search(&query, top_k, store, json).await,
        Commands::Stats { store } => commands::stats(store).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_accepts_repeated_albums() {
        let cli = Cli::try_parse_from([
            "lumen",
            "build",
            "--library",
            "/photos",
            "--album",
            "Travel :: 2019",
            "-a",
            "Family",
            "--batch-size",
            "64",
        ])
        .unwrap();

        match cli.command {
            Commands::Build {
                library,
                albums,
                batch_size,
                store,
                ..
            } => {
                assert_eq!(library, PathBuf::from("/photos"));
                assert_eq!(albums, vec!["Travel :: 2019", "Family"]);
                assert_eq!(batch_size, Some(64));
                assert!(store.is_none());
            }
            other => panic!("Expected build, got {:?}", other),
        }
    }

    #[test]
    fn test_build_without_albums_parses() {
        let cli = Cli::try_parse_from(["lumen", "build", "-l", "/photos"]).unwrap();
        assert!(matches!(cli.command, Commands::Build { albums, .. } if albums.is_empty()));
    }

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["lumen", "search", "dog on a beach"]).unwrap();
        match cli.command {
            Commands::Search {
                query, top_k, json, ..
            } => {
                assert_eq!(query, "dog on a beach");
                assert_eq!(top_k, 12);
                assert!(!json);
            }
            other => panic!("Expected search, got {:?}", other),
        }
    }

    #[test]
    fn test_search_requires_query() {
        assert!(Cli::try_parse_from(["lumen", "search"]).is_err());
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["lumen", "stats", "-v"]).unwrap();
        assert!(cli.verbose);
    }
}
