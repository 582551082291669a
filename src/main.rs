//! # memcoll
//!
//! Command-line front end for the in-memory collection. Each invocation
//! loads a JSON library file into a fresh collection and runs one command
//! against it.
//!
//! ## Usage
//!
//! ```bash
//! # Albums by Low, including albums where Low is only the album artist
//! memcoll query library.json --type album --artist Low --artist-mode album-or-track
//!
//! # Ten best rated tracks
//! memcoll query library.json --order-by rating --desc --limit 10
//!
//! # Index sizes
//! memcoll stats library.json
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use memory_collection::cli::{self, QueryArgs};
use memory_collection::config::{self, RuntimeConfig};
use memory_collection::{completion, library, QueryResult};
use std::path::{Path, PathBuf};

/// Main entry point for memcoll.
///
/// Initializes logging, parses command-line arguments, and routes commands.
/// Logging is controlled via `RUST_LOG`, e.g.
/// `RUST_LOG=memory_collection=debug memcoll query library.json`.
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Query(query) => {
            let config = load_config(args.config.as_deref())?;
            config::init_worker_pool(&config);
            run_query(&query, &config)?;
        }
        cli::Command::Stats { library } => {
            let config = load_config(args.config.as_deref())?;
            let path = library_path(library, &config)?;
            let collection = library::open_collection(&path)?;
            let stats = collection.stats();
            println!("tracks:    {}", stats.tracks);
            println!("artists:   {}", stats.artists);
            println!("albums:    {}", stats.albums);
            println!("genres:    {}", stats.genres);
            println!("composers: {}", stats.composers);
            println!("years:     {}", stats.years);
            println!("labels:    {}", stats.labels);
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
        cli::Command::CompleteFields => {
            completion::print_field_completions();
        }
    }

    Ok(())
}

/// An explicit config file must exist; the default location may not.
fn load_config(explicit: Option<&Path>) -> Result<RuntimeConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file {} does not exist", path.display());
            }
            RuntimeConfig::load(path)
        }
        None => match config::get_config_path() {
            Ok(path) => RuntimeConfig::load(&path),
            Err(e) => {
                debug!("No config directory ({e}), using defaults");
                Ok(RuntimeConfig::default())
            }
        },
    }
}

fn library_path(given: Option<PathBuf>, config: &RuntimeConfig) -> Result<PathBuf> {
    given
        .or_else(|| config.library_path.clone())
        .context("No library file given and no library_path configured")
}

fn run_query(query: &QueryArgs, config: &RuntimeConfig) -> Result<()> {
    let path = library_path(query.library.clone(), config)?;
    let collection = library::open_collection(&path)?;

    let mut qm = collection.query_maker();
    query.configure(&mut qm, config.default_limit);
    info!("Running {:?} query on {}", qm.query_type(), path.display());
    qm.run()?;

    let result = qm
        .wait()
        .context("Query finished without delivering a result")?;
    print_result(&result, query.return_values.len());
    Ok(())
}

/// One line per item. Custom return values print one tab-separated line
/// per track.
fn print_result(result: &QueryResult, values_per_track: usize) {
    match result {
        QueryResult::Tracks(tracks) => {
            for track in tracks {
                println!("{}\t{}", track.uid_url(), track);
            }
        }
        QueryResult::Albums(albums) => {
            for album in albums {
                match album.album_artist() {
                    Some(artist) => println!("{}\t{}", album.name(), artist.name()),
                    None => println!("{}", album.name()),
                }
            }
        }
        QueryResult::Custom(values) if values_per_track > 1 => {
            for row in values.chunks(values_per_track) {
                println!("{}", row.join("\t"));
            }
        }
        other => {
            for name in other.names() {
                println!("{name}");
            }
        }
    }
}
