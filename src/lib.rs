//! In-memory music collection with an asynchronous query engine.
//!
//! A [`MemoryCollection`] indexes the tracks of one logical source (a
//! directory tree, a playlist, a remote service) together with the artists,
//! albums, genres, composers, years and labels they reference. Queries are
//! built with a [`MemoryQueryMaker`] and executed on a worker pool.
//!
//! Core modules:
//! - [`meta`] - Tracks and their aggregate entities
//! - [`collection`] - The indexed maps behind one reader/writer lock
//! - [`map_changer`] - Adding, removing and updating tracks consistently
//! - [`matcher`] / [`filter`] - Exact matches and composable filters
//! - [`query_maker`] - The query builder and asynchronous execution
//!
//! ### Supporting Modules
//!
//! - [`config`] - Configuration file and worker pool setup
//! - [`library`] - JSON library files
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use memory_collection::{MemoryCollection, QueryType, TrackInfo};
//! use memory_collection::matcher::ArtistMatchBehaviour;
//!
//! let mut info = TrackInfo::new("file:///music/low/candy.ogg", "Candy Girl", "Low", "Trust");
//! info.year = 2002;
//! let collection = MemoryCollection::from_tracks("local", vec![info]);
//!
//! let mut qm = collection.query_maker();
//! qm.set_query_type(QueryType::Album)
//!     .add_match_artist("Low", ArtistMatchBehaviour::AlbumOrTrackArtists)
//!     .order_by(memory_collection::MetaField::Year, false);
//! qm.run()?;
//!
//! if let Some(result) = qm.wait() {
//!     for name in result.names() {
//!         println!("{name}");
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Query Pipeline
//!
//! 1. **Matchers** resolve the first candidate set straight from the maps;
//!    later matchers narrow it.
//! 2. **Filters** form an and/or tree over track fields.
//! 3. **Modes** keep only compilations, only normal albums, or tracks with
//!    or without labels.
//! 4. **Projection** turns tracks into the requested entity kind,
//!    de-duplicated by key.
//! 5. **Shaping** sorts or shuffles, then applies the size cap.
//!
//! ## Concurrency
//!
//! Each collection has one reader/writer lock. Queries share it; mutations
//! through [`MapChanger`] hold it exclusively. Entities are reference
//! counted, so results stay valid after the collection changes or is
//! dropped.
//!
//! ## Error Handling
//!
//! Query construction reports [`QueryError`]. File and configuration
//! handling returns `anyhow::Result` with context.

pub mod cli;
pub mod collection;
pub mod completion;
pub mod config;
pub mod custom;
pub mod error;
pub mod filter;
pub mod library;
pub mod map_changer;
pub mod matcher;
pub mod meta;
pub mod query_internal;
pub mod query_maker;

pub use collection::{CollectionMaps, CollectionStats, MemoryCollection};
pub use error::{QueryError, Result};
pub use map_changer::MapChanger;
pub use meta::{DataPtr, MetaField, Track, TrackInfo, TrackPtr};
pub use query_maker::{
    AlbumQueryMode, LabelQueryMode, MemoryQueryMaker, QueryEvent, QueryResult, QueryType,
};
