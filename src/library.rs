//! Library files: a JSON array of [`TrackInfo`] records.
//!
//! A library file is the simplest logical source a [`MemoryCollection`] can
//! be filled from. Missing fields take their defaults, so a minimal record
//! only needs a `uid_url`.

use crate::collection::MemoryCollection;
use crate::meta::TrackInfo;
use anyhow::{Context, Result};
use log::info;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Read every track record from `path`.
pub fn load_library(path: &Path) -> Result<Vec<TrackInfo>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read library file {}", path.display()))?;
    let tracks: Vec<TrackInfo> = serde_json::from_str(&text)
        .with_context(|| format!("Invalid library file {}", path.display()))?;
    info!("Read {} tracks from {}", tracks.len(), path.display());
    Ok(tracks)
}

/// Write `tracks` to `path` as pretty-printed JSON.
pub fn save_library(path: &Path, tracks: &[TrackInfo]) -> Result<()> {
    let text = serde_json::to_string_pretty(tracks).context("Failed to serialize library")?;
    fs::write(path, text)
        .with_context(|| format!("Failed to write library file {}", path.display()))
}

/// Load `path` into a new collection named after the file.
pub fn open_collection(path: &Path) -> Result<Arc<MemoryCollection>> {
    let tracks = load_library(path)?;
    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(MemoryCollection::from_tracks(id, tracks))
}

/// Dump a collection's tracks in uid order.
pub fn save_collection(path: &Path, collection: &MemoryCollection) -> Result<()> {
    let tracks: Vec<TrackInfo> = collection
        .read()
        .track_map()
        .values()
        .map(|track| track.to_info())
        .collect();
    save_library(path, &tracks)
}
