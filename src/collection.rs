//! # Memory Collection
//!
//! The root aggregate of the query engine: key-ordered maps from natural keys
//! to shared entities, all guarded by a single reader/writer lock.
//!
//! Readers and writers take the lock through scoped guards ([`MemoryCollection::read`],
//! [`MemoryCollection::write`]), so every exit path releases it. Ordered maps
//! make iteration deterministic regardless of the order tracks were added in.
//!
//! ```
//! use memory_collection::{MemoryCollection, TrackInfo};
//!
//! let collection = MemoryCollection::from_tracks(
//!     "local",
//!     vec![TrackInfo::new("file:///a.flac", "Intro", "Artist", "Album")],
//! );
//! assert_eq!(collection.read().track_map().len(), 1);
//! ```

use crate::map_changer::MapChanger;
use crate::meta::{
    AlbumKey, AlbumPtr, ArtistPtr, ComposerPtr, GenrePtr, LabelPtr, TrackInfo, TrackList,
    TrackPtr, YearPtr,
};
use crate::query_maker::MemoryQueryMaker;
use log::debug;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tracks keyed by uid url.
pub type TrackMap = BTreeMap<String, TrackPtr>;
/// Artists keyed by name.
pub type ArtistMap = BTreeMap<String, ArtistPtr>;
/// Albums keyed by title plus album artist.
pub type AlbumMap = BTreeMap<AlbumKey, AlbumPtr>;
pub type GenreMap = BTreeMap<String, GenrePtr>;
pub type ComposerMap = BTreeMap<String, ComposerPtr>;
pub type YearMap = BTreeMap<i32, YearPtr>;
pub type LabelMap = BTreeMap<String, LabelPtr>;
/// Tracks per label name.
pub type LabelToTrackMap = BTreeMap<String, TrackList>;

/// The maps behind a collection's lock.
#[derive(Debug, Default)]
pub struct CollectionMaps {
    tracks: TrackMap,
    artists: ArtistMap,
    albums: AlbumMap,
    genres: GenreMap,
    composers: ComposerMap,
    years: YearMap,
    labels: LabelMap,
    label_tracks: LabelToTrackMap,
}

impl CollectionMaps {
    /// Every track, keyed by uid url.
    #[must_use]
    pub fn track_map(&self) -> &TrackMap {
        &self.tracks
    }

    /// Every artist, whether track artist or album artist.
    #[must_use]
    pub fn artist_map(&self) -> &ArtistMap {
        &self.artists
    }

    /// Albums keyed by [`AlbumKey`].
    #[must_use]
    pub fn album_map(&self) -> &AlbumMap {
        &self.albums
    }

    /// Genres keyed by name.
    #[must_use]
    pub fn genre_map(&self) -> &GenreMap {
        &self.genres
    }

    /// Composers keyed by name.
    #[must_use]
    pub fn composer_map(&self) -> &ComposerMap {
        &self.composers
    }

    /// Years keyed by numeric value, `0` for unknown.
    #[must_use]
    pub fn year_map(&self) -> &YearMap {
        &self.years
    }

    /// Labels keyed by name.
    #[must_use]
    pub fn label_map(&self) -> &LabelMap {
        &self.labels
    }

    /// Tracks carrying each label, keyed by label name.
    #[must_use]
    pub fn label_to_track_map(&self) -> &LabelToTrackMap {
        &self.label_tracks
    }

    // Insert-or-replace by natural key.

    /// Insert `track` under its uid url, replacing any previous entry.
    pub fn add_track(&mut self, track: TrackPtr) {
        self.tracks.insert(track.uid_url().to_owned(), track);
    }

    /// Insert `artist` under its name, replacing any previous entry.
    pub fn add_artist(&mut self, artist: ArtistPtr) {
        self.artists.insert(artist.name().to_owned(), artist);
    }

    /// Insert `album` under its [`AlbumKey`].
    pub fn add_album(&mut self, album: AlbumPtr) {
        self.albums.insert(album.key(), album);
    }

    /// Insert `genre` under its name.
    pub fn add_genre(&mut self, genre: GenrePtr) {
        self.genres.insert(genre.name().to_owned(), genre);
    }

    /// Insert `composer` under its name.
    pub fn add_composer(&mut self, composer: ComposerPtr) {
        self.composers.insert(composer.name().to_owned(), composer);
    }

    /// Insert `year` under its numeric value.
    pub fn add_year(&mut self, year: YearPtr) {
        self.years.insert(year.year(), year);
    }

    /// Insert `label` under its name.
    pub fn add_label(&mut self, label: LabelPtr) {
        self.labels.insert(label.name().to_owned(), label);
    }

    // Wholesale replacement.

    /// Replace the track map. Reverse track lists are not touched; use a
    /// [`MapChanger`] to keep them consistent.
    pub fn set_track_map(&mut self, map: TrackMap) {
        self.tracks = map;
    }

    /// Replace the artist map.
    pub fn set_artist_map(&mut self, map: ArtistMap) {
        self.artists = map;
    }

    /// Replace the album map.
    pub fn set_album_map(&mut self, map: AlbumMap) {
        self.albums = map;
    }

    /// Replace the genre map.
    pub fn set_genre_map(&mut self, map: GenreMap) {
        self.genres = map;
    }

    /// Replace the composer map.
    pub fn set_composer_map(&mut self, map: ComposerMap) {
        self.composers = map;
    }

    /// Replace the year map.
    pub fn set_year_map(&mut self, map: YearMap) {
        self.years = map;
    }

    /// Replace the label map.
    pub fn set_label_map(&mut self, map: LabelMap) {
        self.labels = map;
    }

    /// Replace the label to track map.
    pub fn set_label_to_track_map(&mut self, map: LabelToTrackMap) {
        self.label_tracks = map;
    }

    pub(crate) fn maps_mut(&mut self) -> MapsMut<'_> {
        MapsMut {
            tracks: &mut self.tracks,
            artists: &mut self.artists,
            albums: &mut self.albums,
            genres: &mut self.genres,
            composers: &mut self.composers,
            years: &mut self.years,
            labels: &mut self.labels,
            label_tracks: &mut self.label_tracks,
        }
    }

    /// Number of entries in each map.
    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        CollectionStats {
            tracks: self.tracks.len(),
            artists: self.artists.len(),
            albums: self.albums.len(),
            genres: self.genres.len(),
            composers: self.composers.len(),
            years: self.years.len(),
            labels: self.labels.len(),
        }
    }
}

/// Split mutable borrow of every map, for [`MapChanger`].
pub(crate) struct MapsMut<'a> {
    pub tracks: &'a mut TrackMap,
    pub artists: &'a mut ArtistMap,
    pub albums: &'a mut AlbumMap,
    pub genres: &'a mut GenreMap,
    pub composers: &'a mut ComposerMap,
    pub years: &'a mut YearMap,
    pub labels: &'a mut LabelMap,
    pub label_tracks: &'a mut LabelToTrackMap,
}

/// Map sizes, for diagnostics and the `stats` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub tracks: usize,
    pub artists: usize,
    pub albums: usize,
    pub genres: usize,
    pub composers: usize,
    pub years: usize,
    pub labels: usize,
}

/// In-memory, non-persistent index of one logical source (a directory
/// tree, a playlist, a remote service).
#[derive(Debug)]
pub struct MemoryCollection {
    id: String,
    maps: RwLock<CollectionMaps>,
}

impl MemoryCollection {
    /// An empty collection named `id`.
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            maps: RwLock::new(CollectionMaps::default()),
        })
    }

    /// Build a collection and ingest `tracks` in one write session.
    /// Duplicate uids after the first are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use memory_collection::{MemoryCollection, TrackInfo};
    ///
    /// let collection = MemoryCollection::from_tracks(
    ///     "local",
    ///     vec![TrackInfo::new("file:///low/sunflower.ogg", "Sunflower", "Low", "Things We Lost in the Fire")],
    /// );
    /// assert_eq!(collection.stats().tracks, 1);
    /// assert_eq!(collection.stats().artists, 1);
    /// ```
    pub fn from_tracks(id: impl Into<String>, tracks: impl IntoIterator<Item = TrackInfo>) -> Arc<Self> {
        let collection = Self::new(id);
        {
            let mut changer = collection.map_changer();
            let added = tracks
                .into_iter()
                .filter_map(|info| changer.add_track(info))
                .count();
            debug!("Collection `{}' ingested {added} tracks", collection.id);
        }
        collection
    }

    /// Identifier reported with every query result.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Shared access to the maps; blocks while a writer holds the lock.
    pub fn read(&self) -> RwLockReadGuard<'_, CollectionMaps> {
        self.maps.read()
    }

    /// Exclusive access to the maps; released when the guard drops.
    pub fn write(&self) -> RwLockWriteGuard<'_, CollectionMaps> {
        self.maps.write()
    }

    /// Start a write session that keeps entity maps and track lists in step.
    pub fn map_changer(&self) -> MapChanger<'_> {
        MapChanger::new(self)
    }

    /// A query builder bound to this collection. The builder holds a weak
    /// reference, so it does not keep the collection alive.
    pub fn query_maker(self: &Arc<Self>) -> MemoryQueryMaker {
        MemoryQueryMaker::new(Arc::downgrade(self), self.id.clone())
    }

    /// Map sizes, taken under a short read lock.
    #[must_use]
    pub fn stats(&self) -> CollectionStats {
        self.read().stats()
    }
}
