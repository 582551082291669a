//! Write sessions over a [`MemoryCollection`].
//!
//! A [`MapChanger`] holds the collection's write lock for as long as it
//! lives. Every change it makes updates the entity maps and the aggregates'
//! track lists together, so queries never see one without the other.

use crate::collection::{CollectionMaps, MapsMut, MemoryCollection};
use crate::meta::{
    Album, AlbumKey, AlbumPtr, Artist, ArtistPtr, Composer, ComposerPtr, Genre, GenrePtr, Label,
    LabelPtr, Track, TrackInfo, TrackPtr, Year, YearPtr,
};
use log::{debug, trace};
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

pub struct MapChanger<'a> {
    collection_id: &'a str,
    maps: RwLockWriteGuard<'a, CollectionMaps>,
}

impl<'a> MapChanger<'a> {
    pub fn new(collection: &'a MemoryCollection) -> Self {
        Self {
            collection_id: collection.id(),
            maps: collection.write(),
        }
    }

    /// Add a track, interning its artist, album, genre, composer, year and
    /// labels. Returns `None` when a track with the same uid already exists.
    pub fn add_track(&mut self, info: TrackInfo) -> Option<TrackPtr> {
        if self.maps.track_map().contains_key(&info.uid_url) {
            debug!(
                "Track `{}' already in collection `{}', not adding",
                info.uid_url, self.collection_id
            );
            return None;
        }
        Some(self.insert_track(info))
    }

    /// Remove a track and prune every aggregate it leaves without tracks.
    /// Returns the removed track, or `None` when `uid_url` is unknown.
    pub fn remove_track(&mut self, uid_url: &str) -> Option<TrackPtr> {
        let mut maps = self.maps.maps_mut();
        let track = maps.tracks.remove(uid_url)?;
        detach(&mut maps, &track);
        prune(&mut maps, &track);
        debug!("Removed track `{uid_url}' from collection `{}'", self.collection_id);
        Some(track)
    }

    /// Replace a track's entry wholesale.
    ///
    /// Returns `true` when an aggregate changed (artist, album, genre,
    /// composer, year or labels) and the track had to be re-registered,
    /// `false` when only plain attributes changed or the track is unknown.
    pub fn update_track(&mut self, info: TrackInfo) -> bool {
        let Some(existing) = self.maps.track_map().get(&info.uid_url).cloned() else {
            debug!("Track `{}' not in collection, nothing to update", info.uid_url);
            return false;
        };

        if aggregates_differ(&existing.to_info(), &info) {
            self.remove_track(&info.uid_url);
            self.insert_track(info);
            return true;
        }

        let replacement = Arc::new(build_track(
            info,
            existing.artist.clone(),
            existing.album.clone(),
            existing.genre.clone(),
            existing.composer.clone(),
            existing.year.clone(),
            existing.labels.clone(),
        ));
        let mut maps = self.maps.maps_mut();
        detach(&mut maps, &existing);
        attach(&mut maps, &replacement);
        maps.tracks
            .insert(replacement.uid_url.clone(), replacement.clone());
        replacement.album.refresh_compilation();
        trace!("Updated attributes of track `{}'", replacement.uid_url);
        false
    }

    fn insert_track(&mut self, info: TrackInfo) -> TrackPtr {
        let artist = self.intern_artist(&info.artist);
        let album = self.intern_album(&info);
        let genre = self.intern_genre(&info.genre);
        let composer = self.intern_composer(&info.composer);
        let year = self.intern_year(info.year);
        let labels = info
            .labels
            .iter()
            .map(|name| self.intern_label(name))
            .collect();

        let track = Arc::new(build_track(info, artist, album, genre, composer, year, labels));
        let mut maps = self.maps.maps_mut();
        attach(&mut maps, &track);
        maps.tracks.insert(track.uid_url.clone(), track.clone());
        if track.compilation {
            track.album.mark_compilation();
        }
        trace!("Added track `{}' to collection `{}'", track.uid_url, self.collection_id);
        track
    }

    fn intern_artist(&mut self, name: &str) -> ArtistPtr {
        if let Some(artist) = self.maps.artist_map().get(name) {
            return artist.clone();
        }
        let artist = Artist::new(name);
        self.maps.add_artist(artist.clone());
        artist
    }

    fn intern_album(&mut self, info: &TrackInfo) -> AlbumPtr {
        let album_artist_name = info.album_artist.clone().unwrap_or_default();
        let key = AlbumKey::new(info.album.clone(), album_artist_name.clone());
        if let Some(album) = self.maps.album_map().get(&key) {
            return album.clone();
        }
        // Album artists share the artist map so the same name is the same instance.
        let album_artist = if album_artist_name.is_empty() {
            None
        } else {
            Some(self.intern_artist(&album_artist_name))
        };
        let album = Album::new(info.album.clone(), album_artist, info.compilation);
        self.maps.add_album(album.clone());
        album
    }

    fn intern_genre(&mut self, name: &str) -> GenrePtr {
        if let Some(genre) = self.maps.genre_map().get(name) {
            return genre.clone();
        }
        let genre = Genre::new(name);
        self.maps.add_genre(genre.clone());
        genre
    }

    fn intern_composer(&mut self, name: &str) -> ComposerPtr {
        if let Some(composer) = self.maps.composer_map().get(name) {
            return composer.clone();
        }
        let composer = Composer::new(name);
        self.maps.add_composer(composer.clone());
        composer
    }

    fn intern_year(&mut self, value: i32) -> YearPtr {
        if let Some(year) = self.maps.year_map().get(&value) {
            return year.clone();
        }
        let year = Year::new(value);
        self.maps.add_year(year.clone());
        year
    }

    fn intern_label(&mut self, name: &str) -> LabelPtr {
        if let Some(label) = self.maps.label_map().get(name) {
            return label.clone();
        }
        let label = Label::new(name);
        self.maps.add_label(label.clone());
        label
    }
}

fn build_track(
    info: TrackInfo,
    artist: ArtistPtr,
    album: AlbumPtr,
    genre: GenrePtr,
    composer: ComposerPtr,
    year: YearPtr,
    labels: Vec<LabelPtr>,
) -> Track {
    Track {
        uid_url: info.uid_url,
        title: info.title,
        comment: info.comment,
        compilation: info.compilation,
        track_number: info.track_number,
        disc_number: info.disc_number,
        rating: info.rating,
        score: info.score,
        playcount: info.playcount,
        first_played: info.first_played,
        last_played: info.last_played,
        length_ms: info.length_ms,
        filesize: info.filesize,
        sample_rate: info.sample_rate,
        bitrate: info.bitrate,
        create_date: info.create_date,
        artist,
        album,
        genre,
        composer,
        year,
        labels,
    }
}

/// Register `track` in the track list of every aggregate it refers to.
fn attach(maps: &mut MapsMut<'_>, track: &TrackPtr) {
    track.artist.tracks.add(track);
    track.album.tracks.add(track);
    track.genre.tracks.add(track);
    track.composer.tracks.add(track);
    track.year.tracks.add(track);
    for label in &track.labels {
        label.tracks.add(track);
        maps.label_tracks
            .entry(label.name().to_owned())
            .or_default()
            .push(track.clone());
    }
}

fn detach(maps: &mut MapsMut<'_>, track: &TrackPtr) {
    track.artist.tracks.remove(track);
    track.album.tracks.remove(track);
    track.genre.tracks.remove(track);
    track.composer.tracks.remove(track);
    track.year.tracks.remove(track);
    for label in &track.labels {
        label.tracks.remove(track);
        if let Some(tracks) = maps.label_tracks.get_mut(label.name()) {
            tracks.retain(|other| !Arc::ptr_eq(other, track));
        }
    }
}

/// Drop the aggregates of a detached track that no track refers to anymore.
fn prune(maps: &mut MapsMut<'_>, track: &TrackPtr) {
    let album = &track.album;
    if album.has_tracks() {
        album.refresh_compilation();
    } else {
        maps.albums.remove(&album.key());
        if let Some(album_artist) = album.album_artist() {
            prune_artist(maps, album_artist);
        }
    }
    prune_artist(maps, &track.artist);

    if !track.genre.has_tracks() {
        maps.genres.remove(track.genre.name());
    }
    if !track.composer.has_tracks() {
        maps.composers.remove(track.composer.name());
    }
    if !track.year.has_tracks() {
        maps.years.remove(&track.year.year());
    }
    for label in &track.labels {
        if !label.has_tracks() {
            maps.labels.remove(label.name());
            maps.label_tracks.remove(label.name());
        }
    }
}

fn prune_artist(maps: &mut MapsMut<'_>, artist: &ArtistPtr) {
    let referenced_as_album_artist = maps.albums.values().any(|album| {
        album
            .album_artist()
            .is_some_and(|album_artist| Arc::ptr_eq(album_artist, artist))
    });
    if !artist.has_tracks() && !referenced_as_album_artist {
        maps.artists.remove(artist.name());
    }
}

fn aggregates_differ(old: &TrackInfo, new: &TrackInfo) -> bool {
    old.artist != new.artist
        || old.album != new.album
        || old.album_artist.as_deref().unwrap_or_default()
            != new.album_artist.as_deref().unwrap_or_default()
        || old.genre != new.genre
        || old.composer != new.composer
        || old.year != new.year
        || old.labels != new.labels
}
