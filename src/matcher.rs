//! Exact-match predicates on a track's entities.
//!
//! A [`MatcherChain`] is an ordered list of [`MemoryMatcher`]s. The first
//! one resolves its candidates straight from the collection maps; every
//! following matcher narrows the previous output with a linear scan.

use crate::collection::CollectionMaps;
use crate::meta::{AlbumKey, Track, TrackList, TrackPtr};
use std::collections::BTreeMap;

/// Which artist an artist match looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtistMatchBehaviour {
    /// The track's own artist
    #[default]
    TrackArtists,
    /// The album artist of the track's album
    AlbumArtists,
    /// The album artist, falling back to the track artist
    AlbumOrTrackArtists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryMatcher {
    Track(String),
    Artist {
        name: String,
        behaviour: ArtistMatchBehaviour,
    },
    Album(AlbumKey),
    Genre(String),
    Composer(String),
    Year(i32),
    Label(String),
}

impl MemoryMatcher {
    #[must_use]
    pub fn matches(&self, track: &Track) -> bool {
        match self {
            Self::Track(uid) => track.uid_url() == uid,
            Self::Artist { name, behaviour } => artist_matches(track, name, *behaviour),
            Self::Album(key) => track.album().key() == *key,
            Self::Genre(name) => track.genre().name() == name,
            Self::Composer(name) => track.composer().name() == name,
            Self::Year(year) => track.year().year() == *year,
            Self::Label(name) => track.labels().iter().any(|label| label.name() == name),
        }
    }

    /// Look the matching aggregate up in the maps and take its track list.
    /// The result is ordered by track uid.
    #[must_use]
    pub fn match_collection(&self, maps: &CollectionMaps) -> TrackList {
        match self {
            Self::Track(uid) => maps.track_map().get(uid).cloned().into_iter().collect(),
            Self::Artist { name, behaviour } => match behaviour {
                ArtistMatchBehaviour::TrackArtists => maps
                    .artist_map()
                    .get(name)
                    .map(|artist| artist.tracks())
                    .unwrap_or_default(),
                _ => {
                    let mut found: BTreeMap<String, TrackPtr> = maps
                        .album_map()
                        .values()
                        .filter(|album| {
                            album
                                .album_artist()
                                .is_some_and(|artist| artist.name() == name)
                        })
                        .flat_map(|album| album.tracks())
                        .map(|track| (track.uid_url().to_owned(), track))
                        .collect();
                    if *behaviour == ArtistMatchBehaviour::AlbumOrTrackArtists {
                        if let Some(artist) = maps.artist_map().get(name) {
                            found.extend(
                                artist
                                    .tracks()
                                    .into_iter()
                                    .map(|track| (track.uid_url().to_owned(), track)),
                            );
                        }
                    }
                    found.into_values().collect()
                }
            },
            Self::Album(key) => maps
                .album_map()
                .get(key)
                .map(|album| album.tracks())
                .unwrap_or_default(),
            Self::Genre(name) => maps
                .genre_map()
                .get(name)
                .map(|genre| genre.tracks())
                .unwrap_or_default(),
            Self::Composer(name) => maps
                .composer_map()
                .get(name)
                .map(|composer| composer.tracks())
                .unwrap_or_default(),
            Self::Year(year) => maps
                .year_map()
                .get(year)
                .map(|year| year.tracks())
                .unwrap_or_default(),
            Self::Label(name) => {
                let mut tracks = maps
                    .label_to_track_map()
                    .get(name)
                    .cloned()
                    .unwrap_or_default();
                tracks.sort_by(|a, b| a.uid_url().cmp(b.uid_url()));
                tracks
            }
        }
    }

    /// Keep the tracks of `tracks` that match, preserving their order.
    #[must_use]
    pub fn match_tracks(&self, tracks: &[TrackPtr]) -> TrackList {
        tracks
            .iter()
            .filter(|track| self.matches(track))
            .cloned()
            .collect()
    }
}

/// Album artist first; the track artist is only consulted when the
/// behaviour allows falling through to it.
fn artist_matches(track: &Track, name: &str, behaviour: ArtistMatchBehaviour) -> bool {
    if behaviour != ArtistMatchBehaviour::TrackArtists {
        let album_artist_matches = track
            .album()
            .album_artist()
            .is_some_and(|artist| artist.name() == name);
        if album_artist_matches {
            return true;
        }
        if behaviour == ArtistMatchBehaviour::AlbumArtists {
            return false;
        }
    }
    track.artist().name() == name
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatcherChain {
    matchers: Vec<MemoryMatcher>,
}

impl MatcherChain {
    pub fn push(&mut self, matcher: MemoryMatcher) {
        self.matchers.push(matcher);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Run the chain against `maps`; `None` when the chain is empty.
    #[must_use]
    pub fn match_collection(&self, maps: &CollectionMaps) -> Option<TrackList> {
        let (first, rest) = self.matchers.split_first()?;
        let mut tracks = first.match_collection(maps);
        for matcher in rest {
            if tracks.is_empty() {
                break;
            }
            tracks = matcher.match_tracks(&tracks);
        }
        Some(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use crate::meta::TrackInfo;
    use std::sync::Arc;

    /// "split" is by Guest on an album whose album artist is Low.
    fn collection() -> Arc<MemoryCollection> {
        let mut split = TrackInfo::new("split", "Shared", "Guest", "Split EP");
        split.album_artist = Some("Low".to_string());
        let mut own = TrackInfo::new("own", "Own Song", "Low", "Trust");
        own.genre = "Slowcore".to_string();
        own.year = 2002;
        own.labels = vec!["autumn".to_string()];
        let mut other = TrackInfo::new("other", "Other Song", "Guest", "Elsewhere");
        other.genre = "Slowcore".to_string();
        MemoryCollection::from_tracks("test", vec![split, own, other])
    }

    fn uids(tracks: &[TrackPtr]) -> Vec<&str> {
        tracks.iter().map(|t| t.uid_url()).collect()
    }

    fn artist(name: &str, behaviour: ArtistMatchBehaviour) -> MemoryMatcher {
        MemoryMatcher::Artist {
            name: name.to_string(),
            behaviour,
        }
    }

    #[test]
    fn test_track_artists_ignores_album_artist() {
        let collection = collection();
        let maps = collection.read();
        let tracks = artist("Low", ArtistMatchBehaviour::TrackArtists).match_collection(&maps);
        assert_eq!(uids(&tracks), vec!["own"]);
    }

    #[test]
    fn test_album_artists_never_matches_track_artist_alone() {
        let collection = collection();
        let maps = collection.read();
        let tracks = artist("Low", ArtistMatchBehaviour::AlbumArtists).match_collection(&maps);
        assert_eq!(uids(&tracks), vec!["split"]);

        let by_guest = artist("Guest", ArtistMatchBehaviour::AlbumArtists).match_collection(&maps);
        assert!(by_guest.is_empty());
    }

    #[test]
    fn test_album_or_track_artists_falls_through() {
        let collection = collection();
        let maps = collection.read();
        let tracks =
            artist("Low", ArtistMatchBehaviour::AlbumOrTrackArtists).match_collection(&maps);
        assert_eq!(uids(&tracks), vec!["own", "split"]);

        let by_guest =
            artist("Guest", ArtistMatchBehaviour::AlbumOrTrackArtists).match_collection(&maps);
        assert_eq!(uids(&by_guest), vec!["other", "split"]);
    }

    #[test]
    fn test_scan_and_lookup_agree() {
        let collection = collection();
        let maps = collection.read();
        let all: TrackList = maps.track_map().values().cloned().collect();
        for behaviour in [
            ArtistMatchBehaviour::TrackArtists,
            ArtistMatchBehaviour::AlbumArtists,
            ArtistMatchBehaviour::AlbumOrTrackArtists,
        ] {
            let matcher = artist("Low", behaviour);
            assert_eq!(
                uids(&matcher.match_collection(&maps)),
                uids(&matcher.match_tracks(&all)),
                "{behaviour:?}"
            );
        }
    }

    #[test]
    fn test_lookup_by_each_entity_kind() {
        let collection = collection();
        let maps = collection.read();
        let found = |matcher: MemoryMatcher| uids(&matcher.match_collection(&maps)).join(",");

        assert_eq!(found(MemoryMatcher::Track("own".into())), "own");
        assert_eq!(found(MemoryMatcher::Album(AlbumKey::new("Split EP", "Low"))), "split");
        assert_eq!(found(MemoryMatcher::Album(AlbumKey::new("Split EP", ""))), "");
        assert_eq!(found(MemoryMatcher::Genre("Slowcore".into())), "other,own");
        assert_eq!(found(MemoryMatcher::Composer(String::new())), "other,own,split");
        assert_eq!(found(MemoryMatcher::Year(2002)), "own");
        assert_eq!(found(MemoryMatcher::Label("autumn".into())), "own");
        assert_eq!(found(MemoryMatcher::Label("missing".into())), "");
    }

    #[test]
    fn test_chain_narrows_in_order() {
        let collection = collection();
        let maps = collection.read();

        let mut chain = MatcherChain::default();
        assert!(chain.match_collection(&maps).is_none());

        chain.push(MemoryMatcher::Genre("Slowcore".into()));
        chain.push(artist("Guest", ArtistMatchBehaviour::TrackArtists));
        let tracks = chain.match_collection(&maps).unwrap();
        assert_eq!(uids(&tracks), vec!["other"]);
        assert_eq!(chain.len(), 2);
    }
}
