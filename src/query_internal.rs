//! Query execution.
//!
//! [`MemoryQueryMakerInternal`] is the frozen plan a
//! [`MemoryQueryMaker`](crate::query_maker::MemoryQueryMaker) hands to a
//! worker. Running it:
//!
//! 1. resolves candidates through the matcher chain, or takes every track;
//! 2. applies the filter tree and the album/label query modes;
//! 3. projects onto the query type, de-duplicating entities by key;
//! 4. sorts or shuffles;
//! 5. truncates to the size cap.

use crate::collection::MemoryCollection;
use crate::custom::{CustomReturnFunction, CustomReturnValue};
use crate::filter::MemoryFilter;
use crate::matcher::MatcherChain;
use crate::meta::{DataPtr, MetaField, Track, TrackList, TrackPtr};
use crate::query_maker::{AlbumQueryMode, LabelQueryMode, QueryResult, QueryType};
use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone)]
pub struct MemoryQueryMakerInternal {
    pub(crate) collection: Weak<MemoryCollection>,
    pub(crate) collection_id: String,
    pub(crate) query_type: QueryType,
    pub(crate) matchers: MatcherChain,
    pub(crate) filters: Option<MemoryFilter>,
    pub(crate) album_query_mode: AlbumQueryMode,
    pub(crate) label_query_mode: LabelQueryMode,
    pub(crate) order_by: Option<MetaField>,
    pub(crate) order_descending: bool,
    pub(crate) randomize: bool,
    pub(crate) max_size: Option<usize>,
    pub(crate) return_as_data_ptrs: bool,
    pub(crate) return_values: Vec<CustomReturnValue>,
    pub(crate) return_functions: Vec<CustomReturnFunction>,
}

impl MemoryQueryMakerInternal {
    #[must_use]
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    #[must_use]
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// Execute the plan on the calling thread.
    ///
    /// A collection that has already been dropped yields an empty result of
    /// the requested type.
    #[must_use]
    pub fn run_query(&self) -> QueryResult {
        let tracks = match self.collection.upgrade() {
            Some(collection) => self.candidate_tracks(&collection),
            None => {
                debug!("Collection `{}' is gone, returning empty result", self.collection_id);
                TrackList::new()
            }
        };
        trace!(
            "{:?} query on `{}' kept {} tracks",
            self.query_type,
            self.collection_id,
            tracks.len()
        );
        self.handle_result(tracks)
    }

    fn candidate_tracks(&self, collection: &MemoryCollection) -> TrackList {
        let maps = collection.read();
        let candidates = match self.matchers.match_collection(&maps) {
            Some(tracks) => tracks,
            None => maps.track_map().values().cloned().collect(),
        };

        candidates
            .into_iter()
            .filter(|track| self.filters.as_ref().map_or(true, |f| f.matches(track)))
            .filter(|track| self.album_query_mode.accepts(track))
            .filter(|track| self.label_query_mode.accepts(track))
            .collect()
    }

    fn handle_result(&self, tracks: TrackList) -> QueryResult {
        match self.query_type {
            QueryType::Custom => QueryResult::Custom(self.custom_result(tracks)),
            QueryType::Track => {
                let tracks = self.order_tracks(tracks);
                self.emit_proper_result(tracks, QueryResult::Tracks, DataPtr::Track)
            }
            QueryType::Artist => {
                let artists = self.by_name(project(&tracks, |t| {
                    Some((t.artist().name().to_owned(), t.artist().clone()))
                }), |artist| artist.name().to_owned());
                self.emit_proper_result(artists, QueryResult::Artists, DataPtr::Artist)
            }
            QueryType::AlbumArtist => {
                let artists = self.by_name(project(&tracks, |t| {
                    t.album()
                        .album_artist()
                        .map(|artist| (artist.name().to_owned(), artist.clone()))
                }), |artist| artist.name().to_owned());
                self.emit_proper_result(artists, QueryResult::Artists, DataPtr::Artist)
            }
            QueryType::Album => {
                let albums = self.by_name(
                    project(&tracks, |t| Some((t.album().key(), t.album().clone()))),
                    |album| album.name().to_owned(),
                );
                self.emit_proper_result(albums, QueryResult::Albums, DataPtr::Album)
            }
            QueryType::Genre => {
                let genres = self.by_name(project(&tracks, |t| {
                    Some((t.genre().name().to_owned(), t.genre().clone()))
                }), |genre| genre.name().to_owned());
                self.emit_proper_result(genres, QueryResult::Genres, DataPtr::Genre)
            }
            QueryType::Composer => {
                let composers = self.by_name(project(&tracks, |t| {
                    Some((t.composer().name().to_owned(), t.composer().clone()))
                }), |composer| composer.name().to_owned());
                self.emit_proper_result(composers, QueryResult::Composers, DataPtr::Composer)
            }
            QueryType::Year => {
                // Years order numerically, not by name.
                let mut years = project(&tracks, |t| Some((t.year().year(), t.year().clone())));
                if self.order_descending {
                    years.reverse();
                }
                self.emit_proper_result(years, QueryResult::Years, DataPtr::Year)
            }
            QueryType::Label => {
                let labels: BTreeMap<String, _> = tracks
                    .iter()
                    .flat_map(|t| t.labels().iter())
                    .map(|label| (label.name().to_owned(), label.clone()))
                    .collect();
                let labels = self.by_name(labels.into_values().collect(), |label| {
                    label.name().to_owned()
                });
                self.emit_proper_result(labels, QueryResult::Labels, DataPtr::Label)
            }
            QueryType::None => QueryResult::Tracks(TrackList::new()),
        }
    }

    /// Return functions aggregate the whole set and ignore ordering; return
    /// values are rendered per track after sorting, shuffling and the cap.
    fn custom_result(&self, tracks: TrackList) -> Vec<String> {
        if !self.return_functions.is_empty() {
            return self
                .return_functions
                .iter()
                .map(|function| function.value(&tracks))
                .collect();
        }
        if self.return_values.is_empty() {
            return Vec::new();
        }

        let mut tracks = self.order_tracks(tracks);
        if self.randomize {
            tracks.shuffle(&mut thread_rng());
        }
        self.truncate(&mut tracks);
        tracks
            .iter()
            .flat_map(|track| self.return_values.iter().map(move |value| value.value(track)))
            .collect()
    }

    /// Sort by the order field. Ties keep their incoming order. Skipped when
    /// shuffling, which takes precedence.
    fn order_tracks(&self, mut tracks: TrackList) -> TrackList {
        let Some(field) = self.order_by else {
            return tracks;
        };
        if self.randomize {
            return tracks;
        }

        if field.is_numeric() {
            let number = |track: &TrackPtr| track.number(field).unwrap_or(0.0);
            if self.order_descending {
                tracks.sort_by(|a, b| number(b).total_cmp(&number(a)));
            } else {
                tracks.sort_by(|a, b| number(a).total_cmp(&number(b)));
            }
        } else if self.order_descending {
            tracks.sort_by_cached_key(|track| Reverse(track.text(field).to_lowercase()));
        } else {
            tracks.sort_by_cached_key(|track| track.text(field).to_lowercase());
        }
        tracks
    }

    /// Entity lists are always ordered by name, case-insensitively.
    fn by_name<T>(&self, mut list: Vec<T>, name: impl Fn(&T) -> String) -> Vec<T> {
        if self.order_descending {
            list.sort_by_cached_key(|item| Reverse(name(item).to_lowercase()));
        } else {
            list.sort_by_cached_key(|item| name(item).to_lowercase());
        }
        list
    }

    fn truncate<T>(&self, list: &mut Vec<T>) {
        if let Some(max_size) = self.max_size {
            list.truncate(max_size);
        }
    }

    fn emit_proper_result<T>(
        &self,
        mut list: Vec<T>,
        wrap: fn(Vec<T>) -> QueryResult,
        data: fn(T) -> DataPtr,
    ) -> QueryResult {
        if self.randomize {
            list.shuffle(&mut thread_rng());
        }
        self.truncate(&mut list);

        if self.return_as_data_ptrs {
            QueryResult::Data(list.into_iter().map(data).collect())
        } else {
            wrap(list)
        }
    }
}

/// De-duplicate the entities `key` picks out of `tracks`, in key order.
fn project<K: Ord, T>(tracks: &[TrackPtr], key: impl Fn(&Track) -> Option<(K, Arc<T>)>) -> Vec<Arc<T>> {
    tracks
        .iter()
        .filter_map(|track| key(track))
        .collect::<BTreeMap<K, Arc<T>>>()
        .into_values()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterFactory, NumberComparison};
    use crate::matcher::{ArtistMatchBehaviour, MemoryMatcher};
    use crate::meta::TrackInfo;

    fn track(uid: &str, title: &str, artist: &str, album: &str, year: i32, rating: i32) -> TrackInfo {
        let mut info = TrackInfo::new(uid, title, artist, album);
        info.year = year;
        info.rating = rating;
        info
    }

    fn collection() -> Arc<MemoryCollection> {
        let mut various = track("e", "Echoes", "Various", "Sampler", 1999, 2);
        various.compilation = true;
        various.labels = vec!["mix".to_string()];
        let mut guest = track("d", "Duet", "Guest", "Split", 2005, 7);
        guest.album_artist = Some("Low".to_string());
        MemoryCollection::from_tracks(
            "test",
            vec![
                track("a", "alpha", "Low", "Trust", 2002, 9),
                track("b", "Bravo", "Low", "Trust", 2002, 4),
                track("c", "charlie", "Mogwai", "Young Team", 1997, 7),
                guest,
                various,
            ],
        )
    }

    fn plan(collection: &Arc<MemoryCollection>, query_type: QueryType) -> MemoryQueryMakerInternal {
        MemoryQueryMakerInternal {
            collection: Arc::downgrade(collection),
            collection_id: collection.id().to_owned(),
            query_type,
            matchers: MatcherChain::default(),
            filters: None,
            album_query_mode: AlbumQueryMode::AllAlbums,
            label_query_mode: LabelQueryMode::NoConstraint,
            order_by: None,
            order_descending: false,
            randomize: false,
            max_size: None,
            return_as_data_ptrs: false,
            return_values: Vec::new(),
            return_functions: Vec::new(),
        }
    }

    fn track_uids(result: QueryResult) -> Vec<String> {
        match result {
            QueryResult::Tracks(tracks) => tracks.iter().map(|t| t.uid_url().to_owned()).collect(),
            other => panic!("expected tracks, got {other:?}"),
        }
    }

    #[test]
    fn test_all_tracks_in_key_order() {
        let collection = collection();
        let result = plan(&collection, QueryType::Track).run_query();
        assert_eq!(track_uids(result), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_numeric_sort_with_stable_ties() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Track);
        query.order_by = Some(MetaField::Rating);
        assert_eq!(track_uids(query.run_query()), vec!["e", "b", "c", "d", "a"]);

        query.order_descending = true;
        assert_eq!(track_uids(query.run_query()), vec!["a", "c", "d", "b", "e"]);
    }

    #[test]
    fn test_text_sort_ignores_case() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Track);
        query.order_by = Some(MetaField::Title);
        assert_eq!(track_uids(query.run_query()), vec!["a", "b", "c", "d", "e"]);
        query.order_descending = true;
        assert_eq!(track_uids(query.run_query()), vec!["e", "d", "c", "b", "a"]);
    }

    #[test]
    fn test_limit_applies_after_sort() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Track);
        query.order_by = Some(MetaField::Rating);
        query.order_descending = true;
        query.max_size = Some(2);
        assert_eq!(track_uids(query.run_query()), vec!["a", "c"]);
    }

    #[test]
    fn test_randomize_keeps_members_and_respects_limit() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Track);
        query.randomize = true;
        query.order_by = Some(MetaField::Rating);
        let mut uids = track_uids(query.run_query());
        uids.sort();
        assert_eq!(uids, vec!["a", "b", "c", "d", "e"]);

        query.max_size = Some(3);
        assert_eq!(query.run_query().len(), 3);
    }

    #[test]
    fn test_entities_are_deduplicated_and_named_in_order() {
        let collection = collection();
        let result = plan(&collection, QueryType::Artist).run_query();
        assert_eq!(result.names(), vec!["Guest", "Low", "Mogwai", "Various"]);

        let mut descending = plan(&collection, QueryType::Album);
        descending.order_descending = true;
        assert_eq!(
            descending.run_query().names(),
            vec!["Young Team", "Trust", "Split", "Sampler"]
        );
    }

    #[test]
    fn test_album_artist_projection() {
        let collection = collection();
        let result = plan(&collection, QueryType::AlbumArtist).run_query();
        assert_eq!(result.names(), vec!["Low"]);
    }

    #[test]
    fn test_years_sort_numerically() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Year);
        assert_eq!(query.run_query().names(), vec!["1997", "1999", "2002", "2005"]);
        query.order_descending = true;
        assert_eq!(query.run_query().names(), vec!["2005", "2002", "1999", "1997"]);
    }

    #[test]
    fn test_album_query_modes() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Album);
        query.album_query_mode = AlbumQueryMode::OnlyCompilations;
        assert_eq!(query.run_query().names(), vec!["Sampler"]);

        query.album_query_mode = AlbumQueryMode::OnlyNormalAlbums;
        assert_eq!(query.run_query().names(), vec!["Split", "Trust", "Young Team"]);
    }

    #[test]
    fn test_label_query_modes() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Track);
        query.label_query_mode = LabelQueryMode::OnlyWithLabels;
        assert_eq!(track_uids(query.run_query()), vec!["e"]);

        query.label_query_mode = LabelQueryMode::OnlyWithoutLabels;
        assert_eq!(query.run_query().len(), 4);

        let labels = plan(&collection, QueryType::Label).run_query();
        assert_eq!(labels.names(), vec!["mix"]);
    }

    #[test]
    fn test_matchers_then_filters() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Track);
        query.matchers.push(MemoryMatcher::Artist {
            name: "Low".to_string(),
            behaviour: ArtistMatchBehaviour::AlbumOrTrackArtists,
        });
        assert_eq!(track_uids(query.clone().run_query()), vec!["a", "b", "d"]);

        query.filters = Some(
            FilterFactory::number_filter(MetaField::Rating, 5, NumberComparison::GreaterThan)
                .unwrap(),
        );
        assert_eq!(track_uids(query.run_query()), vec!["a", "d"]);
    }

    #[test]
    fn test_data_pointers() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Genre);
        query.return_as_data_ptrs = true;
        match query.run_query() {
            QueryResult::Data(items) => {
                assert_eq!(items.len(), 1);
                assert!(matches!(items[0], DataPtr::Genre(_)));
            }
            other => panic!("expected data pointers, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_return_values_follow_order_and_limit() {
        let collection = collection();
        let mut query = plan(&collection, QueryType::Custom);
        query.return_values = vec![
            CustomReturnValue::new(MetaField::Title),
            CustomReturnValue::new(MetaField::Rating),
        ];
        query.order_by = Some(MetaField::Rating);
        query.max_size = Some(2);
        match query.run_query() {
            QueryResult::Custom(values) => assert_eq!(values, vec!["Echoes", "2", "Bravo", "4"]),
            other => panic!("expected custom values, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_return_functions_ignore_limit() {
        use crate::custom::ReturnFunction;

        let collection = collection();
        let mut query = plan(&collection, QueryType::Custom);
        query.return_functions = vec![
            CustomReturnFunction::new(ReturnFunction::Count, MetaField::Artist).unwrap(),
            CustomReturnFunction::new(ReturnFunction::Max, MetaField::Year).unwrap(),
        ];
        query.max_size = Some(1);
        match query.run_query() {
            QueryResult::Custom(values) => assert_eq!(values, vec!["4", "2005"]),
            other => panic!("expected custom values, got {other:?}"),
        }
    }

    #[test]
    fn test_dropped_collection_yields_empty_result() {
        let collection = collection();
        let query = plan(&collection, QueryType::Album);
        drop(collection);
        assert!(matches!(query.run_query(), QueryResult::Albums(albums) if albums.is_empty()));
    }
}
