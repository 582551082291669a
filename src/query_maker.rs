//! # Query Builder
//!
//! [`MemoryQueryMaker`] accumulates a query through chained builder calls
//! and runs it on the process-wide rayon pool. Results come back as
//! [`QueryEvent`]s on a channel owned by the maker.
//!
//! ## Building
//!
//! - **Type**: the first non-`None` [`QueryType`] wins.
//! - **Matchers**: exact entity matches, applied in the order added.
//! - **Filters**: leaves go into the innermost open `and`/`or` group;
//!   groups left open are closed when the query runs.
//! - **Shaping**: ordering, shuffling, a size cap, album and label modes.
//! - **Custom**: per-track return values *or* aggregate return functions,
//!   whichever kind is added first.
//!
//! Builder methods never fail directly. The first invalid request is
//! remembered and reported by [`MemoryQueryMaker::run`].
//!
//! ## Running
//!
//! ```no_run
//! use memory_collection::{MemoryCollection, QueryType};
//!
//! let collection = MemoryCollection::new("local");
//! let mut qm = collection.query_maker();
//! qm.set_query_type(QueryType::Album).add_match_artist_name("Low");
//! qm.run()?;
//! let albums = qm.wait();
//! # Ok::<(), memory_collection::QueryError>(())
//! ```

use crate::collection::MemoryCollection;
use crate::custom::{CustomReturnFunction, CustomReturnValue, ReturnFunction};
use crate::error::{QueryError, Result};
use crate::filter::{FilterFactory, FilterStack, MemoryFilter, NumberComparison};
use crate::matcher::{ArtistMatchBehaviour, MatcherChain, MemoryMatcher};
use crate::meta::{
    AlbumKey, AlbumPtr, ArtistPtr, ComposerPtr, DataPtr, GenrePtr, LabelPtr, MetaField, Track,
    TrackList, YearPtr,
};
use crate::query_internal::MemoryQueryMakerInternal;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueryType {
    #[default]
    None,
    Track,
    Artist,
    /// Artists that are the album artist of at least one matching track
    AlbumArtist,
    Album,
    Genre,
    Composer,
    Year,
    Label,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlbumQueryMode {
    #[default]
    AllAlbums,
    OnlyCompilations,
    OnlyNormalAlbums,
}

impl AlbumQueryMode {
    #[must_use]
    pub fn accepts(self, track: &Track) -> bool {
        match self {
            Self::AllAlbums => true,
            Self::OnlyCompilations => track.album().is_compilation(),
            Self::OnlyNormalAlbums => !track.album().is_compilation(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LabelQueryMode {
    #[default]
    NoConstraint,
    OnlyWithLabels,
    OnlyWithoutLabels,
}

impl LabelQueryMode {
    #[must_use]
    pub fn accepts(self, track: &Track) -> bool {
        match self {
            Self::NoConstraint => true,
            Self::OnlyWithLabels => !track.labels().is_empty(),
            Self::OnlyWithoutLabels => track.labels().is_empty(),
        }
    }
}

/// The payload of a finished query, typed by what was asked for.
#[derive(Debug, Clone)]
pub enum QueryResult {
    Tracks(TrackList),
    Artists(Vec<ArtistPtr>),
    Albums(Vec<AlbumPtr>),
    Genres(Vec<GenrePtr>),
    Composers(Vec<ComposerPtr>),
    Years(Vec<YearPtr>),
    Labels(Vec<LabelPtr>),
    Custom(Vec<String>),
    Data(Vec<DataPtr>),
}

impl QueryResult {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Tracks(list) => list.len(),
            Self::Artists(list) => list.len(),
            Self::Albums(list) => list.len(),
            Self::Genres(list) => list.len(),
            Self::Composers(list) => list.len(),
            Self::Years(list) => list.len(),
            Self::Labels(list) => list.len(),
            Self::Custom(list) => list.len(),
            Self::Data(list) => list.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display names in result order. Tracks give their title, custom
    /// results their raw values.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Tracks(list) => list.iter().map(|t| t.title().to_owned()).collect(),
            Self::Artists(list) => list.iter().map(|a| a.name().to_owned()).collect(),
            Self::Albums(list) => list.iter().map(|a| a.name().to_owned()).collect(),
            Self::Genres(list) => list.iter().map(|g| g.name().to_owned()).collect(),
            Self::Composers(list) => list.iter().map(|c| c.name().to_owned()).collect(),
            Self::Years(list) => list.iter().map(|y| y.name()).collect(),
            Self::Labels(list) => list.iter().map(|l| l.name().to_owned()).collect(),
            Self::Custom(values) => values.clone(),
            Self::Data(list) => list.iter().map(DataPtr::name).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueryEvent {
    NewResultReady {
        collection_id: String,
        result: QueryResult,
    },
    /// Always the last event of a job that was not aborted
    QueryDone,
}

#[derive(Debug, Default)]
struct JobState {
    finished: AtomicBool,
    aborted: AtomicBool,
}

impl JobState {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Job {
    state: Arc<JobState>,
    events: Receiver<QueryEvent>,
}

/// Builder and handle for one asynchronous query against a
/// [`MemoryCollection`].
///
/// The maker only holds a weak reference; a collection dropped before the
/// worker starts yields an empty result.
#[derive(Debug)]
pub struct MemoryQueryMaker {
    collection: Weak<MemoryCollection>,
    collection_id: String,
    query_type: QueryType,
    matchers: MatcherChain,
    filters: FilterStack,
    album_query_mode: AlbumQueryMode,
    label_query_mode: LabelQueryMode,
    order_by: Option<MetaField>,
    order_descending: bool,
    randomize: bool,
    max_size: Option<usize>,
    return_as_data_ptrs: bool,
    return_values: Vec<CustomReturnValue>,
    return_functions: Vec<CustomReturnFunction>,
    error: Option<QueryError>,
    job: Option<Job>,
}

impl MemoryQueryMaker {
    pub(crate) fn new(collection: Weak<MemoryCollection>, collection_id: String) -> Self {
        Self {
            collection,
            collection_id,
            query_type: QueryType::None,
            matchers: MatcherChain::default(),
            filters: FilterStack::default(),
            album_query_mode: AlbumQueryMode::AllAlbums,
            label_query_mode: LabelQueryMode::NoConstraint,
            order_by: None,
            order_descending: false,
            randomize: false,
            max_size: None,
            return_as_data_ptrs: false,
            return_values: Vec::new(),
            return_functions: Vec::new(),
            error: None,
            job: None,
        }
    }

    #[must_use]
    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    #[must_use]
    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    /// The first builder error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&QueryError> {
        self.error.as_ref()
    }

    fn record(&mut self, error: QueryError) {
        debug!("Query on `{}': {error}", self.collection_id);
        self.error.get_or_insert(error);
    }

    pub fn set_query_type(&mut self, query_type: QueryType) -> &mut Self {
        if self.query_type == QueryType::None {
            self.query_type = query_type;
        } else if query_type != self.query_type {
            warn!(
                "Query type already set to {:?}, ignoring {query_type:?}",
                self.query_type
            );
        }
        self
    }

    pub fn add_match(&mut self, matcher: MemoryMatcher) -> &mut Self {
        self.matchers.push(matcher);
        self
    }

    pub fn add_match_track(&mut self, uid_url: impl Into<String>) -> &mut Self {
        self.add_match(MemoryMatcher::Track(uid_url.into()))
    }

    pub fn add_match_artist(
        &mut self,
        name: impl Into<String>,
        behaviour: ArtistMatchBehaviour,
    ) -> &mut Self {
        self.add_match(MemoryMatcher::Artist {
            name: name.into(),
            behaviour,
        })
    }

    /// Match on the track artist only.
    pub fn add_match_artist_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_match_artist(name, ArtistMatchBehaviour::TrackArtists)
    }

    /// An empty `album_artist` selects the album without an album artist.
    pub fn add_match_album(
        &mut self,
        name: impl Into<String>,
        album_artist: impl Into<String>,
    ) -> &mut Self {
        self.add_match(MemoryMatcher::Album(AlbumKey::new(name, album_artist)))
    }

    pub fn add_match_genre(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_match(MemoryMatcher::Genre(name.into()))
    }

    pub fn add_match_composer(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_match(MemoryMatcher::Composer(name.into()))
    }

    pub fn add_match_year(&mut self, year: i32) -> &mut Self {
        self.add_match(MemoryMatcher::Year(year))
    }

    pub fn add_match_label(&mut self, name: impl Into<String>) -> &mut Self {
        self.add_match(MemoryMatcher::Label(name.into()))
    }

    pub fn add_filter(
        &mut self,
        field: MetaField,
        pattern: &str,
        match_begin: bool,
        match_end: bool,
    ) -> &mut Self {
        match FilterFactory::filter(field, pattern, match_begin, match_end) {
            Ok(filter) => self.filters.push(filter),
            Err(error) => self.record(error),
        }
        self
    }

    pub fn exclude_filter(
        &mut self,
        field: MetaField,
        pattern: &str,
        match_begin: bool,
        match_end: bool,
    ) -> &mut Self {
        match FilterFactory::filter(field, pattern, match_begin, match_end) {
            Ok(filter) => self.filters.push(MemoryFilter::negate(filter)),
            Err(error) => self.record(error),
        }
        self
    }

    pub fn add_number_filter(
        &mut self,
        field: MetaField,
        value: i64,
        comparison: NumberComparison,
    ) -> &mut Self {
        match FilterFactory::number_filter(field, value, comparison) {
            Ok(filter) => self.filters.push(filter),
            Err(error) => self.record(error),
        }
        self
    }

    pub fn exclude_number_filter(
        &mut self,
        field: MetaField,
        value: i64,
        comparison: NumberComparison,
    ) -> &mut Self {
        match FilterFactory::number_filter(field, value, comparison) {
            Ok(filter) => self.filters.push(MemoryFilter::negate(filter)),
            Err(error) => self.record(error),
        }
        self
    }

    pub fn begin_and(&mut self) -> &mut Self {
        self.filters.begin_and();
        self
    }

    pub fn begin_or(&mut self) -> &mut Self {
        self.filters.begin_or();
        self
    }

    pub fn end_and_or(&mut self) -> &mut Self {
        if let Err(error) = self.filters.end() {
            self.record(error);
        }
        self
    }

    pub fn set_album_query_mode(&mut self, mode: AlbumQueryMode) -> &mut Self {
        self.album_query_mode = mode;
        self
    }

    pub fn set_label_query_mode(&mut self, mode: LabelQueryMode) -> &mut Self {
        self.label_query_mode = mode;
        self
    }

    pub fn order_by(&mut self, field: MetaField, descending: bool) -> &mut Self {
        self.order_by = Some(field);
        self.order_descending = descending;
        self
    }

    pub fn order_by_random(&mut self) -> &mut Self {
        self.randomize = true;
        self
    }

    /// A negative size means no limit.
    pub fn limit_max_result_size(&mut self, size: i32) -> &mut Self {
        self.max_size = usize::try_from(size).ok();
        self
    }

    /// Ignored once a return function has been added.
    pub fn add_return_value(&mut self, field: MetaField) -> &mut Self {
        if self.return_functions.is_empty() {
            self.return_values.push(CustomReturnValue::new(field));
        } else {
            warn!("Ignoring return value {field}: query already aggregates");
        }
        self
    }

    /// Ignored once a return value has been added.
    pub fn add_return_function(&mut self, function: ReturnFunction, field: MetaField) -> &mut Self {
        if !self.return_values.is_empty() {
            warn!("Ignoring return function {function:?}({field}): query already returns values");
            return self;
        }
        match CustomReturnFunction::new(function, field) {
            Ok(function) => self.return_functions.push(function),
            Err(error) => self.record(error),
        }
        self
    }

    pub fn set_return_result_as_data_ptrs(&mut self, as_data_ptrs: bool) -> &mut Self {
        self.return_as_data_ptrs = as_data_ptrs;
        self
    }

    /// Validate the query and freeze it into a plan that can be run on any
    /// thread, including the caller's.
    pub fn prepare(&self) -> Result<MemoryQueryMakerInternal> {
        if self.query_type == QueryType::None {
            return Err(QueryError::NoQueryType);
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.randomize {
            if let Some(field) = self.order_by {
                warn!("Query asks for both random order and order by {field}; shuffling wins");
            }
        }

        Ok(MemoryQueryMakerInternal {
            collection: self.collection.clone(),
            collection_id: self.collection_id.clone(),
            query_type: self.query_type,
            matchers: self.matchers.clone(),
            filters: self.filters.build(),
            album_query_mode: self.album_query_mode,
            label_query_mode: self.label_query_mode,
            order_by: self.order_by,
            order_descending: self.order_descending,
            randomize: self.randomize,
            max_size: self.max_size,
            return_as_data_ptrs: self.return_as_data_ptrs,
            return_values: self.return_values.clone(),
            return_functions: self.return_functions.clone(),
        })
    }

    /// Whether a job started by [`run`](Self::run) has neither finished nor
    /// been aborted.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| !job.state.is_finished() && !job.state.is_aborted())
    }

    /// Start the query on the worker pool and return immediately.
    pub fn run(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(QueryError::AlreadyRunning);
        }
        let query = self.prepare()?;

        let (sender, events) = mpsc::channel();
        let state = Arc::new(JobState::default());
        let worker_state = Arc::clone(&state);

        debug!(
            "Starting {:?} query on `{}'",
            query.query_type(),
            query.collection_id()
        );
        rayon::spawn(move || {
            if worker_state.is_aborted() {
                worker_state.finished.store(true, Ordering::Release);
                return;
            }
            let result = query.run_query();
            // Finished before the first send: whoever receives the result
            // may call `run` again straight away.
            worker_state.finished.store(true, Ordering::Release);
            if worker_state.is_aborted() {
                return;
            }
            // The receiver is gone once the maker aborts, reruns or drops.
            let delivered = sender
                .send(QueryEvent::NewResultReady {
                    collection_id: query.collection_id().to_owned(),
                    result,
                })
                .and_then(|()| sender.send(QueryEvent::QueryDone));
            if delivered.is_err() {
                debug!("Query on `{}' finished with nobody listening", query.collection_id());
            }
        });

        self.job = Some(Job { state, events });
        Ok(())
    }

    /// Events of the current job, `None` before the first run or after an
    /// abort.
    #[must_use]
    pub fn events(&self) -> Option<&Receiver<QueryEvent>> {
        self.job.as_ref().map(|job| &job.events)
    }

    /// Block until the current job delivers its result. `None` if there is
    /// no job, it was aborted, or its result was already taken.
    #[must_use]
    pub fn wait(&self) -> Option<QueryResult> {
        let job = self.job.as_ref()?;
        while let Ok(event) = job.events.recv() {
            match event {
                QueryEvent::NewResultReady { result, .. } => return Some(result),
                QueryEvent::QueryDone => return None,
            }
        }
        None
    }

    /// Abandon the current job. It delivers no further events and a new
    /// [`run`](Self::run) may start straight away.
    pub fn abort_query(&mut self) {
        if let Some(job) = self.job.take() {
            job.state.aborted.store(true, Ordering::Release);
            debug!("Aborted query on `{}'", self.collection_id);
        }
    }
}

impl Drop for MemoryQueryMaker {
    fn drop(&mut self) {
        self.abort_query();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::TrackInfo;

    fn collection() -> Arc<MemoryCollection> {
        let mut trust = TrackInfo::new("file:///low/candy.ogg", "Candy Girl", "Low", "Trust");
        trust.year = 2002;
        trust.rating = 8;
        let mut split = TrackInfo::new("file:///split/a.ogg", "Shared", "Guest", "Split EP");
        split.album_artist = Some("Low".to_string());
        split.year = 2004;
        let mut mogwai = TrackInfo::new("file:///mogwai/like.ogg", "Like Herod", "Mogwai", "Young Team");
        mogwai.year = 1997;
        mogwai.rating = 10;
        MemoryCollection::from_tracks("local", vec![trust, split, mogwai])
    }

    #[test]
    fn test_run_delivers_result_then_done() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Track)
            .add_match_artist("Low", ArtistMatchBehaviour::AlbumOrTrackArtists);
        qm.run().unwrap();

        let events = qm.events().unwrap();
        match events.recv().unwrap() {
            QueryEvent::NewResultReady {
                collection_id,
                result,
            } => {
                assert_eq!(collection_id, "local");
                assert_eq!(result.names(), vec!["Candy Girl", "Shared"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events.recv().unwrap(), QueryEvent::QueryDone));
    }

    #[test]
    fn test_first_query_type_wins() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Year).set_query_type(QueryType::Track);
        assert_eq!(qm.query_type(), QueryType::Year);
        qm.run().unwrap();
        assert_eq!(qm.wait().unwrap().names(), vec!["1997", "2002", "2004"]);
    }

    #[test]
    fn test_missing_query_type_is_rejected() {
        let collection = collection();
        let mut qm = collection.query_maker();
        assert_eq!(qm.run(), Err(QueryError::NoQueryType));
        assert!(qm.events().is_none());
    }

    #[test]
    fn test_builder_errors_surface_on_run() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Track)
            .add_number_filter(MetaField::Title, 3, NumberComparison::Equals)
            .end_and_or();
        assert_eq!(
            qm.run(),
            Err(QueryError::UnsupportedField {
                field: MetaField::Title,
                kind: crate::error::FieldKind::Number,
            })
        );

        let mut unbalanced = collection.query_maker();
        unbalanced.set_query_type(QueryType::Track).end_and_or();
        assert_eq!(unbalanced.run(), Err(QueryError::UnbalancedFilterGroups));
    }

    #[test]
    fn test_second_run_while_outstanding_is_rejected() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Artist);

        // The worker cannot read the maps while the write guard is held.
        let guard = collection.write();
        qm.run().unwrap();
        assert_eq!(qm.run(), Err(QueryError::AlreadyRunning));
        drop(guard);

        assert_eq!(qm.wait().unwrap().names(), vec!["Guest", "Low", "Mogwai"]);
    }

    #[test]
    fn test_rerun_after_wait_on_same_maker() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Artist);

        for _ in 0..200 {
            qm.run().unwrap();
            assert_eq!(qm.wait().unwrap().len(), 3);
            assert!(!qm.is_running());
        }
    }

    #[test]
    fn test_rerun_after_wait_on_fresh_makers() {
        let collection = collection();
        for _ in 0..200 {
            let mut qm = collection.query_maker();
            qm.set_query_type(QueryType::Year);
            qm.run().unwrap();
            assert!(qm.wait().is_some());
            assert_eq!(qm.run(), Ok(()));
            assert_eq!(qm.wait().unwrap().names(), vec!["1997", "2002", "2004"]);
        }
    }

    #[test]
    fn test_abort_drops_events_and_allows_rerun() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Genre);

        let guard = collection.write();
        qm.run().unwrap();
        qm.abort_query();
        assert!(qm.events().is_none());
        assert!(!qm.is_running());
        drop(guard);

        qm.run().unwrap();
        assert_eq!(qm.wait().unwrap().len(), 1);
    }

    #[test]
    fn test_dropped_collection_gives_empty_result() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Album);
        drop(collection);
        qm.run().unwrap();
        assert!(qm.wait().unwrap().is_empty());
    }

    #[test]
    fn test_negative_limit_is_unlimited() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Track).limit_max_result_size(-1);
        assert_eq!(qm.prepare().unwrap().run_query().len(), 3);

        let mut capped = collection.query_maker();
        capped.set_query_type(QueryType::Track).limit_max_result_size(0);
        assert!(capped.prepare().unwrap().run_query().is_empty());
    }

    #[test]
    fn test_return_kinds_are_exclusive() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Custom)
            .add_return_function(ReturnFunction::Max, MetaField::Rating)
            .add_return_value(MetaField::Title);
        match qm.prepare().unwrap().run_query() {
            QueryResult::Custom(values) => assert_eq!(values, vec!["10"]),
            other => panic!("expected custom values, got {other:?}"),
        }

        let mut values = collection.query_maker();
        values
            .set_query_type(QueryType::Custom)
            .add_return_value(MetaField::Title)
            .add_return_function(ReturnFunction::Count, MetaField::Title)
            .order_by(MetaField::Rating, true);
        match values.prepare().unwrap().run_query() {
            QueryResult::Custom(values) => {
                assert_eq!(values, vec!["Like Herod", "Candy Girl", "Shared"]);
            }
            other => panic!("expected custom values, got {other:?}"),
        }
    }

    #[test]
    fn test_grouped_and_excluded_filters() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Track)
            .begin_or()
            .add_filter(MetaField::Artist, "low", true, true)
            .add_number_filter(MetaField::Year, 2000, NumberComparison::LessThan)
            .end_and_or()
            .exclude_filter(MetaField::Title, "candy", false, false);
        assert_eq!(qm.prepare().unwrap().run_query().names(), vec!["Like Herod"]);
    }

    #[test]
    fn test_album_match_and_data_pointers() {
        let collection = collection();
        let mut qm = collection.query_maker();
        qm.set_query_type(QueryType::Track)
            .add_match_album("Split EP", "Low")
            .set_return_result_as_data_ptrs(true);
        match qm.prepare().unwrap().run_query() {
            QueryResult::Data(items) => {
                assert_eq!(items.len(), 1);
                assert!(matches!(&items[0], DataPtr::Track(t) if t.title() == "Shared"));
            }
            other => panic!("expected data pointers, got {other:?}"),
        }
    }
}
