//! # Metadata Entities
//!
//! Tracks and the aggregate entities they belong to. Every entity is shared
//! through an `Arc` and keeps its identity for its whole lifetime; a change
//! to a track replaces the entity in the collection maps rather than editing
//! it in place.
//!
//! A [`Track`] owns references to its artist, album, genre, composer, year
//! and labels. Each aggregate keeps the reverse list of its tracks as weak
//! references, so there is no ownership cycle between the two directions.
//! Both directions are maintained together by
//! [`MapChanger`](crate::map_changer::MapChanger).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Shared handle to a track; every map and reverse list holds one.
pub type TrackPtr = Arc<Track>;
pub type ArtistPtr = Arc<Artist>;
pub type AlbumPtr = Arc<Album>;
pub type GenrePtr = Arc<Genre>;
pub type ComposerPtr = Arc<Composer>;
pub type YearPtr = Arc<Year>;
pub type LabelPtr = Arc<Label>;

/// Tracks ordered by uid url.
pub type TrackList = Vec<TrackPtr>;

/// Reverse index from an aggregate entity to the tracks referring to it.
#[derive(Debug, Default)]
pub(crate) struct TrackRefs(RwLock<Vec<Weak<Track>>>);

impl TrackRefs {
    /// Live tracks, ordered by uid.
    fn tracks(&self) -> TrackList {
        let mut tracks: TrackList = self.0.read().iter().filter_map(Weak::upgrade).collect();
        tracks.sort_by(|a, b| a.uid_url.cmp(&b.uid_url));
        tracks
    }

    fn is_empty(&self) -> bool {
        self.0.read().iter().all(|track| track.strong_count() == 0)
    }

    pub(crate) fn add(&self, track: &TrackPtr) {
        self.0.write().push(Arc::downgrade(track));
    }

    pub(crate) fn remove(&self, track: &TrackPtr) {
        let target = Arc::as_ptr(track);
        self.0
            .write()
            .retain(|entry| entry.strong_count() > 0 && entry.as_ptr() != target);
    }
}

macro_rules! named_entity {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name {
            name: String,
            pub(crate) tracks: TrackRefs,
        }

        impl $name {
            pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
                Arc::new(Self {
                    name: name.into(),
                    tracks: TrackRefs::default(),
                })
            }

            /// Display name; empty for the unknown entity.
            #[must_use]
            pub fn name(&self) -> &str {
                &self.name
            }

            /// Tracks currently registered with this entity, ordered by uid.
            #[must_use]
            pub fn tracks(&self) -> TrackList {
                self.tracks.tracks()
            }

            pub(crate) fn has_tracks(&self) -> bool {
                !self.tracks.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.name)
            }
        }
    };
}

named_entity!(
    /// A performer, used both as track artist and as album artist.
    Artist
);
named_entity!(Genre);
named_entity!(Composer);
named_entity!(
    /// A free-form tag; a track may carry any number of labels.
    Label
);

/// Natural key of an album: its title plus the album artist's name.
///
/// Albums sharing a title but not an album artist are different albums.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlbumKey {
    pub name: String,
    pub album_artist: String,
}

impl AlbumKey {
    /// Key for `name` by `album_artist`; pass an empty artist for albums
    /// without one.
    pub fn new(name: impl Into<String>, album_artist: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            album_artist: album_artist.into(),
        }
    }
}

/// A release, identified by title plus album artist.
#[derive(Debug)]
pub struct Album {
    name: String,
    album_artist: Option<ArtistPtr>,
    /// Cached from the album's tracks; any compilation track makes the album one.
    compilation: AtomicBool,
    pub(crate) tracks: TrackRefs,
}

impl Album {
    pub(crate) fn new(
        name: impl Into<String>,
        album_artist: Option<ArtistPtr>,
        compilation: bool,
    ) -> AlbumPtr {
        Arc::new(Self {
            name: name.into(),
            album_artist,
            compilation: AtomicBool::new(compilation),
            tracks: TrackRefs::default(),
        })
    }

    /// Album title.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The album artist, if the album has one.
    #[must_use]
    pub fn album_artist(&self) -> Option<&ArtistPtr> {
        self.album_artist.as_ref()
    }

    #[must_use]
    pub fn has_album_artist(&self) -> bool {
        self.album_artist.is_some()
    }

    /// Whether any of the album's tracks is flagged as a compilation.
    #[must_use]
    pub fn is_compilation(&self) -> bool {
        self.compilation.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn key(&self) -> AlbumKey {
        AlbumKey::new(
            self.name.clone(),
            self.album_artist
                .as_ref()
                .map(|artist| artist.name().to_owned())
                .unwrap_or_default(),
        )
    }

    /// Tracks currently on this album, ordered by uid.
    #[must_use]
    pub fn tracks(&self) -> TrackList {
        self.tracks.tracks()
    }

    pub(crate) fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    pub(crate) fn mark_compilation(&self) {
        self.compilation.store(true, Ordering::Release);
    }

    /// Recompute the compilation flag after tracks left the album.
    pub(crate) fn refresh_compilation(&self) {
        let compilation = self.tracks().iter().any(|track| track.compilation);
        self.compilation.store(compilation, Ordering::Release);
    }
}

impl fmt::Display for Album {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A release year. Year `0` stands for "unknown" and has an empty name.
#[derive(Debug)]
pub struct Year {
    value: i32,
    pub(crate) tracks: TrackRefs,
}

impl Year {
    pub(crate) fn new(value: i32) -> YearPtr {
        Arc::new(Self {
            value,
            tracks: TrackRefs::default(),
        })
    }

    /// Numeric year, `0` when unknown.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.value
    }

    /// Display name: the year as text, empty when unknown.
    #[must_use]
    pub fn name(&self) -> String {
        if self.value == 0 {
            String::new()
        } else {
            self.value.to_string()
        }
    }

    /// Tracks released in this year, ordered by uid.
    #[must_use]
    pub fn tracks(&self) -> TrackList {
        self.tracks.tracks()
    }

    pub(crate) fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Plain description of a track, as read from a library file.
///
/// Ingestion turns this into a [`Track`] whose aggregate entities are
/// interned in the owning collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    pub uid_url: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: Option<String>,
    pub compilation: bool,
    pub genre: String,
    pub composer: String,
    pub year: i32,
    pub labels: Vec<String>,
    pub comment: String,
    pub track_number: i32,
    pub disc_number: i32,
    /// 0 to 10, half stars
    pub rating: i32,
    /// 0 to 100
    pub score: f64,
    pub playcount: i32,
    pub first_played: Option<i64>,
    pub last_played: Option<i64>,
    pub length_ms: i64,
    pub filesize: i64,
    pub sample_rate: i32,
    pub bitrate: i32,
    pub create_date: Option<i64>,
}

impl TrackInfo {
    /// Convenience constructor for the fields every track needs.
    pub fn new(
        uid_url: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            uid_url: uid_url.into(),
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
            ..Default::default()
        }
    }
}

/// A track interned in a collection.
///
/// Aggregate fields point at the entities the collection shares between
/// tracks; replacing them goes through a [`MapChanger`](crate::MapChanger).
#[derive(Debug)]
pub struct Track {
    pub(crate) uid_url: String,
    pub(crate) title: String,
    pub(crate) comment: String,
    pub(crate) compilation: bool,
    pub(crate) track_number: i32,
    pub(crate) disc_number: i32,
    pub(crate) rating: i32,
    pub(crate) score: f64,
    pub(crate) playcount: i32,
    pub(crate) first_played: Option<i64>,
    pub(crate) last_played: Option<i64>,
    pub(crate) length_ms: i64,
    pub(crate) filesize: i64,
    pub(crate) sample_rate: i32,
    pub(crate) bitrate: i32,
    pub(crate) create_date: Option<i64>,
    pub(crate) artist: ArtistPtr,
    pub(crate) album: AlbumPtr,
    pub(crate) genre: GenrePtr,
    pub(crate) composer: ComposerPtr,
    pub(crate) year: YearPtr,
    pub(crate) labels: Vec<LabelPtr>,
}

impl Track {
    /// Unique identifier of the track, usually its url.
    #[must_use]
    pub fn uid_url(&self) -> &str {
        &self.uid_url
    }

    /// Track title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Free-form comment, empty when absent.
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// The performing artist.
    #[must_use]
    pub fn artist(&self) -> &ArtistPtr {
        &self.artist
    }

    /// The album the track belongs to.
    #[must_use]
    pub fn album(&self) -> &AlbumPtr {
        &self.album
    }

    /// Genre; the empty-named genre when unknown.
    #[must_use]
    pub fn genre(&self) -> &GenrePtr {
        &self.genre
    }

    /// Composer; the empty-named composer when unknown.
    #[must_use]
    pub fn composer(&self) -> &ComposerPtr {
        &self.composer
    }

    /// Release year.
    #[must_use]
    pub fn year(&self) -> &YearPtr {
        &self.year
    }

    /// Labels in the order they were given at ingestion.
    #[must_use]
    pub fn labels(&self) -> &[LabelPtr] {
        &self.labels
    }

    /// Position on the disc, `0` when unknown.
    #[must_use]
    pub fn track_number(&self) -> i32 {
        self.track_number
    }

    /// Disc number, `0` when unknown.
    #[must_use]
    pub fn disc_number(&self) -> i32 {
        self.disc_number
    }

    /// User rating on a 0 to 10 scale.
    #[must_use]
    pub fn rating(&self) -> i32 {
        self.rating
    }

    /// Automatic score.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    /// How often the track was played.
    #[must_use]
    pub fn playcount(&self) -> i32 {
        self.playcount
    }

    /// Length in milliseconds.
    #[must_use]
    pub fn length_ms(&self) -> i64 {
        self.length_ms
    }

    /// Text rendering of `field`, as used by text filters, text sorting and
    /// custom return values. Missing timestamps render empty, labels are
    /// joined with `", "`.
    #[must_use]
    pub fn text(&self, field: MetaField) -> String {
        match field {
            MetaField::Url => self.uid_url.clone(),
            MetaField::Title => self.title.clone(),
            MetaField::Artist => self.artist.name().to_owned(),
            MetaField::Album => self.album.name().to_owned(),
            MetaField::AlbumArtist => self
                .album
                .album_artist()
                .map(|artist| artist.name().to_owned())
                .unwrap_or_default(),
            MetaField::Genre => self.genre.name().to_owned(),
            MetaField::Composer => self.composer.name().to_owned(),
            MetaField::Year => self.year.name(),
            MetaField::Comment => self.comment.clone(),
            MetaField::Label => self
                .labels
                .iter()
                .map(|label| label.name())
                .collect::<Vec<_>>()
                .join(", "),
            _ => self
                .number(field)
                .map(format_number)
                .unwrap_or_default(),
        }
    }

    /// Numeric value of `field`, `None` for text-only fields and for
    /// timestamps that were never set.
    #[must_use]
    pub fn number(&self, field: MetaField) -> Option<f64> {
        let value = match field {
            MetaField::Year => f64::from(self.year.year()),
            MetaField::TrackNumber => f64::from(self.track_number),
            MetaField::DiscNumber => f64::from(self.disc_number),
            MetaField::Rating => f64::from(self.rating),
            MetaField::Score => self.score,
            MetaField::Playcount => f64::from(self.playcount),
            MetaField::FirstPlayed => self.first_played? as f64,
            MetaField::LastPlayed => self.last_played? as f64,
            MetaField::Length => self.length_ms as f64,
            MetaField::Filesize => self.filesize as f64,
            MetaField::SampleRate => f64::from(self.sample_rate),
            MetaField::Bitrate => f64::from(self.bitrate),
            MetaField::CreateDate => self.create_date? as f64,
            _ => return None,
        };
        Some(value)
    }

    /// The plain description this track was built from.
    #[must_use]
    pub fn to_info(&self) -> TrackInfo {
        TrackInfo {
            uid_url: self.uid_url.clone(),
            title: self.title.clone(),
            artist: self.artist.name().to_owned(),
            album: self.album.name().to_owned(),
            album_artist: self
                .album
                .album_artist()
                .map(|artist| artist.name().to_owned()),
            compilation: self.compilation,
            genre: self.genre.name().to_owned(),
            composer: self.composer.name().to_owned(),
            year: self.year.year(),
            labels: self.labels.iter().map(|l| l.name().to_owned()).collect(),
            comment: self.comment.clone(),
            track_number: self.track_number,
            disc_number: self.disc_number,
            rating: self.rating,
            score: self.score,
            playcount: self.playcount,
            first_played: self.first_played,
            last_played: self.last_played,
            length_ms: self.length_ms,
            filesize: self.filesize,
            sample_rate: self.sample_rate,
            bitrate: self.bitrate,
            create_date: self.create_date,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist.name(), self.title)
    }
}

/// Format a numeric value without a trailing `.0` when it is integral.
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Type-erased result item, used when a query asks for data pointers
/// instead of a concrete entity list.
#[derive(Debug, Clone)]
pub enum DataPtr {
    Track(TrackPtr),
    Artist(ArtistPtr),
    Album(AlbumPtr),
    Genre(GenrePtr),
    Composer(ComposerPtr),
    Year(YearPtr),
    Label(LabelPtr),
}

impl DataPtr {
    /// Display name of the pointed-to entity; a track's title.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Track(track) => track.title().to_owned(),
            Self::Artist(artist) => artist.name().to_owned(),
            Self::Album(album) => album.name().to_owned(),
            Self::Genre(genre) => genre.name().to_owned(),
            Self::Composer(composer) => composer.name().to_owned(),
            Self::Year(year) => year.name(),
            Self::Label(label) => label.name().to_owned(),
        }
    }
}

/// Field identifiers used by filters, sorting and custom return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetaField {
    Url,
    Title,
    Artist,
    Album,
    AlbumArtist,
    Genre,
    Composer,
    Year,
    Comment,
    Label,
    TrackNumber,
    DiscNumber,
    Rating,
    Score,
    Playcount,
    FirstPlayed,
    LastPlayed,
    Length,
    Filesize,
    SampleRate,
    Bitrate,
    CreateDate,
}

impl MetaField {
    pub const ALL: [MetaField; 22] = [
        MetaField::Url,
        MetaField::Title,
        MetaField::Artist,
        MetaField::Album,
        MetaField::AlbumArtist,
        MetaField::Genre,
        MetaField::Composer,
        MetaField::Year,
        MetaField::Comment,
        MetaField::Label,
        MetaField::TrackNumber,
        MetaField::DiscNumber,
        MetaField::Rating,
        MetaField::Score,
        MetaField::Playcount,
        MetaField::FirstPlayed,
        MetaField::LastPlayed,
        MetaField::Length,
        MetaField::Filesize,
        MetaField::SampleRate,
        MetaField::Bitrate,
        MetaField::CreateDate,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Title => "title",
            Self::Artist => "artist",
            Self::Album => "album",
            Self::AlbumArtist => "album-artist",
            Self::Genre => "genre",
            Self::Composer => "composer",
            Self::Year => "year",
            Self::Comment => "comment",
            Self::Label => "label",
            Self::TrackNumber => "track-number",
            Self::DiscNumber => "disc-number",
            Self::Rating => "rating",
            Self::Score => "score",
            Self::Playcount => "playcount",
            Self::FirstPlayed => "first-played",
            Self::LastPlayed => "last-played",
            Self::Length => "length",
            Self::Filesize => "filesize",
            Self::SampleRate => "sample-rate",
            Self::Bitrate => "bitrate",
            Self::CreateDate => "create-date",
        }
    }

    /// Whether text filters apply to this field.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::Url
                | Self::Title
                | Self::Artist
                | Self::Album
                | Self::AlbumArtist
                | Self::Genre
                | Self::Composer
                | Self::Year
                | Self::Comment
                | Self::Label
        )
    }

    /// Whether number filters apply and sorting compares numerically.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        self == Self::Year || !self.is_text()
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetaField {
    type Err = String;

    /// Accepts the kebab-case name, ignoring case, dashes and underscores,
    /// so `track-number`, `TrackNumber` and `track_number` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|field| field.name().replace('-', "") == wanted)
            .ok_or_else(|| format!("unknown field `{s}`"))
    }
}
