//! # Command-Line Interface Module
//!
//! Defines the `memcoll` command line with Clap derive macros. Parsing is
//! type-safe: field names, filter expressions and aggregate functions are
//! validated before any library file is read.
//!
//! ## Commands
//!
//! - `query`: Load a library file and run one query against it
//! - `stats`: Print the size of every index of a library
//! - `completion`: Generate shell completion scripts
//!
//! ## Filter Expressions
//!
//! | Expression      | Meaning                           |
//! |-----------------|-----------------------------------|
//! | `title:love`    | title contains "love"             |
//! | `artist=Low`    | artist is exactly "Low"           |
//! | `album^The`     | album starts with "The"           |
//! | `genre$core`    | genre ends with "core"            |
//! | `rating>6`      | rating greater than 6             |
//! | `length<180000` | shorter than three minutes        |
//! | `playcount=0`   | numeric equality on numeric fields |
//!
//! Text matches ignore case.
//!
//! ## Examples
//!
//! ```bash
//! memcoll query library.json --type album --artist Low --artist-mode album-or-track
//! memcoll query library.json --filter 'rating>6' --order-by rating --desc --limit 10
//! memcoll query library.json --type custom --function count:artist --function sum:length
//! ```

use crate::custom::ReturnFunction;
use crate::filter::NumberComparison;
use crate::matcher::ArtistMatchBehaviour;
use crate::meta::MetaField;
use crate::query_maker::{AlbumQueryMode, LabelQueryMode, MemoryQueryMaker, QueryType};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "memcoll")]
#[command(about = "Query in-memory music collections loaded from library files")]
#[command(version)]
pub struct Args {
    /// Configuration file to use instead of the platform default
    #[arg(long, global = true, env = "MEMCOLL_CONFIG", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query against a library file
    ///
    /// Matchers (--artist, --album, ...) select tracks by exact entity name
    /// and are applied first. Filters then narrow the result; by default all
    /// filters must hold, with --any a single --filter is enough. Every
    /// --exclude must hold either way.
    Query(QueryArgs),

    /// Show how many tracks, artists, albums, genres, composers, years and
    /// labels a library holds
    Stats {
        /// Library file (JSON array of tracks); defaults to the configured one
        #[arg(value_hint = clap::ValueHint::FilePath)]
        library: Option<PathBuf>,
    },

    /// Generate shell completions
    ///
    /// Usage: memcoll completion bash > ~/.local/share/bash-completion/completions/memcoll
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// List field names for completion (hidden command)
    #[command(hide = true)]
    CompleteFields,
}

#[derive(clap::Args, Debug, Default)]
pub struct QueryArgs {
    /// Library file (JSON array of tracks); defaults to the configured one
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub library: Option<PathBuf>,

    /// What the query returns
    #[arg(short = 't', long = "type", value_enum, default_value_t = QueryKind::Track)]
    pub kind: QueryKind,

    /// Only tracks by this artist (repeat to require several)
    #[arg(long)]
    pub artist: Vec<String>,

    /// Which artist --artist looks at
    #[arg(long, value_enum, default_value_t = ArtistMode::Track)]
    pub artist_mode: ArtistMode,

    /// Only tracks on this album
    #[arg(long)]
    pub album: Option<String>,

    /// Album artist of --album; leave out for albums without one
    #[arg(long, requires = "album")]
    pub album_artist: Option<String>,

    #[arg(long)]
    pub genre: Option<String>,

    #[arg(long)]
    pub composer: Option<String>,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long)]
    pub label: Option<String>,

    /// Keep tracks matching EXPR (see filter expressions)
    #[arg(short, long, value_name = "EXPR")]
    pub filter: Vec<FilterExpr>,

    /// Drop tracks matching EXPR
    #[arg(short = 'x', long, value_name = "EXPR")]
    pub exclude: Vec<FilterExpr>,

    /// Combine --filter expressions with OR instead of AND; --exclude
    /// expressions still all apply
    #[arg(long)]
    pub any: bool,

    /// Sort by this field
    #[arg(short, long, value_name = "FIELD")]
    pub order_by: Option<MetaField>,

    /// Sort descending
    #[arg(long)]
    pub desc: bool,

    /// Shuffle the result; wins over --order-by
    #[arg(long)]
    pub random: bool,

    /// Return at most N results; negative means unlimited
    #[arg(short, long, allow_negative_numbers = true)]
    pub limit: Option<i32>,

    #[arg(long, value_enum, default_value_t = AlbumFilter::All)]
    pub albums: AlbumFilter,

    #[arg(long, value_enum, default_value_t = LabelFilter::Any)]
    pub labels: LabelFilter,

    /// Field to print per track for --type custom (repeatable)
    #[arg(long = "return", value_name = "FIELD")]
    pub return_values: Vec<MetaField>,

    /// Aggregate for --type custom, as FUNCTION:FIELD with FUNCTION one of
    /// count, sum, min, max (repeatable)
    #[arg(long = "function", value_name = "FUNCTION:FIELD")]
    pub functions: Vec<FunctionExpr>,
}

impl QueryArgs {
    /// Transfer the parsed options onto a query maker.
    pub fn configure(&self, qm: &mut MemoryQueryMaker, default_limit: Option<i32>) {
        qm.set_query_type(self.kind.into());

        for artist in &self.artist {
            qm.add_match_artist(artist.as_str(), self.artist_mode.into());
        }
        if let Some(album) = &self.album {
            qm.add_match_album(album.as_str(), self.album_artist.clone().unwrap_or_default());
        }
        if let Some(genre) = &self.genre {
            qm.add_match_genre(genre.as_str());
        }
        if let Some(composer) = &self.composer {
            qm.add_match_composer(composer.as_str());
        }
        if let Some(year) = self.year {
            qm.add_match_year(year);
        }
        if let Some(label) = &self.label {
            qm.add_match_label(label.as_str());
        }

        if self.any {
            qm.begin_or();
        }
        for filter in &self.filter {
            filter.apply(qm, false);
        }
        if self.any {
            qm.end_and_or();
        }
        for filter in &self.exclude {
            filter.apply(qm, true);
        }

        if let Some(field) = self.order_by {
            qm.order_by(field, self.desc);
        } else if self.desc {
            // Entity results honour the direction without a field.
            qm.order_by(MetaField::Title, true);
        }
        if self.random {
            qm.order_by_random();
        }
        if let Some(limit) = self.limit.or(default_limit) {
            qm.limit_max_result_size(limit);
        }

        qm.set_album_query_mode(self.albums.into());
        qm.set_label_query_mode(self.labels.into());

        for field in &self.return_values {
            qm.add_return_value(*field);
        }
        for function in &self.functions {
            qm.add_return_function(function.function, function.field);
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum QueryKind {
    #[default]
    Track,
    Artist,
    AlbumArtist,
    Album,
    Genre,
    Composer,
    Year,
    Label,
    Custom,
}

impl From<QueryKind> for QueryType {
    fn from(kind: QueryKind) -> Self {
        match kind {
            QueryKind::Track => Self::Track,
            QueryKind::Artist => Self::Artist,
            QueryKind::AlbumArtist => Self::AlbumArtist,
            QueryKind::Album => Self::Album,
            QueryKind::Genre => Self::Genre,
            QueryKind::Composer => Self::Composer,
            QueryKind::Year => Self::Year,
            QueryKind::Label => Self::Label,
            QueryKind::Custom => Self::Custom,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ArtistMode {
    /// The track's own artist
    #[default]
    Track,
    /// The album artist only
    Album,
    /// The album artist, else the track artist
    AlbumOrTrack,
}

impl From<ArtistMode> for ArtistMatchBehaviour {
    fn from(mode: ArtistMode) -> Self {
        match mode {
            ArtistMode::Track => Self::TrackArtists,
            ArtistMode::Album => Self::AlbumArtists,
            ArtistMode::AlbumOrTrack => Self::AlbumOrTrackArtists,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AlbumFilter {
    #[default]
    All,
    Compilations,
    Normal,
}

impl From<AlbumFilter> for AlbumQueryMode {
    fn from(filter: AlbumFilter) -> Self {
        match filter {
            AlbumFilter::All => Self::AllAlbums,
            AlbumFilter::Compilations => Self::OnlyCompilations,
            AlbumFilter::Normal => Self::OnlyNormalAlbums,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LabelFilter {
    #[default]
    Any,
    With,
    Without,
}

impl From<LabelFilter> for LabelQueryMode {
    fn from(filter: LabelFilter) -> Self {
        match filter {
            LabelFilter::Any => Self::NoConstraint,
            LabelFilter::With => Self::OnlyWithLabels,
            LabelFilter::Without => Self::OnlyWithoutLabels,
        }
    }
}

/// A parsed `--filter`/`--exclude` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Text {
        field: MetaField,
        pattern: String,
        match_begin: bool,
        match_end: bool,
    },
    Number {
        field: MetaField,
        value: i64,
        comparison: NumberComparison,
    },
}

impl FilterExpr {
    pub fn apply(&self, qm: &mut MemoryQueryMaker, exclude: bool) {
        match self {
            Self::Text {
                field,
                pattern,
                match_begin,
                match_end,
            } => {
                if exclude {
                    qm.exclude_filter(*field, pattern, *match_begin, *match_end);
                } else {
                    qm.add_filter(*field, pattern, *match_begin, *match_end);
                }
            }
            Self::Number {
                field,
                value,
                comparison,
            } => {
                if exclude {
                    qm.exclude_number_filter(*field, *value, *comparison);
                } else {
                    qm.add_number_filter(*field, *value, *comparison);
                }
            }
        }
    }
}

impl FromStr for FilterExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (at, op) = s
            .char_indices()
            .find(|(_, c)| matches!(c, ':' | '=' | '^' | '$' | '<' | '>'))
            .ok_or_else(|| format!("`{s}` has no operator (one of : = ^ $ < >)"))?;
        let field: MetaField = s[..at].trim().parse()?;
        let operand = &s[at + op.len_utf8()..];

        let number = |comparison: NumberComparison| {
            operand
                .trim()
                .parse::<i64>()
                .map(|value| Self::Number {
                    field,
                    value,
                    comparison,
                })
                .map_err(|_| format!("`{operand}` is not a whole number"))
        };
        let text = |match_begin: bool, match_end: bool| {
            Ok(Self::Text {
                field,
                pattern: operand.to_string(),
                match_begin,
                match_end,
            })
        };

        match op {
            '<' => number(NumberComparison::LessThan),
            '>' => number(NumberComparison::GreaterThan),
            '=' if !field.is_text() => number(NumberComparison::Equals),
            '=' => text(true, true),
            '^' => text(true, false),
            '$' => text(false, true),
            _ => text(false, false),
        }
    }
}

/// A parsed `--function` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionExpr {
    pub function: ReturnFunction,
    pub field: MetaField,
}

impl FromStr for FunctionExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (function, field) = s
            .split_once(':')
            .ok_or_else(|| format!("`{s}` is not FUNCTION:FIELD"))?;
        let function = match function.trim().to_lowercase().as_str() {
            "count" => ReturnFunction::Count,
            "sum" => ReturnFunction::Sum,
            "min" => ReturnFunction::Min,
            "max" => ReturnFunction::Max,
            other => return Err(format!("unknown function `{other}`")),
        };
        Ok(Self {
            function,
            field: field.trim().parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_text_filter_operators() {
        assert_eq!(
            "title:love".parse::<FilterExpr>().unwrap(),
            FilterExpr::Text {
                field: MetaField::Title,
                pattern: "love".to_string(),
                match_begin: false,
                match_end: false,
            }
        );
        assert!(matches!(
            "artist=Low".parse::<FilterExpr>().unwrap(),
            FilterExpr::Text { match_begin: true, match_end: true, .. }
        ));
        assert!(matches!(
            "album^The".parse::<FilterExpr>().unwrap(),
            FilterExpr::Text { match_begin: true, match_end: false, .. }
        ));
        assert!(matches!(
            "genre$core".parse::<FilterExpr>().unwrap(),
            FilterExpr::Text { match_begin: false, match_end: true, .. }
        ));
    }

    #[test]
    fn test_pattern_may_contain_operators() {
        let expr: FilterExpr = "title:a:b=c".parse().unwrap();
        assert!(matches!(expr, FilterExpr::Text { pattern, .. } if pattern == "a:b=c"));
    }

    #[test]
    fn test_numeric_filter_operators() {
        assert_eq!(
            "rating>6".parse::<FilterExpr>().unwrap(),
            FilterExpr::Number {
                field: MetaField::Rating,
                value: 6,
                comparison: NumberComparison::GreaterThan,
            }
        );
        assert!(matches!(
            "playcount=0".parse::<FilterExpr>().unwrap(),
            FilterExpr::Number { comparison: NumberComparison::Equals, .. }
        ));
        assert!("rating>six".parse::<FilterExpr>().is_err());
        assert!("nonsense:1".parse::<FilterExpr>().is_err());
        assert!("title".parse::<FilterExpr>().is_err());
    }

    #[test]
    fn test_function_expressions() {
        assert_eq!(
            "count:artist".parse::<FunctionExpr>().unwrap(),
            FunctionExpr {
                function: ReturnFunction::Count,
                field: MetaField::Artist,
            }
        );
        assert!("median:rating".parse::<FunctionExpr>().is_err());
        assert!("sum".parse::<FunctionExpr>().is_err());
    }

    #[test]
    fn test_query_args_parse() {
        let args = Args::try_parse_from([
            "memcoll", "query", "lib.json", "--type", "album", "--artist", "Low",
            "--artist-mode", "album-or-track", "-f", "rating>6", "--limit", "-1",
        ])
        .unwrap();
        match args.command {
            Command::Query(query) => {
                assert_eq!(query.kind, QueryKind::Album);
                assert_eq!(query.artist, vec!["Low"]);
                assert_eq!(query.artist_mode, ArtistMode::AlbumOrTrack);
                assert_eq!(query.filter.len(), 1);
                assert_eq!(query.limit, Some(-1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_any_groups_filters_but_not_excludes() {
        use crate::collection::MemoryCollection;
        use crate::meta::TrackInfo;

        let mut candy = TrackInfo::new("file:///1.ogg", "Candy Girl", "Low", "Trust");
        candy.rating = 8;
        let mut herod = TrackInfo::new("file:///2.ogg", "Like Herod", "Mogwai", "Young Team");
        herod.rating = 10;
        let shared = TrackInfo::new("file:///3.ogg", "Shared", "Guest", "Split EP");
        let hymn = TrackInfo::new("file:///4.ogg", "Hymn", "Guest", "Split EP");
        let collection = MemoryCollection::from_tracks("local", vec![candy, herod, shared, hymn]);

        let args = Args::try_parse_from([
            "memcoll", "query", "lib.json", "--type", "track", "-f", "title:a",
            "-f", "rating>8", "--exclude", "artist=Low", "--any",
        ])
        .unwrap();
        let Command::Query(query) = args.command else {
            panic!("expected a query command");
        };

        let mut qm = collection.query_maker();
        query.configure(&mut qm, None);
        let mut names = qm.prepare().unwrap().run_query().names();
        names.sort();
        assert_eq!(names, vec!["Like Herod", "Shared"]);
    }
}
