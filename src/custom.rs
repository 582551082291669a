//! Projections for `Custom` queries: per-track return values and
//! aggregate return functions.

use crate::error::{FieldKind, QueryError, Result};
use crate::meta::{format_number, MetaField, Track, TrackPtr};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnFunction {
    /// Number of distinct non-empty values
    Count,
    Sum,
    Min,
    Max,
}

impl ReturnFunction {
    fn is_numeric(self) -> bool {
        self != Self::Count
    }
}

/// One string per track: the track's text rendering of `field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomReturnValue {
    field: MetaField,
}

impl CustomReturnValue {
    #[must_use]
    pub fn new(field: MetaField) -> Self {
        Self { field }
    }

    #[must_use]
    pub fn value(&self, track: &Track) -> String {
        track.text(self.field)
    }
}

/// One string for the whole result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomReturnFunction {
    function: ReturnFunction,
    field: MetaField,
}

impl CustomReturnFunction {
    /// `Sum`, `Min` and `Max` need a numeric field; `Count` takes any.
    pub fn new(function: ReturnFunction, field: MetaField) -> Result<Self> {
        if function.is_numeric() && !field.is_numeric() {
            return Err(QueryError::UnsupportedField {
                field,
                kind: FieldKind::Number,
            });
        }
        Ok(Self { function, field })
    }

    /// `Count` and `Sum` of nothing are `"0"`; `Min` and `Max` of nothing are empty.
    #[must_use]
    pub fn value(&self, tracks: &[TrackPtr]) -> String {
        match self.function {
            ReturnFunction::Count => self.count(tracks).to_string(),
            ReturnFunction::Sum => format_number(self.numbers(tracks).sum()),
            ReturnFunction::Min => self
                .numbers(tracks)
                .reduce(f64::min)
                .map(format_number)
                .unwrap_or_default(),
            ReturnFunction::Max => self
                .numbers(tracks)
                .reduce(f64::max)
                .map(format_number)
                .unwrap_or_default(),
        }
    }

    fn count(&self, tracks: &[TrackPtr]) -> usize {
        let distinct: BTreeSet<String> = if self.field == MetaField::Label {
            tracks
                .iter()
                .flat_map(|track| track.labels().iter().map(|label| label.name().to_owned()))
                .filter(|name| !name.is_empty())
                .collect()
        } else {
            tracks
                .iter()
                .map(|track| track.text(self.field))
                .filter(|value| !value.is_empty())
                .collect()
        };
        distinct.len()
    }

    fn numbers<'a>(&'a self, tracks: &'a [TrackPtr]) -> impl Iterator<Item = f64> + 'a {
        tracks.iter().filter_map(move |track| track.number(self.field))
    }
}
