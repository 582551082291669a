//! Error types for building and running collection queries.

use crate::meta::MetaField;
use std::fmt;
use thiserror::Error;

/// Result type alias using [`QueryError`]
pub type Result<T> = std::result::Result<T, QueryError>;

/// How a field is being asked to behave by a filter, sort or return function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Matched as case-insensitive text
    Text,
    /// Compared or aggregated as a number
    Number,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Number => f.write_str("numeric"),
        }
    }
}

/// Errors raised by [`MemoryQueryMaker`](crate::query_maker::MemoryQueryMaker).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// `run()` called before a query type was set
    #[error("No query type set")]
    NoQueryType,

    /// `run()` called while the previous job of the same query maker is still outstanding
    #[error("A query is already running for this query maker")]
    AlreadyRunning,

    /// Field cannot be used the requested way
    #[error("Field `{field}` does not support {kind} values")]
    UnsupportedField { field: MetaField, kind: FieldKind },

    /// `end_and_or()` without a matching `begin_and()`/`begin_or()`
    #[error("end_and_or called without an open and/or group")]
    UnbalancedFilterGroups,
}
