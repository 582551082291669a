//! Composable track predicates.
//!
//! Unlike matchers, filters form a tree: `And`/`Or` containers hold any
//! number of children, `Negate` inverts one, and the leaves compare a single
//! field. Both containers are false when empty.

use crate::error::{FieldKind, QueryError, Result};
use crate::meta::{MetaField, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberComparison {
    Equals,
    GreaterThan,
    LessThan,
}

/// Case-insensitive text match on one field.
///
/// `match_begin` anchors the pattern at the start, `match_end` at the end;
/// with both set the value must equal the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringFilter {
    field: MetaField,
    pattern: String,
    match_begin: bool,
    match_end: bool,
}

impl StringFilter {
    fn new(field: MetaField, pattern: &str, match_begin: bool, match_end: bool) -> Self {
        Self {
            field,
            pattern: pattern.to_lowercase(),
            match_begin,
            match_end,
        }
    }

    #[must_use]
    pub fn matches(&self, track: &Track) -> bool {
        if self.field == MetaField::Label {
            return track
                .labels()
                .iter()
                .any(|label| self.value_matches(label.name()));
        }
        self.value_matches(&track.text(self.field))
    }

    fn value_matches(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        match (self.match_begin, self.match_end) {
            (true, true) => value == self.pattern,
            (true, false) => value.starts_with(&self.pattern),
            (false, true) => value.ends_with(&self.pattern),
            (false, false) => value.contains(&self.pattern),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberFilter {
    field: MetaField,
    value: i64,
    comparison: NumberComparison,
}

impl NumberFilter {
    /// Unset values (e.g. a track never played) compare as 0.
    #[must_use]
    pub fn matches(&self, track: &Track) -> bool {
        let actual = track.number(self.field).unwrap_or(0.0);
        let wanted = self.value as f64;
        match self.comparison {
            NumberComparison::Equals => actual == wanted,
            NumberComparison::GreaterThan => actual > wanted,
            NumberComparison::LessThan => actual < wanted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemoryFilter {
    And(Vec<MemoryFilter>),
    Or(Vec<MemoryFilter>),
    Negate(Box<MemoryFilter>),
    Text(StringFilter),
    Number(NumberFilter),
}

impl MemoryFilter {
    #[must_use]
    pub fn negate(filter: MemoryFilter) -> Self {
        Self::Negate(Box::new(filter))
    }

    #[must_use]
    pub fn matches(&self, track: &Track) -> bool {
        match self {
            Self::And(children) => {
                !children.is_empty() && children.iter().all(|child| child.matches(track))
            }
            Self::Or(children) => children.iter().any(|child| child.matches(track)),
            Self::Negate(child) => !child.matches(track),
            Self::Text(filter) => filter.matches(track),
            Self::Number(filter) => filter.matches(track),
        }
    }
}

/// Builds filter leaves for a field, rejecting fields that cannot be
/// compared the requested way.
pub struct FilterFactory;

impl FilterFactory {
    pub fn filter(
        field: MetaField,
        pattern: &str,
        match_begin: bool,
        match_end: bool,
    ) -> Result<MemoryFilter> {
        if !field.is_text() {
            return Err(QueryError::UnsupportedField {
                field,
                kind: FieldKind::Text,
            });
        }
        Ok(MemoryFilter::Text(StringFilter::new(
            field,
            pattern,
            match_begin,
            match_end,
        )))
    }

    pub fn number_filter(
        field: MetaField,
        value: i64,
        comparison: NumberComparison,
    ) -> Result<MemoryFilter> {
        if !field.is_numeric() {
            return Err(QueryError::UnsupportedField {
                field,
                kind: FieldKind::Number,
            });
        }
        Ok(MemoryFilter::Number(NumberFilter {
            field,
            value,
            comparison,
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Frame {
    container: Container,
    children: Vec<MemoryFilter>,
}

impl Frame {
    fn new(container: Container) -> Self {
        Self {
            container,
            children: Vec::new(),
        }
    }

    fn close(self) -> MemoryFilter {
        match self.container {
            Container::And => MemoryFilter::And(self.children),
            Container::Or => MemoryFilter::Or(self.children),
        }
    }
}

/// The stack of open and/or groups a query maker adds filters to.
///
/// The bottom frame is an implicit `And` that is never popped.
#[derive(Debug, Clone)]
pub struct FilterStack {
    frames: Vec<Frame>,
    used: bool,
}

impl Default for FilterStack {
    fn default() -> Self {
        Self {
            frames: vec![Frame::new(Container::And)],
            used: false,
        }
    }
}

impl FilterStack {
    /// Add a leaf (or negated leaf) to the innermost open group.
    pub fn push(&mut self, filter: MemoryFilter) {
        self.top().children.push(filter);
        self.used = true;
    }

    pub fn begin_and(&mut self) {
        self.frames.push(Frame::new(Container::And));
    }

    pub fn begin_or(&mut self) {
        self.frames.push(Frame::new(Container::Or));
    }

    /// Close the innermost group and add it to its parent.
    pub fn end(&mut self) -> Result<()> {
        if self.frames.len() <= 1 {
            return Err(QueryError::UnbalancedFilterGroups);
        }
        if let Some(frame) = self.frames.pop() {
            let closed = frame.close();
            self.top().children.push(closed);
        }
        Ok(())
    }

    #[must_use]
    pub fn open_groups(&self) -> usize {
        self.frames.len() - 1
    }

    /// The finished tree, closing any group left open. `None` until a leaf
    /// has been added.
    #[must_use]
    pub fn build(&self) -> Option<MemoryFilter> {
        if !self.used {
            return None;
        }
        let mut frames = self.frames.clone();
        while frames.len() > 1 {
            let closed = frames.pop().map(Frame::close);
            if let (Some(closed), Some(parent)) = (closed, frames.last_mut()) {
                parent.children.push(closed);
            }
        }
        frames.pop().map(Frame::close)
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}
