//! Field paths for addressing leaves inside content documents.
//!
//! Grammar: `segment ("." segment)*` where a segment is either a bare key
//! (`title`) or a key followed by an array index (`plans[2]`). Dots and
//! brackets cannot be escaped inside keys.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Look up a key in an object.
    Key(String),
    /// Look up a key in an object, then an element of the array stored there.
    Index(String, usize),
}

impl Segment {
    /// The object key this segment reads.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Segment::Key(key) | Segment::Index(key, _) => key,
        }
    }
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{key}"),
            Segment::Index(key, index) => write!(f, "{key}[{index}]"),
        }
    }
}

/// A parsed, non-empty path into a content document.
///
/// # Examples
/// - `title` → `[Key("title")]`
/// - `pricing.plans[1].name` → `[Key("pricing"), Index("plans", 1), Key("name")]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// Parse a path string.
    ///
    /// # Errors
    /// Returns [`PathError`] for empty paths, empty segments, malformed
    /// brackets or non-numeric indices.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        s.parse()
    }

    /// All segments from the document root to the leaf.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a parsed path; kept for API symmetry with `len`.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into the segments leading to the parent container and the leaf.
    #[must_use]
    pub fn split_leaf(&self) -> (&[Segment], &Segment) {
        let (leaf, parents) = self
            .0
            .split_last()
            .expect("FieldPath always holds at least one segment");
        (parents, leaf)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let segments = s
            .split('.')
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(segments))
    }
}

fn parse_segment(raw: &str) -> Result<Segment, PathError> {
    if raw.is_empty() {
        return Err(PathError::EmptySegment);
    }

    let Some(open) = raw.find('[') else {
        if raw.contains(']') {
            return Err(PathError::InvalidSegment(raw.to_string()));
        }
        return Ok(Segment::Key(raw.to_string()));
    };

    let key = &raw[..open];
    let Some(digits) = raw[open + 1..].strip_suffix(']') else {
        return Err(PathError::InvalidSegment(raw.to_string()));
    };
    if key.is_empty() || key.contains(']') {
        return Err(PathError::InvalidSegment(raw.to_string()));
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathError::InvalidIndex(raw.to_string()));
    }
    let index = digits
        .parse::<usize>()
        .map_err(|_| PathError::InvalidIndex(raw.to_string()))?;

    Ok(Segment::Index(key.to_string(), index))
}

/// Errors raised while parsing a field path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path contains an empty segment")]
    EmptySegment,

    #[error("invalid segment: {0} (expected `key` or `key[index]`)")]
    InvalidSegment(String),

    #[error("invalid array index in segment: {0}")]
    InvalidIndex(String),
}
