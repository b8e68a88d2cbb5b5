use std::fmt;

use crate::error::GraphError;

/// Separator between path segments.
pub const DELIMITER: char = '/';

/// A session-scoped address of the position where an object was first written.
///
/// The root of a document owns the root prefix itself (empty by default);
/// every member below it appends `/segment`. Paths are plain strings and are
/// only meaningful within the session that produced them.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(String);

impl Path {
    /// The empty root path.
    pub fn root() -> Self {
        Path(String::new())
    }

    /// Creates a root prefix, normalising `"/"` and trailing delimiters away.
    pub fn prefix(prefix: &str) -> Self {
        Path(prefix.trim_end_matches(DELIMITER).to_string())
    }

    /// Wraps an already-built path string, e.g. one read from a `ref` attribute.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Path(raw.into())
    }

    /// Appends one segment. The result depends only on `self` and `segment`.
    pub fn join(&self, segment: &str) -> Path {
        let mut joined = String::with_capacity(self.0.len() + 1 + segment.len());
        joined.push_str(&self.0);
        joined.push(DELIMITER);
        joined.push_str(segment);
        Path(joined)
    }

    /// Returns the segments below `base`, or `None` if this path is not under it.
    pub fn segments_under<'a>(&'a self, base: &Path) -> Option<impl Iterator<Item = &'a str>> {
        let rest = self.0.strip_prefix(base.as_str())?;
        if !rest.is_empty() && !rest.starts_with(DELIMITER) {
            return None;
        }
        Some(rest.split(DELIMITER).filter(|s| !s.is_empty()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

/// Checks that `segment` can name a child element and be joined into a path.
pub fn validate_segment(segment: &str) -> Result<(), GraphError> {
    if segment.is_empty() || segment.contains(DELIMITER) {
        return Err(GraphError::InvalidSegment {
            segment: segment.to_string(),
        });
    }
    Ok(())
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({:?})", self.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}
