use std::fmt::{Display, Formatter};
use std::ops::Deref;

use crate::firestore::error::{invalid_path_kind, FirestoreResult};

/// Whether a path addresses a single document or a collection of documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathKind {
    Document,
    Collection,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::Document => "document",
            PathKind::Collection => "collection",
        }
    }
}

/// A slash-delimited path into the store, e.g. `rooms/eros/messages`.
///
/// Parsing trims surrounding whitespace and drops empty segments, so
/// `"/users//abc/"` and `"users/abc"` name the same document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments = segments.into_iter().map(Into::into).collect();
        Self::new(segments)
    }

    pub fn from_string(path: &str) -> Self {
        Self::from_segments(
            path.trim()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_string()),
        )
    }

    /// Classifies the path by segment parity: odd counts are collections,
    /// even counts are documents.
    pub fn kind(&self) -> PathKind {
        if self.segments.len() % 2 == 0 {
            PathKind::Document
        } else {
            PathKind::Collection
        }
    }

    pub fn is_document(&self) -> bool {
        !self.is_empty() && self.kind() == PathKind::Document
    }

    pub fn is_collection(&self) -> bool {
        self.kind() == PathKind::Collection
    }

    /// Fails with `InvalidPathKind` unless the path names a document.
    pub fn require_document(&self, operation: &str) -> FirestoreResult<()> {
        if self.is_document() {
            return Ok(());
        }
        Err(invalid_path_kind(format!(
            "{operation} requires a document path (even number of segments), got `{}`",
            self.canonical_string()
        )))
    }

    /// Fails with `InvalidPathKind` unless the path names a collection.
    pub fn require_collection(&self, operation: &str) -> FirestoreResult<()> {
        if self.is_collection() {
            return Ok(());
        }
        Err(invalid_path_kind(format!(
            "{operation} requires a collection path (odd number of segments), got `{}`",
            self.canonical_string()
        )))
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child<I, S>(&self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut new_segments = self.segments.clone();
        new_segments.extend(segments.into_iter().map(Into::into));
        Self::new(new_segments)
    }

    pub fn without_last(&self) -> Self {
        if self.segments.is_empty() {
            return Self::root();
        }
        Self::new(self.segments[..self.segments.len() - 1].to_vec())
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical_string())
    }
}

impl Deref for ResourcePath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;

    #[test]
    fn parse_and_render_path() {
        let path = ResourcePath::from_string("cities/sf/neighborhoods/downtown");
        assert_eq!(path.len(), 4);
        assert_eq!(path.last_segment(), Some("downtown"));
        assert_eq!(path.canonical_string(), "cities/sf/neighborhoods/downtown");
    }

    #[test]
    fn trims_and_drops_empty_segments() {
        let path = ResourcePath::from_string("  /users//abc/ ");
        assert_eq!(path.canonical_string(), "users/abc");
        assert_eq!(path.kind(), PathKind::Document);
    }

    #[test]
    fn classifies_by_segment_parity() {
        assert_eq!(ResourcePath::from_string("users").kind(), PathKind::Collection);
        assert_eq!(ResourcePath::from_string("users/abc").kind(), PathKind::Document);
        assert_eq!(
            ResourcePath::from_string("users/abc/posts").kind(),
            PathKind::Collection
        );
    }

    #[test]
    fn document_requirement_rejects_collections() {
        let err = ResourcePath::from_string("users")
            .require_document("set")
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidPathKind);
        assert!(ResourcePath::from_string("").require_document("set").is_err());
    }

    #[test]
    fn without_last_yields_parent() {
        let path = ResourcePath::from_string("users/abc");
        assert_eq!(path.without_last().canonical_string(), "users");
    }
}
