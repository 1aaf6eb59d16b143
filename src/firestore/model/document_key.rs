use crate::firestore::error::FirestoreResult;
use crate::firestore::model::ResourcePath;

/// A validated document path: non-empty with an even number of segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey {
    path: String,
    segments: usize,
}

impl DocumentKey {
    pub fn from_path(path: ResourcePath) -> FirestoreResult<Self> {
        path.require_document("DocumentKey")?;
        Ok(Self {
            segments: path.len(),
            path: path.canonical_string(),
        })
    }

    pub fn from_string(path: &str) -> FirestoreResult<Self> {
        Self::from_path(ResourcePath::from_string(path))
    }

    pub fn path(&self) -> ResourcePath {
        ResourcePath::from_string(&self.path)
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The collection that directly contains this document.
    pub fn collection_path(&self) -> ResourcePath {
        self.path().without_last()
    }

    /// The id of the collection that directly contains this document.
    pub fn collection_id(&self) -> &str {
        let mut parts = self.path.rsplit('/');
        parts.next();
        parts.next().unwrap_or_default()
    }

    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_even_segments() {
        let err = DocumentKey::from_string("cities").unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-path-kind");
    }

    #[test]
    fn parses_valid_path() {
        let key = DocumentKey::from_string("cities/sf").unwrap();
        assert_eq!(key.id(), "sf");
        assert_eq!(key.collection_id(), "cities");
        assert_eq!(key.collection_path().canonical_string(), "cities");
    }

    #[test]
    fn nested_document_reports_direct_collection() {
        let key = DocumentKey::from_string("/users/abc/posts/p1/").unwrap();
        assert_eq!(key.as_str(), "users/abc/posts/p1");
        assert_eq!(key.collection_id(), "posts");
        assert_eq!(key.collection_path().canonical_string(), "users/abc/posts");
        assert_eq!(key.depth(), 4);
    }
}
