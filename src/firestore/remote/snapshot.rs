use crate::firestore::model::DocumentKey;
use crate::firestore::value::{FirestoreValue, MapValue};

/// Metadata about the state of a document snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotMetadata {
    from_cache: bool,
    has_pending_writes: bool,
}

impl SnapshotMetadata {
    /// Creates metadata with the provided cache/pending-write flags.
    pub fn new(from_cache: bool, has_pending_writes: bool) -> Self {
        Self {
            from_cache,
            has_pending_writes,
        }
    }

    /// Indicates whether the snapshot was served from the store's local cache.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Indicates whether the snapshot contains uncommitted local mutations.
    pub fn has_pending_writes(&self) -> bool {
        self.has_pending_writes
    }
}

/// The remote store's view of one document at a point in time.
///
/// Used opaquely by the cache layer: it is decoded into a record, optionally
/// attached to it, and can act as a query cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<MapValue>,
    metadata: SnapshotMetadata,
}

impl DocumentSnapshot {
    pub fn new(key: DocumentKey, data: Option<MapValue>, metadata: SnapshotMetadata) -> Self {
        Self {
            key,
            data,
            metadata,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    /// Returns whether the document exists on the backend.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn map_value(&self) -> Option<&MapValue> {
        self.data.as_ref()
    }

    pub fn get(&self, field: &str) -> Option<&FirestoreValue> {
        self.data.as_ref().and_then(|data| data.get(field))
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn has_pending_writes(&self) -> bool {
        self.metadata.has_pending_writes()
    }
}

/// The ordered result of a query, as delivered by one fetch or one listener emission.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySnapshot {
    documents: Vec<DocumentSnapshot>,
    metadata: SnapshotMetadata,
}

impl QuerySnapshot {
    pub fn new(documents: Vec<DocumentSnapshot>, metadata: SnapshotMetadata) -> Self {
        Self {
            documents,
            metadata,
        }
    }

    pub fn documents(&self) -> &[DocumentSnapshot] {
        &self.documents
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = DocumentSnapshot;
    type IntoIter = std::vec::IntoIter<DocumentSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}
