use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::firestore::api::DocumentRecord;
use crate::firestore::model::ResourcePath;

/// Identity of a cached value: a document path, or a collection path paired
/// with the canonical string of the query run over it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Document(String),
    Query { path: String, query: String },
}

impl CacheKey {
    pub fn document(path: &str) -> Self {
        CacheKey::Document(ResourcePath::from_string(path).canonical_string())
    }

    pub fn query(path: &str, query: impl Into<String>) -> Self {
        CacheKey::Query {
            path: ResourcePath::from_string(path).canonical_string(),
            query: query.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            CacheKey::Document(path) => path,
            CacheKey::Query { path, .. } => path,
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Document(path) => write!(f, "{path}"),
            CacheKey::Query { path, query } => write!(f, "[{path}, {query}]"),
        }
    }
}

/// A cached value. Payloads are shared behind `Arc`, so an unchanged entry
/// keeps its identity across updates and consumers can detect "no change"
/// with [`CacheValue::same_as`].
#[derive(Clone, Debug, PartialEq)]
pub enum CacheValue {
    /// The document is known not to exist (or was deleted locally).
    Absent,
    Document(Arc<DocumentRecord>),
    Collection(Arc<Vec<DocumentRecord>>),
}

impl CacheValue {
    pub fn document(record: DocumentRecord) -> Self {
        CacheValue::Document(Arc::new(record))
    }

    pub fn collection(records: Vec<DocumentRecord>) -> Self {
        CacheValue::Collection(Arc::new(records))
    }

    pub fn as_document(&self) -> Option<&Arc<DocumentRecord>> {
        match self {
            CacheValue::Document(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Arc<Vec<DocumentRecord>>> {
        match self {
            CacheValue::Collection(records) => Some(records),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CacheValue::Absent)
    }

    /// Identity comparison: true when both values share the same payload allocation.
    pub fn same_as(&self, other: &CacheValue) -> bool {
        match (self, other) {
            (CacheValue::Absent, CacheValue::Absent) => true,
            (CacheValue::Document(left), CacheValue::Document(right)) => Arc::ptr_eq(left, right),
            (CacheValue::Collection(left), CacheValue::Collection(right)) => {
                Arc::ptr_eq(left, right)
            }
            _ => false,
        }
    }
}

/// Computes the next value of an entry from its current value. Returning
/// `None` leaves the entry untouched.
pub type CacheUpdater<'a> = Box<dyn FnOnce(Option<&CacheValue>) -> Option<CacheValue> + 'a>;

pub type CacheListener = Arc<dyn Fn(&CacheKey, Option<&CacheValue>) + Send + Sync + 'static>;

/// The keyed stale-while-revalidate cache that owns every cached value.
///
/// The cache layer never duplicates it; it reads, writes and mutates entries
/// and leaves refetch scheduling to the implementation.
pub trait KeyedCache: Send + Sync + 'static {
    fn read(&self, key: &CacheKey) -> Option<CacheValue>;

    /// Stores `value`; when `notify` is set, subscribers of `key` are told.
    fn write(&self, key: &CacheKey, value: CacheValue, notify: bool);

    /// Applies `updater` to the current entry. An update that returns the same
    /// payload (see [`CacheValue::same_as`]) is not a change and notifies nobody.
    fn mutate(&self, key: &CacheKey, updater: CacheUpdater<'_>, notify: bool);

    /// Drops the entry so the next read refetches it.
    fn invalidate(&self, key: &CacheKey);
}
