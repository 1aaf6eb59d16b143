use std::fmt::{Display, Formatter};

use crate::firestore::error::FirestoreResult;
use crate::firestore::model::DocumentKey;

/// Handle to a single document, as produced by the store when resolving a path.
///
/// Two references are equal when they point at the same document path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentReference {
    key: DocumentKey,
}

impl DocumentReference {
    pub fn new(key: DocumentKey) -> Self {
        Self { key }
    }

    pub fn from_path(path: &str) -> FirestoreResult<Self> {
        Ok(Self::new(DocumentKey::from_string(path)?))
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn path(&self) -> &str {
        self.key.as_str()
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }
}

impl Display for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DocumentReference({})", self.key.as_str())
    }
}
