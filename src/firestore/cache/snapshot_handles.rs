use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::firestore::remote::DocumentSnapshot;

/// Last-seen snapshot per document path, used to resolve cursors that were
/// serialized by reference.
///
/// Entries are weak back-references: they are added when a snapshot cursor is
/// serialized and removed when the query that owned the cursor is released,
/// never because a read happened to miss them. Cloning shares the table.
#[derive(Clone, Default)]
pub struct SnapshotHandleCache {
    handles: Arc<Mutex<HashMap<String, DocumentSnapshot>>>,
}

impl SnapshotHandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: &DocumentSnapshot) -> String {
        let path = snapshot.key().as_str().to_string();
        self.handles
            .lock()
            .unwrap()
            .insert(path.clone(), snapshot.clone());
        path
    }

    pub fn get(&self, path: &str) -> Option<DocumentSnapshot> {
        self.handles.lock().unwrap().get(path).cloned()
    }

    pub fn remove(&self, path: &str) -> Option<DocumentSnapshot> {
        self.handles.lock().unwrap().remove(path)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::model::DocumentKey;
    use crate::firestore::remote::SnapshotMetadata;

    #[test]
    fn stores_by_document_path() {
        let handles = SnapshotHandleCache::new();
        let snapshot = DocumentSnapshot::new(
            DocumentKey::from_string("users/abc").unwrap(),
            None,
            SnapshotMetadata::default(),
        );
        assert_eq!(handles.insert(&snapshot), "users/abc");
        assert_eq!(handles.get("users/abc"), Some(snapshot));

        let shared = handles.clone();
        assert!(shared.remove("users/abc").is_some());
        assert!(handles.is_empty());
    }
}
