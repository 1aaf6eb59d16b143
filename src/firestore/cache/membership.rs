use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::firestore::model::ResourcePath;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Registration {
    path: String,
    query: Option<String>,
}

/// Registry of every query that has been read or subscribed over each collection path.
///
/// Writes to a document consult this index to find the cached result sets
/// that may hold it. Registrations are append-only for the life of the index:
/// a stale entry only costs a no-op lookup during propagation. Cloning shares
/// the registry.
#[derive(Clone, Default)]
pub struct MembershipIndex {
    collections: Arc<Mutex<HashMap<String, Vec<Registration>>>>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `(collection_path, serialized_query)` unless the exact pair is
    /// already registered. A `None` query marks a registration whose
    /// descriptor string is not known; such entries are never returned.
    pub fn record_query(&self, collection_path: &str, serialized_query: Option<&str>) {
        let path = ResourcePath::from_string(collection_path).canonical_string();
        let registration = Registration {
            path: path.clone(),
            query: serialized_query.map(str::to_string),
        };
        let mut collections = self.collections.lock().unwrap();
        let entries = collections.entry(path).or_default();
        if !entries.contains(&registration) {
            log::debug!(
                "registered query {:?} over collection {}",
                registration.query,
                registration.path
            );
            entries.push(registration);
        }
    }

    /// Returns the `(path, serialized_query)` pairs registered for a collection,
    /// in registration order.
    ///
    /// A document path is reported through the log and still answered on a
    /// best-effort basis.
    pub fn active_keys_for(&self, collection_path: &str) -> Vec<(String, String)> {
        let path = ResourcePath::from_string(collection_path);
        if !path.is_collection() {
            log::warn!(
                "membership lookup for `{collection_path}`, which is not a collection path"
            );
        }
        self.collections
            .lock()
            .unwrap()
            .get(&path.canonical_string())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        entry
                            .query
                            .as_ref()
                            .map(|query| (entry.path.clone(), query.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_is_idempotent() {
        let index = MembershipIndex::new();
        index.record_query("users", Some("{}"));
        index.record_query("users", Some("{}"));
        assert_eq!(
            index.active_keys_for("users"),
            vec![("users".to_string(), "{}".to_string())]
        );
    }

    #[test]
    fn distinct_queries_keep_registration_order() {
        let index = MembershipIndex::new();
        index.record_query("users", Some(r#"{"limit":5}"#));
        index.record_query("users", Some("{}"));
        let keys = index.active_keys_for("users");
        assert_eq!(
            keys,
            vec![
                ("users".to_string(), r#"{"limit":5}"#.to_string()),
                ("users".to_string(), "{}".to_string()),
            ]
        );
    }

    #[test]
    fn entries_without_query_are_filtered() {
        let index = MembershipIndex::new();
        index.record_query("users", None);
        index.record_query("users", Some("{}"));
        assert_eq!(index.active_keys_for("users").len(), 1);
    }

    #[test]
    fn unknown_or_document_paths_answer_best_effort() {
        let index = MembershipIndex::new();
        assert!(index.active_keys_for("rooms").is_empty());
        index.record_query("users/abc", Some("{}"));
        assert_eq!(index.active_keys_for("/users/abc/").len(), 1);
    }
}
