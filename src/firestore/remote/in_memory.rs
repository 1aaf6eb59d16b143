use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::firestore::constants::AUTO_ID_LENGTH;
use crate::firestore::error::{not_found, FirestoreError, FirestoreResult};
use crate::firestore::model::{DocumentKey, DocumentReference, ResourcePath};
use crate::firestore::query::QueryDescriptor;
use crate::firestore::value::MapValue;

use super::query_evaluator::{apply_query_to_documents, matches_target};
use super::snapshot::{DocumentSnapshot, QuerySnapshot, SnapshotMetadata};
use super::store::{
    DocumentListener, ListenerRegistration, QueryListener, RemoteStore, SetOptions,
};

/// A process-local store that evaluates queries in memory and re-emits to
/// listeners after every write.
///
/// Useful for tests or demos where network access is not required. Reads and
/// writes can be made to fail on demand to exercise error paths.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    documents: Mutex<BTreeMap<DocumentKey, MapValue>>,
    query_listeners: Mutex<BTreeMap<u64, QueryListenerEntry>>,
    document_listeners: Mutex<BTreeMap<u64, DocumentListenerEntry>>,
    next_listener_id: AtomicU64,
    read_failure: Mutex<Option<FirestoreError>>,
    write_failure: Mutex<Option<FirestoreError>>,
    scheduled_write_failure: Mutex<Option<(usize, FirestoreError)>>,
}

struct QueryListenerEntry {
    path: ResourcePath,
    query: QueryDescriptor,
    listener: QueryListener,
}

struct DocumentListenerEntry {
    key: DocumentKey,
    listener: DocumentListener,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document directly, notifying any listeners that observe it.
    pub fn seed(&self, path: &str, data: MapValue) -> FirestoreResult<()> {
        let key = DocumentKey::from_string(path)?;
        self.inner.documents.lock().unwrap().insert(key.clone(), data);
        self.inner.notify(&key);
        Ok(())
    }

    /// Returns the stored fields of a document, if it exists.
    pub fn document(&self, path: &str) -> Option<MapValue> {
        let key = DocumentKey::from_string(path).ok()?;
        self.inner.documents.lock().unwrap().get(&key).cloned()
    }

    /// Makes every subsequent read and subscription fail with `error` until cleared.
    pub fn fail_reads_with(&self, error: Option<FirestoreError>) {
        *self.inner.read_failure.lock().unwrap() = error;
    }

    /// Makes every subsequent write fail with `error` until cleared.
    pub fn fail_writes_with(&self, error: Option<FirestoreError>) {
        *self.inner.write_failure.lock().unwrap() = error;
    }

    /// Makes only the `nth` write from now (1-based) fail with `error`. The
    /// writes before and after it go through.
    pub fn fail_nth_write_with(&self, nth: usize, error: FirestoreError) {
        *self.inner.scheduled_write_failure.lock().unwrap() = Some((nth.max(1), error));
    }

    /// Number of query and document listeners currently attached.
    pub fn active_listener_count(&self) -> usize {
        self.inner.query_listeners.lock().unwrap().len()
            + self.inner.document_listeners.lock().unwrap().len()
    }

    fn check_read(&self) -> FirestoreResult<()> {
        match self.inner.read_failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn check_write(&self) -> FirestoreResult<()> {
        if let Some(error) = self.inner.write_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let mut scheduled = self.inner.scheduled_write_failure.lock().unwrap();
        match scheduled.take() {
            Some((1, error)) => Err(error),
            Some((remaining, error)) => {
                *scheduled = Some((remaining - 1, error));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn apply_set(&self, key: &DocumentKey, data: MapValue, options: SetOptions) {
        let mut store = self.inner.documents.lock().unwrap();
        let next = match (options.merge, store.get(key)) {
            (true, Some(existing)) => existing.merged_with(&data),
            _ => data,
        };
        store.insert(key.clone(), next);
    }

    fn apply_update(&self, key: &DocumentKey, data: MapValue) -> FirestoreResult<()> {
        let mut store = self.inner.documents.lock().unwrap();
        let current = store
            .get(key)
            .ok_or_else(|| not_found(format!("Document {} does not exist", key.as_str())))?;
        let next = current.merged_with(&data);
        store.insert(key.clone(), next);
        Ok(())
    }
}

impl StoreInner {
    fn snapshot_of(&self, key: &DocumentKey) -> DocumentSnapshot {
        let data = self.documents.lock().unwrap().get(key).cloned();
        DocumentSnapshot::new(key.clone(), data, SnapshotMetadata::default())
    }

    fn query_snapshot(&self, path: &ResourcePath, query: &QueryDescriptor) -> QuerySnapshot {
        let candidates = self
            .documents
            .lock()
            .unwrap()
            .iter()
            .map(|(key, data)| {
                DocumentSnapshot::new(key.clone(), Some(data.clone()), SnapshotMetadata::default())
            })
            .collect();
        QuerySnapshot::new(
            apply_query_to_documents(candidates, path, query),
            SnapshotMetadata::default(),
        )
    }

    /// Re-emits to every listener whose target can contain `key`.
    ///
    /// Listeners are collected first and invoked without holding any lock.
    fn notify(&self, key: &DocumentKey) {
        let queries: Vec<(ResourcePath, QueryDescriptor, QueryListener)> = self
            .query_listeners
            .lock()
            .unwrap()
            .values()
            .filter(|entry| matches_target(key, &entry.path, &entry.query))
            .map(|entry| (entry.path.clone(), entry.query.clone(), Arc::clone(&entry.listener)))
            .collect();
        for (path, query, listener) in queries {
            listener(Ok(self.query_snapshot(&path, &query)));
        }

        let documents: Vec<DocumentListener> = self
            .document_listeners
            .lock()
            .unwrap()
            .values()
            .filter(|entry| &entry.key == key)
            .map(|entry| Arc::clone(&entry.listener))
            .collect();
        if !documents.is_empty() {
            let snapshot = self.snapshot_of(key);
            for listener in documents {
                listener(Ok(snapshot.clone()));
            }
        }
    }

    fn remove_query_listener(&self, id: u64) {
        self.query_listeners.lock().unwrap().remove(&id);
    }

    fn remove_document_listener(&self, id: u64) {
        self.document_listeners.lock().unwrap().remove(&id);
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl RemoteStore for InMemoryStore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        self.check_read()?;
        Ok(self.inner.snapshot_of(key))
    }

    async fn set_document(
        &self,
        key: &DocumentKey,
        data: MapValue,
        options: SetOptions,
    ) -> FirestoreResult<()> {
        self.check_write()?;
        self.apply_set(key, data, options);
        self.inner.notify(key);
        Ok(())
    }

    async fn update_document(&self, key: &DocumentKey, data: MapValue) -> FirestoreResult<()> {
        self.check_write()?;
        self.apply_update(key, data)?;
        self.inner.notify(key);
        Ok(())
    }

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()> {
        self.check_write()?;
        self.inner.documents.lock().unwrap().remove(key);
        self.inner.notify(key);
        Ok(())
    }

    async fn run_query(
        &self,
        path: &ResourcePath,
        query: &QueryDescriptor,
    ) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.check_read()?;
        Ok(self.inner.query_snapshot(path, query).into_iter().collect())
    }

    fn listen_query(
        &self,
        path: &ResourcePath,
        query: &QueryDescriptor,
        listener: QueryListener,
    ) -> FirestoreResult<ListenerRegistration> {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner.query_listeners.lock().unwrap().insert(
            id,
            QueryListenerEntry {
                path: path.clone(),
                query: query.clone(),
                listener: Arc::clone(&listener),
            },
        );

        match self.check_read() {
            Ok(()) => listener(Ok(self.inner.query_snapshot(path, query))),
            Err(error) => listener(Err(error)),
        }

        let inner: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove_query_listener(id);
            }
        }))
    }

    fn listen_document(
        &self,
        key: &DocumentKey,
        listener: DocumentListener,
    ) -> FirestoreResult<ListenerRegistration> {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.inner.document_listeners.lock().unwrap().insert(
            id,
            DocumentListenerEntry {
                key: key.clone(),
                listener: Arc::clone(&listener),
            },
        );

        match self.check_read() {
            Ok(()) => listener(Ok(self.inner.snapshot_of(key))),
            Err(error) => listener(Err(error)),
        }

        let inner: Weak<StoreInner> = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove_document_listener(id);
            }
        }))
    }

    fn resolve_reference(&self, path: &str) -> FirestoreResult<DocumentReference> {
        DocumentReference::from_path(path)
    }

    fn new_document_id(&self, _collection: &ResourcePath) -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .map(char::from)
            .take(AUTO_ID_LENGTH)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::{remote_write_failure, FirestoreErrorCode};
    use crate::firestore::query::{FilterOperator, OrderDirection};
    use crate::firestore::value::FirestoreValue;

    fn fields(name: &str, age: i64) -> MapValue {
        let mut map = MapValue::empty();
        map.insert("name", name);
        map.insert("age", age);
        map
    }

    #[tokio::test]
    async fn in_memory_get_set() {
        let store = InMemoryStore::new();
        let key = DocumentKey::from_string("cities/sf").unwrap();
        let mut map = MapValue::empty();
        map.insert("name", "SF");
        store
            .set_document(&key, map.clone(), SetOptions::default())
            .await
            .unwrap();
        let snapshot = store.get_document(&key).await.unwrap();
        assert!(snapshot.exists());
        assert_eq!(snapshot.get("name"), Some(&FirestoreValue::from_string("SF")));
    }

    #[tokio::test]
    async fn merge_set_keeps_existing_fields() {
        let store = InMemoryStore::new();
        store.seed("users/a", fields("Ada", 36)).unwrap();
        let key = DocumentKey::from_string("users/a").unwrap();
        let mut delta = MapValue::empty();
        delta.insert("age", 37);
        store
            .set_document(&key, delta, SetOptions::merge())
            .await
            .unwrap();
        let stored = store.document("users/a").unwrap();
        assert_eq!(stored.get("name"), Some(&FirestoreValue::from_string("Ada")));
        assert_eq!(stored.get("age"), Some(&FirestoreValue::from_integer(37)));
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = InMemoryStore::new();
        let key = DocumentKey::from_string("users/missing").unwrap();
        let err = store
            .update_document(&key, fields("x", 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::NotFound);
    }

    #[tokio::test]
    async fn runs_filtered_queries() {
        let store = InMemoryStore::new();
        store.seed("users/a", fields("Ada", 36)).unwrap();
        store.seed("users/b", fields("Bob", 17)).unwrap();
        store.seed("users/c", fields("Cy", 52)).unwrap();
        let query = QueryDescriptor::new()
            .filter("age", FilterOperator::GreaterThanOrEqual, 18)
            .order_by("age", OrderDirection::Descending);
        let results = store
            .run_query(&ResourcePath::from_string("users"), &query)
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|doc| doc.id()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn listeners_receive_initial_and_subsequent_results() {
        let store = InMemoryStore::new();
        store.seed("users/a", fields("Ada", 36)).unwrap();
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&sizes);
        let registration = store
            .listen_query(
                &ResourcePath::from_string("users"),
                &QueryDescriptor::new(),
                Arc::new(move |result: FirestoreResult<QuerySnapshot>| {
                    captured.lock().unwrap().push(result.unwrap().len());
                }),
            )
            .unwrap();
        store.seed("users/b", fields("Bob", 17)).unwrap();
        store.seed("rooms/r", fields("lobby", 0)).unwrap();
        assert_eq!(sizes.lock().unwrap().as_slice(), &[1, 2]);

        registration.detach();
        assert_eq!(store.active_listener_count(), 0);
        store.seed("users/c", fields("Cy", 52)).unwrap();
        assert_eq!(sizes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_write_failure_leaves_store_untouched() {
        let store = InMemoryStore::new();
        store.fail_writes_with(Some(remote_write_failure("rejected")));
        let key = DocumentKey::from_string("users/a").unwrap();
        let err = store
            .set_document(&key, fields("Ada", 36), SetOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::RemoteWriteFailure);
        assert!(store.document("users/a").is_none());
    }

    #[tokio::test]
    async fn scheduled_write_failure_hits_only_that_write() {
        let store = InMemoryStore::new();
        store.fail_nth_write_with(2, remote_write_failure("rejected"));
        let mut outcomes = Vec::new();
        for path in ["users/a", "users/b", "users/c"] {
            let key = DocumentKey::from_string(path).unwrap();
            let result = store
                .set_document(&key, fields("Ada", 36), SetOptions::default())
                .await;
            outcomes.push(result.is_ok());
        }
        assert_eq!(outcomes, vec![true, false, true]);
        assert!(store.document("users/b").is_none());
        assert!(store.document("users/c").is_some());
    }

    #[test]
    fn generates_auto_ids() {
        let store = InMemoryStore::new();
        let id = store.new_document_id(&ResourcePath::from_string("users"));
        assert_eq!(id.len(), AUTO_ID_LENGTH);
        assert_ne!(id, store.new_document_id(&ResourcePath::from_string("users")));
    }
}
