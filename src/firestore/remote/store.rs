use std::sync::Arc;

use async_trait::async_trait;

use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, DocumentReference, ResourcePath};
use crate::firestore::query::QueryDescriptor;
use crate::firestore::value::MapValue;

use super::snapshot::{DocumentSnapshot, QuerySnapshot};

/// Options accepted by `set` writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge the written fields into the existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

pub type QueryListener = Arc<dyn Fn(FirestoreResult<QuerySnapshot>) + Send + Sync + 'static>;
pub type DocumentListener = Arc<dyn Fn(FirestoreResult<DocumentSnapshot>) + Send + Sync + 'static>;

/// RAII-style listener registration; dropping the handle detaches the
/// underlying listener.
pub struct ListenerRegistration {
    remove: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl ListenerRegistration {
    pub fn new<F>(remove: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn detach(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.remove.is_some())
            .finish()
    }
}

/// The remote document store the cache sits in front of.
///
/// Transport, authentication and query execution live behind this trait;
/// the cache layer only issues reads, writes and subscriptions through it.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RemoteStore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot>;

    async fn set_document(
        &self,
        key: &DocumentKey,
        data: MapValue,
        options: SetOptions,
    ) -> FirestoreResult<()>;

    async fn update_document(&self, key: &DocumentKey, data: MapValue) -> FirestoreResult<()>;

    async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<()>;

    async fn run_query(
        &self,
        path: &ResourcePath,
        query: &QueryDescriptor,
    ) -> FirestoreResult<Vec<DocumentSnapshot>>;

    /// Starts delivering the query's full result set on every change, metadata
    /// changes included, until the registration is detached.
    fn listen_query(
        &self,
        path: &ResourcePath,
        query: &QueryDescriptor,
        listener: QueryListener,
    ) -> FirestoreResult<ListenerRegistration>;

    fn listen_document(
        &self,
        key: &DocumentKey,
        listener: DocumentListener,
    ) -> FirestoreResult<ListenerRegistration>;

    fn resolve_reference(&self, path: &str) -> FirestoreResult<DocumentReference>;

    /// Generates an id for a document that does not exist yet.
    fn new_document_id(&self, collection: &ResourcePath) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registration_removes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registration = ListenerRegistration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registration.detach();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_registration_removes_listener() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        {
            let _registration = ListenerRegistration::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
