use std::sync::Arc;

use crate::firestore::cache::{CacheKey, CacheValue, KeyedCache, MembershipIndex};
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, ResourcePath};
use crate::firestore::remote::{RemoteStore, SetOptions};
use crate::firestore::value::MapValue;

use super::options::MutationOptions;
use super::record::DocumentRecord;

/// The remote half of a local mutation. The optimistic cache update has
/// already happened by the time this is returned; awaiting it issues the
/// store write and yields the store's result unchanged.
#[cfg(not(target_arch = "wasm32"))]
pub type PendingWrite = futures::future::BoxFuture<'static, FirestoreResult<()>>;
#[cfg(target_arch = "wasm32")]
pub type PendingWrite = futures::future::LocalBoxFuture<'static, FirestoreResult<()>>;

/// Applies document writes to the cache optimistically and forwards them to
/// the remote store.
///
/// Besides the document's own entry, every cached result set registered for
/// the document's collection that already holds the document is updated in
/// place. Result sets that do not hold it keep their identity, so their
/// subscribers are not notified. Local state is never rolled back when the
/// remote write fails.
#[derive(Clone)]
pub struct WritePropagator {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn KeyedCache>,
    membership: MembershipIndex,
}

impl WritePropagator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn KeyedCache>,
        membership: MembershipIndex,
    ) -> Self {
        Self {
            store,
            cache,
            membership,
        }
    }

    /// Writes `delta` to the document at `path`.
    ///
    /// Without `merge` the cached document becomes exactly `delta`; with it,
    /// `delta` is unioned into the cached fields. Cached result sets are only
    /// touched by merging sets.
    pub fn apply_local_set(
        &self,
        path: &str,
        delta: MapValue,
        merge: bool,
        options: MutationOptions,
    ) -> FirestoreResult<PendingWrite> {
        let key = document_key(path)?;
        if !options.ignore_local_mutation {
            let id = key.id().to_string();
            self.cache.mutate(
                &CacheKey::document(key.as_str()),
                Box::new(|current| {
                    let record = if merge {
                        previous_record(current, &id).merged_with(&delta)
                    } else {
                        DocumentRecord::optimistic(id.clone(), delta.clone())
                    };
                    Some(CacheValue::document(record))
                }),
                true,
            );
            if merge {
                self.replace_in_collections(&key, |record| record.merged_with(&delta));
            }
        }

        let store = Arc::clone(&self.store);
        Ok(Box::pin(async move {
            store
                .set_document(&key, delta, SetOptions { merge })
                .await
        }))
    }

    /// Unions `delta` into the cached document and every cached result set holding it.
    pub fn apply_local_update(
        &self,
        path: &str,
        delta: MapValue,
        options: MutationOptions,
    ) -> FirestoreResult<PendingWrite> {
        let key = document_key(path)?;
        if !options.ignore_local_mutation {
            let id = key.id().to_string();
            self.cache.mutate(
                &CacheKey::document(key.as_str()),
                Box::new(|current| {
                    Some(CacheValue::document(
                        previous_record(current, &id).merged_with(&delta),
                    ))
                }),
                true,
            );
            self.replace_in_collections(&key, |record| record.merged_with(&delta));
        }

        let store = Arc::clone(&self.store);
        Ok(Box::pin(async move { store.update_document(&key, delta).await }))
    }

    /// Marks the cached document absent and filters it out of every cached result set.
    pub fn apply_local_delete(
        &self,
        path: &str,
        options: MutationOptions,
    ) -> FirestoreResult<PendingWrite> {
        let key = document_key(path)?;
        if !options.ignore_local_mutation {
            self.cache
                .write(&CacheKey::document(key.as_str()), CacheValue::Absent, true);
            self.for_each_collection_entry(&key, |records, id| {
                if !records.iter().any(|record| record.id() == id) {
                    return None;
                }
                Some(
                    records
                        .iter()
                        .filter(|record| record.id() != id)
                        .cloned()
                        .collect(),
                )
            });
        }

        let store = Arc::clone(&self.store);
        Ok(Box::pin(async move { store.delete_document(&key).await }))
    }

    /// Replaces the document in every cached result set that holds it with a
    /// record delivered by the store.
    pub(crate) fn propagate_remote_document(&self, key: &DocumentKey, record: &DocumentRecord) {
        self.replace_in_collections(key, |_| record.clone());
    }

    fn replace_in_collections<F>(&self, key: &DocumentKey, replace: F)
    where
        F: Fn(&DocumentRecord) -> DocumentRecord,
    {
        self.for_each_collection_entry(key, |records, id| {
            if !records.iter().any(|record| record.id() == id) {
                return None;
            }
            Some(
                records
                    .iter()
                    .map(|record| {
                        if record.id() == id {
                            replace(record)
                        } else {
                            record.clone()
                        }
                    })
                    .collect(),
            )
        });
    }

    /// Runs `update` over the cached array of every query registered for the
    /// document's collection. `None` from `update` keeps the array as it is.
    fn for_each_collection_entry<F>(&self, key: &DocumentKey, update: F)
    where
        F: Fn(&[DocumentRecord], &str) -> Option<Vec<DocumentRecord>>,
    {
        let collection = key.collection_path().canonical_string();
        for (path, query) in self.membership.active_keys_for(&collection) {
            self.cache.mutate(
                &CacheKey::query(&path, query),
                Box::new(|current| {
                    let records = current?.as_collection()?;
                    update(records, key.id()).map(CacheValue::collection)
                }),
                true,
            );
        }
    }
}

fn document_key(path: &str) -> FirestoreResult<DocumentKey> {
    let path = ResourcePath::from_string(path);
    path.require_document("document write")?;
    DocumentKey::from_path(path)
}

fn previous_record(current: Option<&CacheValue>, id: &str) -> DocumentRecord {
    current
        .and_then(CacheValue::as_document)
        .map(|record| record.as_ref().clone())
        .unwrap_or_else(|| DocumentRecord::new(id, MapValue::empty()))
}
