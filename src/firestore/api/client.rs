use std::sync::Arc;

use futures::future::join_all;

use crate::firestore::cache::{
    CacheKey, CacheValue, KeyedCache, MembershipIndex, MemoryCache, SnapshotHandleCache,
};
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, ResourcePath};
use crate::firestore::query::{QueryDescriptor, QuerySerializer};
use crate::firestore::remote::{InMemoryStore, RemoteStore, SetOptions};
use crate::firestore::value::MapValue;

use super::options::{MutationOptions, ResolveOptions, SwrSettings};
use super::orchestrator::{Orchestrator, Resolved};
use super::propagator::{PendingWrite, WritePropagator};
use super::record::DocumentRecord;

/// Entry point tying a remote store and a keyed cache together.
///
/// Owns one membership index and one snapshot handle cache shared by every
/// read and write issued through it. Cloning shares all of them.
#[derive(Clone)]
pub struct SwrFirestore {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn KeyedCache>,
    membership: MembershipIndex,
    serializer: QuerySerializer,
    propagator: WritePropagator,
    orchestrator: Orchestrator,
}

impl SwrFirestore {
    pub fn new(store: Arc<dyn RemoteStore>, cache: Arc<dyn KeyedCache>) -> Self {
        Self::with_settings(store, cache, SwrSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn KeyedCache>,
        settings: SwrSettings,
    ) -> Self {
        let membership = MembershipIndex::new();
        let serializer = QuerySerializer::new(Arc::clone(&store), SnapshotHandleCache::new());
        let propagator =
            WritePropagator::new(Arc::clone(&store), Arc::clone(&cache), membership.clone());
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            membership.clone(),
            serializer.clone(),
            propagator.clone(),
            settings,
        );
        Self {
            store,
            cache,
            membership,
            serializer,
            propagator,
            orchestrator,
        }
    }

    /// Returns a client over an [`InMemoryStore`] and a [`MemoryCache`].
    ///
    /// Useful for tests or demos where network access is not required.
    pub fn in_memory() -> (Self, InMemoryStore, MemoryCache) {
        let store = InMemoryStore::new();
        let cache = MemoryCache::new();
        let client = Self::new(Arc::new(store.clone()), Arc::new(cache.clone()));
        (client, store, cache)
    }

    /// Reads `query` over the collection at `path`. See [`Orchestrator::resolve`].
    pub async fn get_collection(
        &self,
        path: &str,
        query: &QueryDescriptor,
        options: &ResolveOptions,
    ) -> FirestoreResult<Resolved<Arc<Vec<DocumentRecord>>>> {
        self.orchestrator.resolve(path, query, options).await
    }

    /// Reads the document at `path`. See [`Orchestrator::resolve_document`].
    pub async fn get_document(
        &self,
        path: &str,
        options: &ResolveOptions,
    ) -> FirestoreResult<Resolved<Arc<DocumentRecord>>> {
        self.orchestrator.resolve_document(path, options).await
    }

    /// Sets the document at `path`.
    ///
    /// The cache is updated before this returns; await the returned write to
    /// learn whether the store accepted it.
    pub fn set(
        &self,
        path: &str,
        data: MapValue,
        options: SetOptions,
        mutation: MutationOptions,
    ) -> FirestoreResult<PendingWrite> {
        self.propagator
            .apply_local_set(path, data, options.merge, mutation)
    }

    /// Unions `data` into the document at `path`.
    pub fn update(
        &self,
        path: &str,
        data: MapValue,
        mutation: MutationOptions,
    ) -> FirestoreResult<PendingWrite> {
        self.propagator.apply_local_update(path, data, mutation)
    }

    pub fn delete(&self, path: &str, mutation: MutationOptions) -> FirestoreResult<PendingWrite> {
        self.propagator.apply_local_delete(path, mutation)
    }

    /// Creates one document per entry of `documents` in the collection at
    /// `path` and returns the generated ids, in order.
    ///
    /// Unless `listen` is set, the new records are appended to the cached
    /// results of `query` right away; a live subscription on that query
    /// reports the inserts on its own.
    ///
    /// Every document is written to the store even when one of the writes is
    /// rejected. In that case each failure is logged with its id, the first
    /// error is returned, and the optimistic records stay cached.
    pub async fn add(
        &self,
        path: &str,
        query: &QueryDescriptor,
        documents: Vec<MapValue>,
        listen: bool,
    ) -> FirestoreResult<Vec<String>> {
        let collection = ResourcePath::from_string(path);
        collection.require_collection("add")?;

        let ids: Vec<String> = documents
            .iter()
            .map(|_| self.store.new_document_id(&collection))
            .collect();

        if !listen {
            let serialized = self.serializer.serialize(query);
            let collection_path = collection.canonical_string();
            self.membership
                .record_query(&collection_path, Some(&serialized));
            let additions: Vec<DocumentRecord> = ids
                .iter()
                .zip(&documents)
                .map(|(id, data)| DocumentRecord::optimistic(id.clone(), data.clone()))
                .collect();
            self.cache.mutate(
                &CacheKey::query(&collection_path, serialized),
                Box::new(|current| {
                    let mut records: Vec<DocumentRecord> = current
                        .and_then(CacheValue::as_collection)
                        .map(|records| records.as_ref().clone())
                        .unwrap_or_default();
                    records.extend(additions);
                    Some(CacheValue::collection(records))
                }),
                true,
            );
        }

        let mut pending = Vec::with_capacity(ids.len());
        for (id, data) in ids.iter().zip(documents) {
            let document = collection.child([id.as_str()]);
            pending.push(self.propagator.apply_local_set(
                &document.canonical_string(),
                data,
                false,
                MutationOptions::default(),
            )?);
        }
        let outcomes = join_all(pending).await;
        let mut first_error = None;
        for (id, outcome) in ids.iter().zip(outcomes) {
            if let Err(error) = outcome {
                log::warn!("adding `{id}` to {path} was rejected: {error}");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(ids),
        }
    }

    /// Drops the cached document at `path` so its next read refetches.
    pub fn revalidate_document(&self, path: &str) -> FirestoreResult<()> {
        let key = DocumentKey::from_string(path)?;
        self.cache.invalidate(&CacheKey::document(key.as_str()));
        Ok(())
    }

    /// Drops every cached query result registered for the collection at `path`.
    pub fn revalidate_collection(&self, path: &str) -> FirestoreResult<()> {
        let collection = ResourcePath::from_string(path);
        collection.require_collection("revalidate_collection")?;
        for (path, query) in self
            .membership
            .active_keys_for(&collection.canonical_string())
        {
            self.cache.invalidate(&CacheKey::query(&path, query));
        }
        Ok(())
    }

    /// Closes the live subscription for `query` over `path`. See [`Orchestrator::release`].
    pub fn release(&self, path: &str, query: &QueryDescriptor) -> FirestoreResult<()> {
        self.orchestrator.release(path, query)
    }

    /// The cache key a read of `query` over `path` populates.
    pub fn query_key(&self, path: &str, query: &QueryDescriptor) -> CacheKey {
        CacheKey::query(path, self.serializer.serialize(query))
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn KeyedCache> {
        &self.cache
    }

    pub fn membership(&self) -> &MembershipIndex {
        &self.membership
    }

    pub fn serializer(&self) -> &QuerySerializer {
        &self.serializer
    }

    pub fn propagator(&self) -> &WritePropagator {
        &self.propagator
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
