use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::channel::oneshot;

use crate::firestore::cache::{
    CacheKey, CacheValue, KeyedCache, MembershipIndex, SnapshotHandleCache,
};
use crate::firestore::error::{cancelled, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath};
use crate::firestore::query::{QueryDescriptor, QuerySerializer};
use crate::firestore::remote::{
    DocumentSnapshot, ListenerRegistration, QuerySnapshot, RemoteStore,
};

use super::options::{ResolveOptions, SwrSettings};
use super::propagator::WritePropagator;
use super::record::{DecodeOptions, DocumentRecord};

type ListenerMap = Arc<Mutex<HashMap<CacheKey, ActiveListener>>>;
type OpenGates = Arc<Mutex<HashMap<CacheKey, Arc<async_lock::Mutex<()>>>>>;
type Emission<E> = Arc<dyn Fn(FirestoreResult<E>) + Send + Sync + 'static>;

/// The outcome of a read: the cache key it populated, the value it returned,
/// and the live subscription keeping that key fresh, if one was requested.
pub struct Resolved<T> {
    key: CacheKey,
    value: T,
    subscription: Option<LiveSubscription>,
}

impl<T> Resolved<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn subscription(&self) -> Option<&LiveSubscription> {
        self.subscription.as_ref()
    }

    pub fn into_parts(self) -> (CacheKey, T, Option<LiveSubscription>) {
        (self.key, self.value, self.subscription)
    }
}

/// Fetches documents and query results into the keyed cache, once or through
/// a live subscription.
///
/// At most one live subscription exists per cache key. Opening a new one for
/// a key first closes the old one. Openings of the same key are serialized;
/// openings of different keys never wait on each other.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn RemoteStore>,
    cache: Arc<dyn KeyedCache>,
    membership: MembershipIndex,
    serializer: QuerySerializer,
    propagator: WritePropagator,
    settings: SwrSettings,
    listeners: ListenerMap,
    open_gates: OpenGates,
    next_listener_id: Arc<AtomicU64>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<dyn KeyedCache>,
        membership: MembershipIndex,
        serializer: QuerySerializer,
        propagator: WritePropagator,
        settings: SwrSettings,
    ) -> Self {
        Self {
            store,
            cache,
            membership,
            serializer,
            propagator,
            settings,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            open_gates: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reads the results of `query` over the collection at `path` into the cache.
    ///
    /// Every returned document is also written under its own document key. In
    /// live mode the call returns after the first snapshot and keeps writing on
    /// every later one until the subscription is closed.
    pub async fn resolve(
        &self,
        path: &str,
        query: &QueryDescriptor,
        options: &ResolveOptions,
    ) -> FirestoreResult<Resolved<Arc<Vec<DocumentRecord>>>> {
        let collection = ResourcePath::from_string(path);
        collection.require_collection("resolve")?;
        let decode = options.decode_options(self.settings.warns_on_reserved_fields())?;

        let serialized = self.serializer.serialize(query);
        let collection_path = collection.canonical_string();
        self.membership
            .record_query(&collection_path, Some(&serialized));
        let key = CacheKey::query(&collection_path, serialized);

        if !options.listen {
            let snapshots = self.store.run_query(&collection, query).await?;
            let value = write_query_results(self.cache.as_ref(), &key, &snapshots, &decode);
            return Ok(Resolved {
                key,
                value,
                subscription: None,
            });
        }

        let apply = {
            let cache = Arc::clone(&self.cache);
            let key = key.clone();
            move |snapshot: QuerySnapshot| {
                write_query_results(cache.as_ref(), &key, snapshot.documents(), &decode)
            }
        };
        let (value, subscription) = self
            .open_live(&key, query.snapshot_cursor_paths(), apply, |listener| {
                self.store.listen_query(&collection, query, listener)
            })
            .await?;
        Ok(Resolved {
            key,
            value,
            subscription: Some(subscription),
        })
    }

    /// Reads one document into the cache and into every cached result set
    /// that already holds it.
    pub async fn resolve_document(
        &self,
        path: &str,
        options: &ResolveOptions,
    ) -> FirestoreResult<Resolved<Arc<DocumentRecord>>> {
        let resource = ResourcePath::from_string(path);
        resource.require_document("resolve_document")?;
        let document = DocumentKey::from_path(resource)?;
        let decode = options.decode_options(self.settings.warns_on_reserved_fields())?;
        let key = CacheKey::document(document.as_str());

        if !options.listen {
            let snapshot = self.store.get_document(&document).await?;
            let value = write_document_result(
                self.cache.as_ref(),
                &self.propagator,
                &key,
                &snapshot,
                &decode,
            );
            return Ok(Resolved {
                key,
                value,
                subscription: None,
            });
        }

        let apply = {
            let cache = Arc::clone(&self.cache);
            let propagator = self.propagator.clone();
            let key = key.clone();
            move |snapshot: DocumentSnapshot| {
                write_document_result(cache.as_ref(), &propagator, &key, &snapshot, &decode)
            }
        };
        let (value, subscription) = self
            .open_live(&key, Vec::new(), apply, |listener| {
                self.store.listen_document(&document, listener)
            })
            .await?;
        Ok(Resolved {
            key,
            value,
            subscription: Some(subscription),
        })
    }

    /// Closes the live subscription for `query` over `path`, if any, and drops
    /// the snapshot handles its cursors registered unless another live
    /// subscription still uses them. Membership is kept.
    pub fn release(&self, path: &str, query: &QueryDescriptor) -> FirestoreResult<()> {
        let collection = ResourcePath::from_string(path);
        collection.require_collection("release")?;
        let key = CacheKey::query(
            &collection.canonical_string(),
            self.serializer.serialize(query),
        );
        let (closing, cursor_paths) = match self.take_listener(&key) {
            Some(listener) => {
                let paths = listener.cursor_paths.clone();
                (Some(listener), paths)
            }
            None => (None, query.snapshot_cursor_paths()),
        };
        if let Some(listener) = closing {
            listener.close();
        }
        release_handles(&self.listeners, self.serializer.handles(), &cursor_paths);
        Ok(())
    }

    /// Whether a live subscription currently feeds `key`.
    pub fn is_listening(&self, key: &CacheKey) -> bool {
        self.listeners.lock().unwrap().contains_key(key)
    }

    async fn open_live<E, T, Apply, Subscribe>(
        &self,
        key: &CacheKey,
        cursor_paths: Vec<String>,
        apply: Apply,
        subscribe: Subscribe,
    ) -> FirestoreResult<(T, LiveSubscription)>
    where
        E: 'static,
        T: Send + 'static,
        Apply: Fn(E) -> T + Send + Sync + 'static,
        Subscribe: FnOnce(Emission<E>) -> FirestoreResult<ListenerRegistration>,
    {
        let (sender, receiver) = oneshot::channel::<FirestoreResult<T>>();
        let first = Arc::new(Mutex::new(Some(sender)));
        let active = Arc::new(AtomicBool::new(true));
        let listener: Emission<E> = {
            let active = Arc::clone(&active);
            let first = Arc::clone(&first);
            let key = key.clone();
            Arc::new(move |result: FirestoreResult<E>| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                let pending = first.lock().unwrap().take();
                match (result, pending) {
                    (Ok(value), Some(sender)) => {
                        let _ = sender.send(Ok(apply(value)));
                    }
                    (Ok(value), None) => {
                        apply(value);
                    }
                    (Err(error), Some(sender)) => {
                        let _ = sender.send(Err(error));
                    }
                    (Err(error), None) => {
                        log::warn!("live subscription for {key} reported an error: {error}");
                    }
                }
            })
        };
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);

        // Close-then-open and registration happen under the key's gate; the
        // first snapshot is awaited outside it.
        {
            let gate = self.gate_for(key);
            let guard = gate.lock().await;
            if let Some(previous) = self.take_listener(key) {
                previous.close();
            }
            let opened = subscribe(listener).map(|registration| {
                log::debug!("opened live subscription {id} for {key}");
                self.listeners.lock().unwrap().insert(
                    key.clone(),
                    ActiveListener {
                        id,
                        active,
                        registration,
                        cursor_paths,
                        abandon_first: Box::new(move || {
                            first.lock().unwrap().take();
                        }),
                    },
                );
            });
            drop(guard);
            drop(gate);
            self.forget_gate(key);
            opened?;
        }

        let first_emission = match receiver.await {
            Ok(result) => result,
            Err(_) => Err(cancelled(format!(
                "subscription for {key} closed before its first snapshot"
            ))),
        };
        let value = match first_emission {
            Ok(value) => value,
            Err(error) => {
                if let Some(listener) = self.take_listener_if(key, id) {
                    listener.close();
                }
                return Err(error);
            }
        };

        Ok((
            value,
            LiveSubscription {
                id,
                key: key.clone(),
                closed: AtomicBool::new(false),
                listeners: Arc::downgrade(&self.listeners),
                handles: self.serializer.handles().clone(),
            },
        ))
    }

    fn gate_for(&self, key: &CacheKey) -> Arc<async_lock::Mutex<()>> {
        let mut gates = self.open_gates.lock().unwrap();
        let gate = gates
            .entry(key.clone())
            .or_insert_with(|| Arc::new(async_lock::Mutex::new(())));
        Arc::clone(gate)
    }

    /// Drops the gate for `key` once no opener holds or waits on it.
    fn forget_gate(&self, key: &CacheKey) {
        let mut gates = self.open_gates.lock().unwrap();
        if gates.get(key).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(key);
        }
    }

    fn take_listener(&self, key: &CacheKey) -> Option<ActiveListener> {
        self.listeners.lock().unwrap().remove(key)
    }

    fn take_listener_if(&self, key: &CacheKey, id: u64) -> Option<ActiveListener> {
        take_listener_if(&self.listeners, key, id)
    }
}

fn take_listener_if(
    listeners: &Mutex<HashMap<CacheKey, ActiveListener>>,
    key: &CacheKey,
    id: u64,
) -> Option<ActiveListener> {
    let mut listeners = listeners.lock().unwrap();
    match listeners.get(key) {
        Some(entry) if entry.id == id => listeners.remove(key),
        _ => None,
    }
}

/// Removes the snapshot handles in `paths` that no remaining live
/// subscription still lists among its cursors.
fn release_handles(
    listeners: &Mutex<HashMap<CacheKey, ActiveListener>>,
    handles: &SnapshotHandleCache,
    paths: &[String],
) {
    let unused: Vec<&String> = {
        let listeners = listeners.lock().unwrap();
        paths
            .iter()
            .filter(|path| {
                !listeners
                    .values()
                    .any(|listener| listener.cursor_paths.contains(path))
            })
            .collect()
    };
    for path in unused {
        handles.remove(path);
    }
}

struct ActiveListener {
    id: u64,
    active: Arc<AtomicBool>,
    registration: ListenerRegistration,
    cursor_paths: Vec<String>,
    abandon_first: Box<dyn FnOnce() + Send>,
}

impl ActiveListener {
    /// Stops cache writes and detaches from the store. An opener still
    /// waiting for the first snapshot is woken with a cancellation.
    ///
    /// Cursor handles are left alone; see [`release_handles`].
    fn close(self) {
        self.active.store(false, Ordering::SeqCst);
        self.registration.detach();
        (self.abandon_first)();
        log::debug!("closed live subscription {}", self.id);
    }
}

/// Handle to a live subscription opened by [`Orchestrator`].
///
/// Closing is idempotent: [`LiveSubscription::unsubscribe`] may be called any
/// number of times, and dropping the handle closes the subscription too. A
/// handle whose subscription was already replaced by a newer one for the same
/// key leaves the newer one alone.
pub struct LiveSubscription {
    id: u64,
    key: CacheKey,
    closed: AtomicBool,
    listeners: Weak<Mutex<HashMap<CacheKey, ActiveListener>>>,
    handles: SnapshotHandleCache,
}

impl LiveSubscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Whether this subscription is still the one feeding its key.
    pub fn is_active(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let current = listeners.lock().unwrap().get(&self.key).map(|entry| entry.id);
        current == Some(self.id)
    }

    pub fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        if let Some(entry) = take_listener_if(&listeners, &self.key, self.id) {
            let cursor_paths = entry.cursor_paths.clone();
            entry.close();
            release_handles(&listeners, &self.handles, &cursor_paths);
        }
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for LiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSubscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

fn write_query_results(
    cache: &dyn KeyedCache,
    key: &CacheKey,
    snapshots: &[DocumentSnapshot],
    decode: &DecodeOptions,
) -> Arc<Vec<DocumentRecord>> {
    let records: Vec<DocumentRecord> = snapshots
        .iter()
        .map(|snapshot| {
            let record = DocumentRecord::from_snapshot(snapshot, decode);
            cache.write(
                &CacheKey::document(snapshot.key().as_str()),
                CacheValue::document(record.clone()),
                true,
            );
            record
        })
        .collect();
    let records = Arc::new(records);
    cache.write(key, CacheValue::Collection(Arc::clone(&records)), true);
    records
}

fn write_document_result(
    cache: &dyn KeyedCache,
    propagator: &WritePropagator,
    key: &CacheKey,
    snapshot: &DocumentSnapshot,
    decode: &DecodeOptions,
) -> Arc<DocumentRecord> {
    let record = Arc::new(DocumentRecord::from_snapshot(snapshot, decode));
    cache.write(key, CacheValue::Document(Arc::clone(&record)), true);
    propagator.propagate_remote_document(snapshot.key(), &record);
    record
}
