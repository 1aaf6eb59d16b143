use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::keyed::{CacheKey, CacheListener, CacheUpdater, CacheValue, KeyedCache};

/// In-process keyed cache with per-key change subscriptions.
///
/// Cloning shares the underlying entries.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<MemoryCacheInner>,
}

#[derive(Default)]
struct MemoryCacheInner {
    entries: Mutex<HashMap<CacheKey, CacheValue>>,
    subscribers: Mutex<HashMap<CacheKey, BTreeMap<u64, CacheListener>>>,
    next_subscriber_id: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `listener` whenever the value under `key` changes with notification enabled,
    /// or is invalidated (reported as `None`).
    pub fn subscribe<F>(&self, key: &CacheKey, listener: F) -> CacheSubscription
    where
        F: Fn(&CacheKey, Option<&CacheValue>) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .insert(id, Arc::new(listener));
        CacheSubscription {
            cache: Arc::downgrade(&self.inner),
            key: key.clone(),
            id: Some(id),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.inner.entries.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl MemoryCacheInner {
    fn broadcast(&self, key: &CacheKey, value: Option<&CacheValue>) {
        let listeners: Vec<CacheListener> = self
            .subscribers
            .lock()
            .unwrap()
            .get(key)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(key, value);
        }
    }

    fn unsubscribe(&self, key: &CacheKey, id: u64) {
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(entries) = subscribers.get_mut(key) {
            entries.remove(&id);
            if entries.is_empty() {
                subscribers.remove(key);
            }
        }
    }
}

impl KeyedCache for MemoryCache {
    fn read(&self, key: &CacheKey) -> Option<CacheValue> {
        self.inner.entries.lock().unwrap().get(key).cloned()
    }

    fn write(&self, key: &CacheKey, value: CacheValue, notify: bool) {
        self.inner
            .entries
            .lock()
            .unwrap()
            .insert(key.clone(), value.clone());
        if notify {
            self.inner.broadcast(key, Some(&value));
        }
    }

    fn mutate(&self, key: &CacheKey, updater: CacheUpdater<'_>, notify: bool) {
        let changed = {
            let mut entries = self.inner.entries.lock().unwrap();
            let current = entries.get(key);
            match updater(current) {
                Some(next) if current.map_or(true, |current| !current.same_as(&next)) => {
                    entries.insert(key.clone(), next.clone());
                    Some(next)
                }
                _ => None,
            }
        };
        if let (true, Some(next)) = (notify, changed) {
            self.inner.broadcast(key, Some(&next));
        }
    }

    fn invalidate(&self, key: &CacheKey) {
        let removed = self.inner.entries.lock().unwrap().remove(key);
        if removed.is_some() {
            self.inner.broadcast(key, None);
        }
    }
}

/// RAII handle for a cache subscription; dropping it stops notifications.
pub struct CacheSubscription {
    cache: Weak<MemoryCacheInner>,
    key: CacheKey,
    id: Option<u64>,
}

impl CacheSubscription {
    pub fn detach(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(id), Some(cache)) = (self.id.take(), self.cache.upgrade()) {
            cache.unsubscribe(&self.key, id);
        }
    }
}

impl Drop for CacheSubscription {
    fn drop(&mut self) {
        self.remove();
    }
}
