use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::{CacheConfig, FailurePolicy};

type Slot<R, E> = Arc<OnceCell<Result<R, E>>>;

/// Keyed table of compute-once resources.
///
/// For a given key the factory runs at most once while the entry lives: a
/// second caller arriving while the first factory is still running blocks on
/// the same cell and receives the same result. What happens after the factory
/// settles is decided by the configured [`FailurePolicy`].
///
/// The table lock is never held while a factory runs, so factories for
/// different keys proceed concurrently unless `serialize_creation` is set.
/// With `serialize_creation`, a factory must not call back into the same cache
/// for a different key (the creation gate is not reentrant).
///
/// A factory that panics settles nothing: its entry is dropped from the table,
/// the panic reaches the caller that ran it, and the next caller for that key
/// runs its own factory.
pub struct KeyedResourceCache<R, E> {
    entries: Mutex<HashMap<String, Slot<R, E>>>,
    creation_gate: Mutex<()>,
    config: CacheConfig,
}

impl<R, E> KeyedResourceCache<R, E>
where
    R: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            creation_gate: Mutex::new(()),
            config,
        }
    }

    pub fn with_policy(failure_policy: FailurePolicy) -> Self {
        Self::with_config(CacheConfig {
            failure_policy,
            ..CacheConfig::default()
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the resource stored under `key`, creating it with `factory` on a miss.
    pub fn get_or_create<F>(&self, key: &str, factory: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
    {
        let slot = {
            let mut entries = self.lock_entries();
            match entries.get(key) {
                Some(slot) => {
                    debug!(key, "reuse cached resource");
                    Arc::clone(slot)
                }
                None => {
                    let slot: Slot<R, E> = Arc::new(OnceCell::new());
                    entries.insert(key.to_string(), Arc::clone(&slot));
                    slot
                }
            }
        };

        let mut created = false;
        let result = slot
            .get_or_init(|| {
                created = true;
                let _unwind = EvictOnUnwind {
                    cache: self,
                    key,
                    slot: &slot,
                };
                debug!(key, "create resource");
                if self.config.serialize_creation {
                    let _gate = self
                        .creation_gate
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    factory()
                } else {
                    factory()
                }
            })
            .clone();

        if created && self.config.failure_policy.evicts(result.is_ok()) {
            self.evict(key, &slot);
        }
        result
    }

    /// Settled result under `key`, without waiting and without creating.
    pub fn peek(&self, key: &str) -> Option<Result<R, E>> {
        self.lock_entries()
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Whether `key` has an entry, settled or still being created.
    pub fn contains(&self, key: &str) -> bool {
        self.lock_entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Drop the entry for `key`. Callers already waiting on it still get its result.
    pub fn remove(&self, key: &str) -> bool {
        self.lock_entries().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    fn evict(&self, key: &str, slot: &Slot<R, E>) {
        let mut entries = self.lock_entries();
        // Only drop our own entry; a later one may have replaced it already.
        if entries.get(key).is_some_and(|cur| Arc::ptr_eq(cur, slot)) {
            entries.remove(key);
            debug!(
                key,
                policy = self.config.failure_policy.as_str(),
                "evicted settled resource"
            );
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Slot<R, E>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops the entry when a factory unwinds instead of returning.
struct EvictOnUnwind<'a, R: Clone, E: Clone> {
    cache: &'a KeyedResourceCache<R, E>,
    key: &'a str,
    slot: &'a Slot<R, E>,
}

impl<R: Clone, E: Clone> Drop for EvictOnUnwind<'_, R, E> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.cache.evict(self.key, self.slot);
        }
    }
}

impl<R: Clone, E: Clone> Default for KeyedResourceCache<R, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone, E: Clone> fmt::Debug for KeyedResourceCache<R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedResourceCache")
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
