//! Per-request key-value store.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type Slot = Arc<dyn Any + Send + Sync>;

/// State that lives exactly as long as one request.
///
/// The host creates one scope per request and hands clones of it to the
/// code serving that request. Clones share the same container. Values are
/// stored under static string keys and retrieved by type.
#[derive(Clone, Debug)]
pub struct RequestScope {
    inner: Arc<ScopeInner>,
}

#[derive(Debug)]
struct ScopeInner {
    id: Uuid,
    values: Mutex<HashMap<&'static str, Slot>>,
}

impl RequestScope {
    /// Creates an empty scope with a fresh id.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                id: Uuid::new_v4(),
                values: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Identifier used to correlate log lines for this scope.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let values = self.lock();
        values
            .get(key)
            .and_then(|slot| Arc::clone(slot).downcast::<T>().ok())
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn insert<T: Any + Send + Sync>(&self, key: &'static str, value: Arc<T>) {
        self.lock().insert(key, value);
    }

    /// Removes and returns the value under `key` if it has type `T`.
    ///
    /// A value of another type is left in place and `None` is returned.
    pub fn remove<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let mut values = self.lock();
        if !values.get(key).is_some_and(|slot| slot.is::<T>()) {
            return None;
        }
        values
            .remove(key)
            .and_then(|slot| slot.downcast::<T>().ok())
    }

    /// Whether anything is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Returns the `T` stored under `key`, creating it with `init` if absent.
    ///
    /// The lookup and the insert happen under one lock, so concurrent
    /// callers sharing this scope observe a single value. If `init` fails
    /// nothing is stored.
    pub fn get_or_try_insert_with<T, E, F>(&self, key: &'static str, init: F) -> Result<Arc<T>, E>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, E>,
    {
        let mut values = self.lock();
        if let Some(existing) = values
            .get(key)
            .and_then(|slot| Arc::clone(slot).downcast::<T>().ok())
        {
            return Ok(existing);
        }

        let created = Arc::new(init()?);
        values.insert(key, Arc::clone(&created) as Slot);
        Ok(created)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<&'static str, Slot>> {
        // A panic while holding this lock cannot leave the map half-updated,
        // so the poisoned guard is still usable.
        self.inner
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}
