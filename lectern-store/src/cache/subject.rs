//! Framework-independent observer used for per-key change notification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Callback registered with a [`Subject`].
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle identifying one registered observer.
///
/// Ids are unique across every subject sharing an [`ObserverIds`] source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Shared source of observer ids.
#[derive(Debug, Clone, Default)]
pub struct ObserverIds(Arc<AtomicU64>);

impl ObserverIds {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> ObserverId {
        ObserverId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A set of observers notified with each new value.
///
/// Clones share the same observer set. Notification takes a snapshot of the
/// observers and calls them without holding the internal lock, so an
/// observer may subscribe or unsubscribe from inside its callback.
pub struct Subject<T> {
    inner: Arc<Mutex<SubjectInner<T>>>,
    ids: ObserverIds,
}

struct SubjectInner<T> {
    observers: Vec<(ObserverId, Observer<T>)>,
}

impl<T> Subject<T> {
    pub fn new() -> Self {
        Self::with_ids(ObserverIds::new())
    }

    /// Subject drawing its observer ids from `ids`.
    pub fn with_ids(ids: ObserverIds) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubjectInner {
                observers: Vec::new(),
            })),
            ids,
        }
    }

    pub fn subscribe(&self, observer: Observer<T>) -> ObserverId {
        let id = self.ids.next();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .push((id, observer));
        id
    }

    /// Remove an observer. Returns false when it was already gone.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.observers.len();
        inner.observers.retain(|(observer_id, _)| *observer_id != id);
        inner.observers.len() != before
    }

    /// Call every observer with `value`, in subscription order.
    pub fn notify(&self, value: &T) {
        let snapshot: Vec<Observer<T>> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
        };
        for observer in snapshot {
            observer(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ids: self.ids.clone(),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.len())
            .finish()
    }
}
