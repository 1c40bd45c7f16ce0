//! Observable value cells
//!
//! A `Store<T>` holds one value and pushes every update to its subscribers.
//! Subscribing delivers the current value immediately, so late subscribers
//! never miss the state they attach to.

use std::sync::{Arc, Mutex, MutexGuard};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: T,
    next_id: u64,
    subscribers: Vec<(u64, Callback<T>)>,
}

/// Shared writable value with push notifications.
///
/// Cloning a store yields another handle to the same cell.
pub struct Store<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle returned by [`Store::subscribe`]; pass it to [`Store::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

impl<T: Clone + Send + 'static> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                value,
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // subscribers never run under this lock
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replace the value and notify every subscriber.
    pub fn set(&self, value: T) {
        let (snapshot, subscribers) = {
            let mut inner = self.lock();
            inner.value = value;
            (inner.value.clone(), Self::callbacks(&inner))
        };

        for callback in subscribers {
            callback(&snapshot);
        }
    }

    /// Compute a new value from the current one and publish it.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let (snapshot, subscribers) = {
            let mut inner = self.lock();
            inner.value = f(&inner.value);
            (inner.value.clone(), Self::callbacks(&inner))
        };

        for callback in subscribers {
            callback(&snapshot);
        }
    }

    /// Register a callback. It is invoked right away with the current value
    /// and then after every `set`/`update`.
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let callback: Callback<T> = Arc::new(f);
        let (id, snapshot) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Arc::clone(&callback)));
            (SubscriptionId(id), inner.value.clone())
        };

        callback(&snapshot);
        id
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id.0);
        inner.subscribers.len() < before
    }

    /// Wait until the value satisfies `pred` and return it.
    ///
    /// Resolves immediately if the current value already matches.
    pub async fn wait_for<F>(&self, pred: F) -> T
    where
        F: Fn(&T) -> bool,
    {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let id = self.subscribe(move |value: &T| {
            let _ = tx.send(value.clone());
        });
        // unsubscribes even when the caller drops this future early
        let _guard = Unsubscribe { store: self, id };

        let mut last = self.get();
        while let Some(value) = rx.recv().await {
            if pred(&value) {
                last = value;
                break;
            }
        }

        last
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn callbacks(inner: &Inner<T>) -> Vec<Callback<T>> {
        inner
            .subscribers
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }
}

struct Unsubscribe<'a, T: Clone + Send + 'static> {
    store: &'a Store<T>,
    id: SubscriptionId,
}

impl<T: Clone + Send + 'static> Drop for Unsubscribe<'_, T> {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
    }
}

impl<T: Clone + Send + std::fmt::Debug + 'static> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("value", &self.get()).finish()
    }
}

/// Explicit initialization gate. Token-dependent work waits for `mount()`.
#[derive(Clone, Debug)]
pub struct Mounted {
    store: Store<bool>,
}

impl Default for Mounted {
    fn default() -> Self {
        Self::new()
    }
}

impl Mounted {
    pub fn new() -> Self {
        Self {
            store: Store::new(false),
        }
    }

    pub fn mount(&self) {
        if !self.store.get() {
            self.store.set(true);
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.store.get()
    }

    pub fn store(&self) -> &Store<bool> {
        &self.store
    }
}
