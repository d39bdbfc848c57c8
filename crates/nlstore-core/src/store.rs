use std::cell::RefCell;
use std::path::Path;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace, warn};

use crate::storage::{
    FileBackend, MemoryBackend, NullBackend, Parsed, PersistenceError, StorageBackend,
    safe_parse_json,
};

/// Delivered to every context *other than* the writer when a `set` or
/// `remove` succeeds. `new_value: None` means the key was removed.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

type Handler = Rc<dyn Fn(&ChangeEvent)>;

struct Listener {
    id: u64,
    context: u64,
    handler: Handler,
}

struct StoreInner {
    backend: Box<dyn StorageBackend>,
    listeners: Vec<Listener>,
    next_listener: u64,
    next_context: u64,
}

impl StoreInner {
    fn handlers_for_others(&self, origin: u64) -> Vec<Handler> {
        self.listeners
            .iter()
            .filter(|listener| listener.context != origin)
            .map(|listener| Rc::clone(&listener.handler))
            .collect()
    }
}

/// One shared key/value store. Cloning yields another handle onto the same
/// backend and listener registry; distinct execution contexts ("tabs") are
/// created with [`Store::context`].
#[derive(Clone)]
pub struct Store {
    inner: Rc<RefCell<StoreInner>>,
}

impl Store {
    /// Open a file-backed store under `data_dir`. When the directory cannot
    /// be used the store degrades to an unavailable backend: everything
    /// still works, values simply live only in memory.
    pub fn open(data_dir: &Path) -> Self {
        match FileBackend::open(data_dir) {
            Ok(backend) => {
                info!(data_dir = %data_dir.display(), "opened file-backed store");
                Self::with_backend(Box::new(backend))
            }
            Err(err) => {
                warn!(
                    data_dir = %data_dir.display(),
                    error = %err,
                    "storage unavailable; falling back to ephemeral defaults"
                );
                Self::with_backend(Box::new(NullBackend))
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::default()))
    }

    /// A store with no backing storage at all (the "no storage in this
    /// environment" mode).
    pub fn ephemeral() -> Self {
        Self::with_backend(Box::new(NullBackend))
    }

    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(StoreInner {
                backend,
                listeners: Vec::new(),
                next_listener: 0,
                next_context: 0,
            })),
        }
    }

    pub fn available(&self) -> bool {
        self.inner.borrow().backend.available()
    }

    /// Create a new execution context. Writes made through one context are
    /// announced to every other context's listeners, never back to the
    /// writer itself.
    pub fn context(&self) -> StoreContext {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_context;
            inner.next_context += 1;
            id
        };
        debug!(context = id, "created store context");
        StoreContext {
            store: self.clone(),
            id,
        }
    }
}

/// RAII handle for a registered change listener. Dropping it deregisters
/// the listener, so a dead owner can never observe further events.
pub struct Subscription {
    inner: Weak<RefCell<StoreInner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner
                .borrow_mut()
                .listeners
                .retain(|listener| listener.id != self.id);
        }
    }
}

#[derive(Clone)]
pub struct StoreContext {
    store: Store,
    id: u64,
}

impl StoreContext {
    pub fn available(&self) -> bool {
        self.store.available()
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.store.inner.borrow().backend.get(key)
    }

    pub fn set_raw(&self, key: &str, raw: &str) -> Result<(), PersistenceError> {
        let (event, handlers) = {
            let mut inner = self.store.inner.borrow_mut();
            let old_value = inner.backend.get(key);
            inner.backend.set(key, raw)?;
            let event = ChangeEvent {
                key: key.to_string(),
                old_value,
                new_value: Some(raw.to_string()),
            };
            (event, inner.handlers_for_others(self.id))
        };

        // Dispatch outside the registry borrow: handlers are free to read
        // or write the store re-entrantly.
        for handler in &handlers {
            handler(&event);
        }
        Ok(())
    }

    /// Remove `key` if present. Absent keys are a no-op and announce
    /// nothing.
    pub fn remove_raw(&self, key: &str) {
        let dispatched = {
            let mut inner = self.store.inner.borrow_mut();
            let old_value = inner.backend.get(key);
            inner.backend.remove(key);
            old_value.map(|old| {
                let event = ChangeEvent {
                    key: key.to_string(),
                    old_value: Some(old),
                    new_value: None,
                };
                (event, inner.handlers_for_others(self.id))
            })
        };

        if let Some((event, handlers)) = dispatched {
            for handler in &handlers {
                handler(&event);
            }
        }
    }

    /// Read and decode `key`, falling back when storage is unavailable, the
    /// key is absent, or the payload is malformed. Total: never errors.
    pub fn get_item<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match safe_parse_json(self.get_raw(key).as_deref()) {
            Parsed::Value(value) => value,
            Parsed::Missing => {
                trace!(key, "no stored value; using fallback");
                fallback
            }
            Parsed::Malformed(err) => {
                warn!(key, error = %err, "malformed stored value; using fallback");
                fallback
            }
        }
    }

    /// Encode and persist `value` under `key`, best effort. Failures are
    /// logged and swallowed: the caller's in-memory state is authoritative
    /// and must not be disturbed by a failed persist.
    pub fn set_item<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, error = %err, "failed to encode value; keeping in-memory state only");
                return;
            }
        };

        match self.set_raw(key, &raw) {
            Ok(()) => {}
            Err(PersistenceError::Unavailable) => {
                debug!(key, "storage unavailable; keeping in-memory state only");
            }
            Err(err) => {
                warn!(key, error = %err, "failed to persist value; keeping in-memory state only");
            }
        }
    }

    pub fn remove_item(&self, key: &str) {
        self.remove_raw(key);
    }

    /// Register a change listener for this context. Events originating from
    /// this same context are never delivered to it.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + 'static,
    {
        let mut inner = self.store.inner.borrow_mut();
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push(Listener {
            id,
            context: self.id,
            handler: Rc::new(handler),
        });
        trace!(context = self.id, listener = id, "registered change listener");
        Subscription {
            inner: Rc::downgrade(&self.store.inner),
            id,
        }
    }
}
