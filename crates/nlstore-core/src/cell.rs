use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::storage::{Parsed, safe_parse_json};
use crate::store::{StoreContext, Subscription};

/// A reactive value bound to one storage key.
///
/// Read-through on creation: the initial value is the decoded stored entry,
/// or `default` when storage is unavailable, the key is absent, or the
/// payload is malformed. Write-through on every update: the in-memory value
/// changes first and is then persisted best effort, so the caller always
/// observes its own update even when the persist fails. External changes to
/// the same key (made by other contexts of the same store) are reconciled
/// through the store's change events.
pub struct SyncedCell<T> {
    ctx: StoreContext,
    key: String,
    default: T,
    state: Rc<RefCell<T>>,
    _subscription: Subscription,
}

impl<T> SyncedCell<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    pub fn new(ctx: &StoreContext, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let initial = ctx.get_item(&key, default.clone());
        let state = Rc::new(RefCell::new(initial));

        // The listener holds only a weak reference: once the cell is gone,
        // late events must find nothing to act on.
        let weak_state = Rc::downgrade(&state);
        let bound_key = key.clone();
        let reset_value = default.clone();
        let subscription = ctx.subscribe(move |event| {
            if event.key != bound_key {
                return;
            }
            let Some(state) = weak_state.upgrade() else {
                return;
            };

            match event.new_value.as_deref() {
                // The key was removed out from under us: back to the default.
                None => {
                    debug!(key = %bound_key, "external removal; resetting to default");
                    *state.borrow_mut() = reset_value.clone();
                }
                Some(raw) => match safe_parse_json::<T>(Some(raw)) {
                    Parsed::Value(value) => {
                        trace!(key = %bound_key, "applied external change");
                        *state.borrow_mut() = value;
                    }
                    // A partially written or foreign-schema payload must not
                    // clobber local state, and must not panic out of the
                    // handler either.
                    Parsed::Missing | Parsed::Malformed(_) => {
                        debug!(key = %bound_key, "ignoring malformed external payload");
                    }
                },
            }
        });

        Self {
            ctx: ctx.clone(),
            key,
            default,
            state,
            _subscription: subscription,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> T {
        self.state.borrow().clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.state.borrow())
    }

    pub fn set(&self, value: T) {
        *self.state.borrow_mut() = value.clone();
        self.ctx.set_item(&self.key, &value);
    }

    /// Replace the value with a pure transform of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.state.borrow());
        self.set(next);
    }

    /// Remove the persisted entry and reset the in-memory value to the
    /// default.
    pub fn clear(&self) {
        self.ctx.remove_item(&self.key);
        *self.state.borrow_mut() = self.default.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::SyncedCell;
    use crate::store::Store;

    #[test]
    fn reads_through_on_creation() {
        let store = Store::in_memory();
        let seed = store.context();
        seed.set_raw("k", "[1,2,3]").expect("seed");

        let cell = SyncedCell::new(&store.context(), "k", Vec::<i32>::new());
        assert_eq!(cell.get(), vec![1, 2, 3]);
    }

    #[test]
    fn falls_back_to_default_on_absent_or_malformed_entries() {
        let store = Store::in_memory();
        let ctx = store.context();

        let absent = SyncedCell::new(&ctx, "absent", 7i32);
        assert_eq!(absent.get(), 7);

        ctx.set_raw("broken", "{not json").expect("seed");
        let malformed = SyncedCell::new(&ctx, "broken", 7i32);
        assert_eq!(malformed.get(), 7);
    }

    #[test]
    fn falls_back_to_default_without_storage() {
        let store = Store::ephemeral();
        let cell = SyncedCell::new(&store.context(), "k", vec![1i32]);
        assert_eq!(cell.get(), vec![1]);

        // updates still take effect in memory
        cell.set(vec![2]);
        assert_eq!(cell.get(), vec![2]);
    }

    #[test]
    fn writes_through_on_set_and_update() {
        let store = Store::in_memory();
        let ctx = store.context();
        let cell = SyncedCell::new(&ctx, "k", 0i32);

        cell.set(5);
        assert_eq!(ctx.get_raw("k").as_deref(), Some("5"));

        cell.update(|current| current + 1);
        assert_eq!(cell.get(), 6);
        assert_eq!(ctx.get_raw("k").as_deref(), Some("6"));
    }

    #[test]
    fn applies_external_changes_for_its_own_key() {
        let store = Store::in_memory();
        let cell = SyncedCell::new(&store.context(), "k", Vec::<i32>::new());

        let other = store.context();
        other.set_item("k", &vec![9i32]);
        assert_eq!(cell.get(), vec![9]);
    }

    #[test]
    fn ignores_external_changes_for_other_keys() {
        let store = Store::in_memory();
        let cell = SyncedCell::new(&store.context(), "k", 1i32);

        store.context().set_item("unrelated", &99i32);
        assert_eq!(cell.get(), 1);
    }

    #[test]
    fn ignores_malformed_external_payloads() {
        let store = Store::in_memory();
        let cell = SyncedCell::new(&store.context(), "k", vec![1i32]);

        store.context().set_raw("k", "{definitely not json").expect("raw set");
        assert_eq!(cell.get(), vec![1]);
    }

    #[test]
    fn external_removal_resets_to_default() {
        let store = Store::in_memory();
        let writer = store.context();
        writer.set_item("k", &vec![1i32, 2]);

        let cell = SyncedCell::new(&store.context(), "k", Vec::<i32>::new());
        assert_eq!(cell.get(), vec![1, 2]);

        writer.remove_item("k");
        assert_eq!(cell.get(), Vec::<i32>::new());
    }

    #[test]
    fn own_writes_do_not_loop_back() {
        let store = Store::in_memory();
        let ctx = store.context();
        let a = SyncedCell::new(&ctx, "k", 0i32);
        let b = SyncedCell::new(&ctx, "k", 0i32);

        // Two cells in the same context share a key: the second does not
        // hear about the first's writes (same-context events are skipped).
        a.set(3);
        assert_eq!(a.get(), 3);
        assert_eq!(b.get(), 0);
    }

    #[test]
    fn two_contexts_stay_in_sync_both_ways() {
        let store = Store::in_memory();
        let a = SyncedCell::new(&store.context(), "k", 0i32);
        let b = SyncedCell::new(&store.context(), "k", 0i32);

        a.set(1);
        assert_eq!(b.get(), 1);

        b.set(2);
        assert_eq!(a.get(), 2);
    }

    #[test]
    fn clear_removes_the_entry_and_resets_both_sides() {
        let store = Store::in_memory();
        let ctx = store.context();
        let a = SyncedCell::new(&ctx, "k", 10i32);
        let b = SyncedCell::new(&store.context(), "k", 10i32);

        a.set(42);
        assert_eq!(b.get(), 42);

        a.clear();
        assert_eq!(ctx.get_raw("k"), None);
        assert_eq!(a.get(), 10);
        assert_eq!(b.get(), 10);
    }

    #[test]
    fn dropped_cells_do_not_react_to_late_events() {
        let store = Store::in_memory();
        let cell = SyncedCell::new(&store.context(), "k", 0i32);
        drop(cell);

        // must not panic or act on freed state
        store.context().set_item("k", &1i32);
    }
}
