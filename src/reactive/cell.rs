//! Reactive cells - the value-holding primitive everything else observes.
//!
//! A cell stores one value and an ordered observer list. [`Writable`] is the
//! handle that may replace the value; [`Readable`] is the read-only handle.
//! Both are cheap `Rc` clones over the same underlying cell.
//!
//! # Observer contract
//!
//! - `observe` replays the current value synchronously at registration, then
//!   fires exactly once per subsequent change, in registration order.
//! - The [`StopHandle`] returned by `observe` detaches that one observer.
//!   Stopping is final: once stopped, the callback never fires again, even
//!   for changes later in the same synchronous turn. Extra `stop` calls are
//!   no-ops.
//! - Notification iterates a snapshot of the observer list and re-checks each
//!   observer's stop flag right before invoking it, so callbacks may register
//!   or stop observers mid-notification without corrupting the set.
//!
//! # Derived cells
//!
//! [`Readable::map`] produces a derived cell that owns exactly one upstream
//! subscription. The subscription (and the strong edge to the source) lives
//! in a guard dropped with the last handle to the derived cell, so a source
//! never retains a derived value beyond the subscription itself.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::scheduler;

// =============================================================================
// Raw cell
// =============================================================================

pub(crate) struct RawCell<T> {
    value: RefCell<T>,
    observers: RefCell<Vec<Observer<T>>>,
    next_id: Cell<u64>,
}

struct Observer<T> {
    id: u64,
    callback: Rc<dyn Fn(&T)>,
    stopped: Rc<Cell<bool>>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Observer {
            id: self.id,
            callback: self.callback.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T: Clone + 'static> RawCell<T> {
    pub(crate) fn new(value: T) -> Self {
        RawCell {
            value: RefCell::new(value),
            observers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    pub(crate) fn get(&self) -> T {
        self.value.borrow().clone()
    }

    pub(crate) fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.value.borrow())
    }

    /// Register an observer. When `replay` is set, the callback is invoked
    /// synchronously with the current value before this returns.
    pub(crate) fn subscribe(
        self: &Rc<Self>,
        callback: Rc<dyn Fn(&T)>,
        replay: bool,
    ) -> StopHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let stopped = Rc::new(Cell::new(false));
        self.observers.borrow_mut().push(Observer {
            id,
            callback: callback.clone(),
            stopped: stopped.clone(),
        });

        // Stopping eagerly removes the entry so a dead subscription does not
        // keep its captured closures (and whatever they own) alive until the
        // next notification prunes it.
        let weak = Rc::downgrade(self);
        let remove: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(cell) = weak.upgrade() {
                cell.observers.borrow_mut().retain(|entry| entry.id != id);
            }
        });

        if replay {
            let value = self.get();
            callback(&value);
        }

        StopHandle { stopped, remove }
    }

    /// Replace the value and notify, inside the current propagation turn.
    pub(crate) fn store(self: &Rc<Self>, value: T) {
        scheduler::run_turn(|| {
            *self.value.borrow_mut() = value;
            self.notify();
        });
    }

    fn notify(self: &Rc<Self>) {
        // Clone the value out so observers may freely borrow or mutate the
        // cell; snapshot the observer list so registration during a callback
        // cannot invalidate the iteration.
        let value = self.get();
        let snapshot: Vec<Observer<T>> = self
            .observers
            .borrow()
            .iter()
            .filter(|entry| !entry.stopped.get())
            .cloned()
            .collect();
        for entry in snapshot {
            if !entry.stopped.get() {
                (entry.callback)(&value);
            }
        }
    }
}

// =============================================================================
// Stop handle
// =============================================================================

/// Token returned by `observe`. Calling [`StopHandle::stop`] detaches the
/// associated observer; after that the callback never fires again. Calling
/// `stop` more than once is a no-op. Dropping the handle does NOT stop the
/// observer.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Rc<Cell<bool>>,
    remove: Rc<dyn Fn()>,
}

impl StopHandle {
    /// Detach the observer. Idempotent.
    pub fn stop(&self) {
        if !self.stopped.replace(true) {
            (self.remove)();
        }
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.get()
    }
}

// =============================================================================
// Subscription guard (derived cells)
// =============================================================================

/// Owns the upstream subscriptions of a derived cell. Dropped with the last
/// handle to the derived cell, which releases every upstream edge.
pub(crate) struct SubscriptionGuard {
    handles: Vec<StopHandle>,
    // Keeps the source cells (and their own guards) alive for as long as the
    // derived cell is held anywhere.
    _upstream: Vec<Box<dyn Any>>,
}

impl SubscriptionGuard {
    pub(crate) fn new(handles: Vec<StopHandle>, upstream: Vec<Box<dyn Any>>) -> Self {
        SubscriptionGuard {
            handles,
            _upstream: upstream,
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.stop();
        }
    }
}

// =============================================================================
// Writable
// =============================================================================

/// A cell whose value may be set directly.
pub struct Writable<T: Clone + 'static> {
    cell: Rc<RawCell<T>>,
}

impl<T: Clone + 'static> Clone for Writable<T> {
    fn clone(&self) -> Self {
        Writable {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone + 'static> Writable<T> {
    pub fn new(value: T) -> Self {
        Writable {
            cell: Rc::new(RawCell::new(value)),
        }
    }

    /// Clone the current value out.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Borrow the current value without cloning.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        self.cell.with(read)
    }

    /// Replace the value and notify observers once. No equality dedup: two
    /// assignments in the same synchronous turn notify twice.
    pub fn set(&self, value: T) {
        self.cell.store(value);
    }

    /// Apply a mutation to a draft of the current value, then store and
    /// notify exactly once with the result. A panicking mutator unwinds
    /// before the store, so observers never see a half-applied draft.
    pub fn update(&self, mutate: impl FnOnce(&mut T)) {
        let mut draft = self.get();
        mutate(&mut draft);
        self.set(draft);
    }

    /// Fallible [`Writable::update`]: on `Err` nothing is stored, no
    /// observer fires, and the error is returned to the caller.
    pub fn try_update<E>(&self, mutate: impl FnOnce(&mut T) -> Result<(), E>) -> Result<(), E> {
        let mut draft = self.get();
        mutate(&mut draft)?;
        self.set(draft);
        Ok(())
    }

    /// Register an observer; replays the current value synchronously.
    pub fn observe(&self, callback: impl Fn(&T) + 'static) -> StopHandle {
        self.cell.subscribe(Rc::new(callback), true)
    }

    /// Derive a read-only cell through `transform`.
    pub fn map<U: Clone + 'static>(&self, transform: impl Fn(&T) -> U + 'static) -> Readable<U> {
        self.readable().map(transform)
    }

    /// A read-only handle to the same cell.
    pub fn readable(&self) -> Readable<T> {
        Readable {
            cell: self.cell.clone(),
            guard: None,
        }
    }

    /// Subscribe without the initial replay.
    pub(crate) fn subscribe_changes(&self, callback: impl Fn(&T) + 'static) -> StopHandle {
        self.cell.subscribe(Rc::new(callback), false)
    }
}

// =============================================================================
// Readable
// =============================================================================

/// A read-only cell handle. Obtained from [`Writable::readable`], from
/// [`Readable::map`], or from [`merge`](super::merge::merge).
pub struct Readable<T: Clone + 'static> {
    cell: Rc<RawCell<T>>,
    guard: Option<Rc<SubscriptionGuard>>,
}

impl<T: Clone + 'static> Clone for Readable<T> {
    fn clone(&self) -> Self {
        Readable {
            cell: self.cell.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<T: Clone + 'static> Readable<T> {
    pub(crate) fn from_parts(cell: Rc<RawCell<T>>, guard: Option<Rc<SubscriptionGuard>>) -> Self {
        Readable { cell, guard }
    }

    /// Clone the current value out.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Borrow the current value without cloning.
    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        self.cell.with(read)
    }

    /// Register an observer; replays the current value synchronously.
    pub fn observe(&self, callback: impl Fn(&T) + 'static) -> StopHandle {
        self.cell.subscribe(Rc::new(callback), true)
    }

    /// Derive a new read-only cell whose value is always
    /// `transform(current)`. Updates propagate from the source's own
    /// notifications; there is no polling.
    pub fn map<U: Clone + 'static>(&self, transform: impl Fn(&T) -> U + 'static) -> Readable<U> {
        let initial = self.with(|value| transform(value));
        let target = Rc::new(RawCell::new(initial));
        let weak = Rc::downgrade(&target);
        let handle = self.cell.subscribe(
            Rc::new(move |value: &T| {
                if let Some(target) = weak.upgrade() {
                    target.store(transform(value));
                }
            }),
            false,
        );
        let guard = SubscriptionGuard::new(vec![handle], vec![Box::new(self.clone())]);
        Readable {
            cell: target,
            guard: Some(Rc::new(guard)),
        }
    }

    /// Subscribe without the initial replay.
    pub(crate) fn subscribe_changes(&self, callback: impl Fn(&T) + 'static) -> StopHandle {
        self.cell.subscribe(Rc::new(callback), false)
    }
}

// =============================================================================
// Tests
// =============================================================================
