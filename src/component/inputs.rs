//! Inputs binding - the bridge between a caller's values and a component.
//!
//! Inputs are supplied per instantiation as a name-keyed table. Each slot is
//! classified at insertion by what the caller handed over:
//!
//! - a plain value -> static slot
//! - a [`Readable`] -> read-only bound slot (upstream changes flow in,
//!   writes are an error)
//! - a [`Writable`] -> writable bound slot (changes flow both ways)
//!
//! [`InputSource`] is the classification enum; `From` conversions let call
//! sites pass values, readables and writables interchangeably.
//!
//! The whole table is also exposed as one derived artifact: the unified
//! [`InputsSnapshot`] cell, updated once per upstream change event and once
//! per `set`/`set_many` call no matter how many keys changed. Values are
//! type-erased (`Rc<dyn Any>`) in the snapshot; typed access goes through
//! [`Inputs::get`] and per-input [`InputBinding`] facades that proxy every
//! read and write through the parent table, so all views of one input stay
//! consistent.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::reactive::{Readable, StopHandle, Writable};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown input `{name}`")]
    Unknown { name: String },

    #[error("input `{name}` was supplied as a read-only binding and cannot be written")]
    ReadOnly { name: String },

    #[error("input `{name}` holds a different type than requested")]
    TypeMismatch { name: String },
}

// =============================================================================
// Classification
// =============================================================================

/// How an input was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Static,
    ReadableBound,
    WritableBound,
}

/// A value supplied for one input: static, read-only reactive, or writable
/// reactive. Mirrors the shape a caller hands over; `From` conversions keep
/// call sites terse.
pub enum InputSource<T: Clone + PartialEq + 'static> {
    Static(T),
    Readable(Readable<T>),
    Writable(Writable<T>),
}

impl<T: Clone + PartialEq + 'static> From<T> for InputSource<T> {
    fn from(value: T) -> Self {
        InputSource::Static(value)
    }
}

impl<T: Clone + PartialEq + 'static> From<Readable<T>> for InputSource<T> {
    fn from(cell: Readable<T>) -> Self {
        InputSource::Readable(cell)
    }
}

impl<T: Clone + PartialEq + 'static> From<Writable<T>> for InputSource<T> {
    fn from(cell: Writable<T>) -> Self {
        InputSource::Writable(cell)
    }
}

// =============================================================================
// Slots
// =============================================================================

// Per-slot closures capture the concrete type once, at insertion; the rest
// of the module works type-erased.
struct Slot {
    kind: InputKind,
    current: Rc<dyn Any>,
    eq: Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>,
    accepts: Rc<dyn Fn(&dyn Any) -> bool>,
    pull: Option<Rc<dyn Fn() -> Rc<dyn Any>>>,
    subscribe: Option<Rc<dyn Fn(Rc<dyn Fn(Rc<dyn Any>)>) -> StopHandle>>,
    write_back: Option<Rc<dyn Fn(&dyn Any) -> bool>>,
}

/// The unified inputs record: name -> current (type-erased) value, in
/// declaration order.
pub type InputsSnapshot = IndexMap<&'static str, Rc<dyn Any>>;

// =============================================================================
// Builder
// =============================================================================

/// Builds the inputs table for one component instantiation.
#[derive(Default)]
pub struct InputsBuilder {
    slots: IndexMap<&'static str, Slot>,
}

impl InputsBuilder {
    pub fn new() -> Self {
        InputsBuilder::default()
    }

    /// Declare one input. Accepts a plain value, a `Readable` or a
    /// `Writable`; the slot is classified accordingly.
    pub fn with<T: Clone + PartialEq + 'static>(
        mut self,
        name: &'static str,
        source: impl Into<InputSource<T>>,
    ) -> Self {
        let eq: Rc<dyn Fn(&dyn Any, &dyn Any) -> bool> = Rc::new(|a, b| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        });
        let accepts: Rc<dyn Fn(&dyn Any) -> bool> = Rc::new(|value| value.is::<T>());

        let slot = match source.into() {
            InputSource::Static(value) => Slot {
                kind: InputKind::Static,
                current: Rc::new(value),
                eq,
                accepts,
                pull: None,
                subscribe: None,
                write_back: None,
            },
            InputSource::Readable(cell) => {
                let current: Rc<dyn Any> = Rc::new(cell.get());
                let pull = {
                    let cell = cell.clone();
                    Rc::new(move || Rc::new(cell.get()) as Rc<dyn Any>)
                };
                let subscribe = Rc::new(move |sink: Rc<dyn Fn(Rc<dyn Any>)>| {
                    cell.subscribe_changes(move |value: &T| sink(Rc::new(value.clone())))
                });
                Slot {
                    kind: InputKind::ReadableBound,
                    current,
                    eq,
                    accepts,
                    pull: Some(pull),
                    subscribe: Some(subscribe),
                    write_back: None,
                }
            }
            InputSource::Writable(cell) => {
                let current: Rc<dyn Any> = Rc::new(cell.get());
                let pull = {
                    let cell = cell.clone();
                    Rc::new(move || Rc::new(cell.get()) as Rc<dyn Any>)
                };
                let subscribe = {
                    let cell = cell.clone();
                    Rc::new(move |sink: Rc<dyn Fn(Rc<dyn Any>)>| {
                        cell.subscribe_changes(move |value: &T| sink(Rc::new(value.clone())))
                    })
                };
                let write_back: Rc<dyn Fn(&dyn Any) -> bool> =
                    Rc::new(move |value| match value.downcast_ref::<T>() {
                        Some(value) => {
                            cell.set(value.clone());
                            true
                        }
                        None => false,
                    });
                Slot {
                    kind: InputKind::WritableBound,
                    current,
                    eq,
                    accepts,
                    pull: Some(pull),
                    subscribe: Some(subscribe),
                    write_back: Some(write_back),
                }
            }
        };
        self.slots.insert(name, slot);
        self
    }

    pub fn with_static<T: Clone + PartialEq + 'static>(
        self,
        name: &'static str,
        value: T,
    ) -> Self {
        self.with(name, InputSource::Static(value))
    }

    pub fn with_readable<T: Clone + PartialEq + 'static>(
        self,
        name: &'static str,
        cell: Readable<T>,
    ) -> Self {
        self.with(name, InputSource::Readable(cell))
    }

    pub fn with_writable<T: Clone + PartialEq + 'static>(
        self,
        name: &'static str,
        cell: Writable<T>,
    ) -> Self {
        self.with(name, InputSource::Writable(cell))
    }

    pub fn build(self) -> Inputs {
        let snapshot: InputsSnapshot = self
            .slots
            .iter()
            .map(|(name, slot)| (*name, slot.current.clone()))
            .collect();
        Inputs {
            inner: Rc::new(InputsInner {
                slots: RefCell::new(self.slots),
                record: Writable::new(snapshot),
                connected: Cell::new(false),
                muted: Cell::new(false),
                stops: RefCell::new(Vec::new()),
            }),
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

struct InputsInner {
    slots: RefCell<IndexMap<&'static str, Slot>>,
    record: Writable<InputsSnapshot>,
    connected: Cell<bool>,
    // Suppresses the forwarding observers while set() writes back to the
    // underlying writables, so one set produces one record notification.
    muted: Cell<bool>,
    stops: RefCell<Vec<StopHandle>>,
}

/// The inputs table of one component instance. Cheap to clone.
#[derive(Clone)]
pub struct Inputs {
    inner: Rc<InputsInner>,
}

impl Inputs {
    /// An empty table, for components without inputs.
    pub fn none() -> Inputs {
        InputsBuilder::new().build()
    }

    /// Begin forwarding upstream changes into the unified record.
    /// Idempotent: calling while already connected is a no-op. One snapshot
    /// refresh runs after subscribing, so reconnection observes values that
    /// changed while disconnected.
    pub fn connect(&self) {
        if self.inner.connected.replace(true) {
            return;
        }

        let subscribers: Vec<(&'static str, Rc<dyn Fn(Rc<dyn Fn(Rc<dyn Any>)>) -> StopHandle>)> = self
            .inner
            .slots
            .borrow()
            .iter()
            .filter_map(|(name, slot)| slot.subscribe.clone().map(|s| (*name, s)))
            .collect();

        for (name, subscribe) in subscribers {
            let weak = Rc::downgrade(&self.inner);
            let sink: Rc<dyn Fn(Rc<dyn Any>)> = Rc::new(move |value| {
                let Some(inner) = weak.upgrade() else { return };
                if inner.muted.get() {
                    return;
                }
                if let Some(slot) = inner.slots.borrow_mut().get_mut(name) {
                    slot.current = value;
                }
                let snapshot = rebuild(&inner);
                inner.record.set(snapshot);
            });
            let stop = subscribe(sink);
            self.inner.stops.borrow_mut().push(stop);
        }

        // Upstream sources may have moved while we were not listening.
        {
            let mut slots = self.inner.slots.borrow_mut();
            for slot in slots.values_mut() {
                if let Some(pull) = &slot.pull {
                    slot.current = pull();
                }
            }
        }
        let snapshot = rebuild(&self.inner);
        self.inner.record.set(snapshot);
    }

    /// Stop all forwarding; the unified record freezes even if upstream
    /// sources keep changing.
    pub fn disconnect(&self) {
        if !self.inner.connected.replace(false) {
            return;
        }
        for stop in self.inner.stops.borrow_mut().drain(..) {
            stop.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    /// Typed read of one input's current value.
    pub fn get<T: Clone + 'static>(&self, name: &str) -> Result<T, InputError> {
        let slots = self.inner.slots.borrow();
        let slot = slots.get(name).ok_or_else(|| InputError::Unknown {
            name: name.to_string(),
        })?;
        slot.current
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| InputError::TypeMismatch {
                name: name.to_string(),
            })
    }

    /// How the named input was supplied.
    pub fn kind(&self, name: &str) -> Result<InputKind, InputError> {
        let slots = self.inner.slots.borrow();
        slots
            .get(name)
            .map(|slot| slot.kind)
            .ok_or_else(|| InputError::Unknown {
                name: name.to_string(),
            })
    }

    /// Set one input. See [`Inputs::set_many`] for the semantics.
    pub fn set<T: Clone + PartialEq + 'static>(
        &self,
        name: &str,
        value: T,
    ) -> Result<(), InputError> {
        self.set_many([(name, Rc::new(value) as Rc<dyn Any>)])
    }

    /// Set several inputs at once. Per key: deep-compare against the current
    /// value and skip when unchanged; writing a genuinely changed value to a
    /// read-only binding is an error; writable bindings are written through;
    /// static slots just update. Validation runs before any write, so an
    /// error leaves every slot untouched. All changed keys land in a single
    /// record notification.
    pub fn set_many<'a>(
        &self,
        entries: impl IntoIterator<Item = (&'a str, Rc<dyn Any>)>,
    ) -> Result<(), InputError> {
        let mut changed: Vec<(&'static str, Rc<dyn Any>)> = Vec::new();
        {
            let slots = self.inner.slots.borrow();
            for (name, value) in entries {
                let Some((_, key, slot)) = slots.get_full(name) else {
                    return Err(InputError::Unknown {
                        name: name.to_string(),
                    });
                };
                if !(slot.accepts)(value.as_ref()) {
                    return Err(InputError::TypeMismatch {
                        name: name.to_string(),
                    });
                }
                if (slot.eq)(slot.current.as_ref(), value.as_ref()) {
                    continue;
                }
                if slot.kind == InputKind::ReadableBound {
                    return Err(InputError::ReadOnly {
                        name: name.to_string(),
                    });
                }
                changed.push((key, value));
            }
        }
        if changed.is_empty() {
            return Ok(());
        }

        let mut write_backs: Vec<(Rc<dyn Fn(&dyn Any) -> bool>, Rc<dyn Any>)> = Vec::new();
        {
            let mut slots = self.inner.slots.borrow_mut();
            for (name, value) in &changed {
                if let Some(slot) = slots.get_mut(name) {
                    slot.current = value.clone();
                    if let Some(write_back) = &slot.write_back {
                        write_backs.push((write_back.clone(), value.clone()));
                    }
                }
            }
        }

        // Write through to the caller's cells with forwarding muted; their
        // own observers still fire, but the record updates exactly once,
        // below.
        self.inner.muted.set(true);
        for (write_back, value) in write_backs {
            write_back(value.as_ref());
        }
        self.inner.muted.set(false);

        // Caller observers may have cascaded into other bound cells during
        // the muted window; re-pull every bound slot so the record reflects
        // them in the same combined change.
        if self.inner.connected.get() {
            let mut slots = self.inner.slots.borrow_mut();
            for slot in slots.values_mut() {
                if let Some(pull) = &slot.pull {
                    slot.current = pull();
                }
            }
        }

        let snapshot = rebuild(&self.inner);
        self.inner.record.set(snapshot);
        Ok(())
    }

    /// The unified record as a readable cell.
    pub fn record(&self) -> Readable<InputsSnapshot> {
        self.inner.record.readable()
    }

    /// The current snapshot.
    pub fn current(&self) -> InputsSnapshot {
        self.inner.record.get()
    }

    /// A typed read/write facade over one input. All reads and writes proxy
    /// through this table; the facade holds no state of its own.
    pub fn binding<T: Clone + PartialEq + 'static>(
        &self,
        name: &'static str,
    ) -> Result<InputBinding<T>, InputError> {
        // Validate name and type up front.
        self.get::<T>(name)?;
        Ok(InputBinding {
            name,
            inputs: self.clone(),
            _marker: PhantomData,
        })
    }
}

fn rebuild(inner: &Rc<InputsInner>) -> InputsSnapshot {
    inner
        .slots
        .borrow()
        .iter()
        .map(|(name, slot)| (*name, slot.current.clone()))
        .collect()
}

// =============================================================================
// Per-input facade
// =============================================================================

/// Read/write view of a single input, proxying through the parent
/// [`Inputs`].
#[derive(Clone)]
pub struct InputBinding<T: Clone + PartialEq + 'static> {
    name: &'static str,
    inputs: Inputs,
    _marker: PhantomData<T>,
}

impl<T: Clone + PartialEq + 'static> InputBinding<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> Result<T, InputError> {
        self.inputs.get(self.name)
    }

    pub fn set(&self, value: T) -> Result<(), InputError> {
        self.inputs.set(self.name, value)
    }

    /// Observe this input through the unified record, deduplicated so the
    /// callback fires on registration and then only when this input's value
    /// actually changes.
    pub fn observe(&self, callback: impl Fn(&T) + 'static) -> StopHandle {
        let name = self.name;
        let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        self.inputs.record().observe(move |snapshot| {
            let Some(value) = snapshot.get(name).and_then(|v| v.downcast_ref::<T>()) else {
                return;
            };
            let changed = last.borrow().as_ref() != Some(value);
            if changed {
                *last.borrow_mut() = Some(value.clone());
                callback(value);
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
