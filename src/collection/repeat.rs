//! Keyed collection renderer.
//!
//! [`Repeat`] observes a `Readable<Vec<T>>` and keeps one child component
//! mounted per distinct key. Identity is the key, not the position:
//! surviving keys get their new value and index pushed into per-item
//! writables and are repositioned, never remounted. Vanished keys
//! disconnect; fresh keys mount over fresh per-item cells. A key change
//! with an identical value is delete-plus-create.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::channel::DebugChannel;
use crate::component::{Component, ComponentCore};
use crate::reactive::{Readable, StopHandle, Writable};
use crate::surface::NodeRef;

struct MountedChild<T: Clone + 'static> {
    value: Writable<T>,
    index: Writable<usize>,
    core: ComponentCore,
}

struct RepeatInner<T: Clone + 'static, K: Clone + Eq + Hash + Debug + 'static> {
    items: Readable<Vec<T>>,
    key_fn: Box<dyn Fn(&T) -> K>,
    make_child: Box<dyn Fn(Readable<T>, Readable<usize>) -> ComponentCore>,
    mounted: RefCell<IndexMap<K, MountedChild<T>>>,
    position: RefCell<Option<(NodeRef, Option<NodeRef>)>>,
    connected: Cell<bool>,
    stop: RefCell<Option<StopHandle>>,
    channel: DebugChannel,
}

/// Renders one child per keyed item of a reactive list.
pub struct Repeat<T: Clone + 'static, K: Clone + Eq + Hash + Debug + 'static> {
    inner: Rc<RepeatInner<T, K>>,
}

impl<T: Clone + 'static, K: Clone + Eq + Hash + Debug + 'static> Clone for Repeat<T, K> {
    fn clone(&self) -> Self {
        Repeat {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static, K: Clone + Eq + Hash + Debug + 'static> Repeat<T, K> {
    pub fn new(
        channel: DebugChannel,
        items: Readable<Vec<T>>,
        key_fn: impl Fn(&T) -> K + 'static,
        make_child: impl Fn(Readable<T>, Readable<usize>) -> ComponentCore + 'static,
    ) -> Repeat<T, K> {
        Repeat {
            inner: Rc::new(RepeatInner {
                items,
                key_fn: Box::new(key_fn),
                make_child: Box::new(make_child),
                mounted: RefCell::new(IndexMap::new()),
                position: RefCell::new(None),
                connected: Cell::new(false),
                stop: RefCell::new(None),
                channel,
            }),
        }
    }

    /// Mount at `parent`, start observing the items cell. Children connect
    /// in snapshot order after `after`.
    pub fn connect(&self, parent: &NodeRef, after: Option<&NodeRef>) {
        *self.inner.position.borrow_mut() = Some((parent.clone(), after.cloned()));
        if self.inner.connected.replace(true) {
            self.sync(&self.inner.items.get());
            return;
        }

        self.sync(&self.inner.items.get());

        let weak = Rc::downgrade(&self.inner);
        let stop = self.inner.items.subscribe_changes(move |snapshot: &Vec<T>| {
            if let Some(inner) = weak.upgrade() {
                Repeat { inner }.sync(snapshot);
            }
        });
        *self.inner.stop.borrow_mut() = Some(stop);
    }

    /// Disconnect every child and stop observing the items cell. Children
    /// stay mounted in the map; reconnecting remounts them.
    pub fn disconnect(&self) {
        if !self.inner.connected.replace(false) {
            return;
        }
        if let Some(stop) = self.inner.stop.borrow_mut().take() {
            stop.stop();
        }
        let mounted = self.inner.mounted.borrow();
        for child in mounted.values() {
            child.core.disconnect();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    pub fn len(&self) -> usize {
        self.inner.mounted.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.mounted.borrow().is_empty()
    }

    /// The node of the last mounted child, for anchoring siblings after
    /// the whole collection.
    pub fn node(&self) -> Option<NodeRef> {
        self.inner
            .mounted
            .borrow()
            .values()
            .rev()
            .find_map(|child| child.core.node())
    }

    fn sync(&self, snapshot: &[T]) {
        // Keyed entries in snapshot order; later duplicates are skipped.
        let mut entries: IndexMap<K, T> = IndexMap::with_capacity(snapshot.len());
        for item in snapshot {
            let key = (self.inner.key_fn)(item);
            if entries.contains_key(&key) {
                self.inner
                    .channel
                    .warn(format!("duplicate key {key:?} in keyed collection, skipping"));
                continue;
            }
            entries.insert(key, item.clone());
        }

        // Move the map out so child lifecycle calls run without a borrow.
        let mut old = std::mem::take(&mut *self.inner.mounted.borrow_mut());

        for (key, child) in &old {
            if !entries.contains_key(key) {
                child.core.disconnect();
            }
        }

        let mut next: IndexMap<K, MountedChild<T>> = IndexMap::with_capacity(entries.len());
        for (index, (key, value)) in entries.into_iter().enumerate() {
            match old.shift_remove(&key) {
                Some(child) => {
                    // Survivor: push the new value and index, no remount.
                    child.value.set(value);
                    child.index.set(index);
                    next.insert(key, child);
                }
                None => {
                    let value_cell = Writable::new(value);
                    let index_cell = Writable::new(index);
                    let core =
                        (self.inner.make_child)(value_cell.readable(), index_cell.readable());
                    next.insert(
                        key,
                        MountedChild {
                            value: value_cell,
                            index: index_cell,
                            core,
                        },
                    );
                }
            }
        }

        if self.inner.connected.get() {
            if let Some((parent, after)) = self.inner.position.borrow().clone() {
                let mut anchor = after;
                for child in next.values() {
                    child.core.connect(&parent, anchor.as_ref());
                    anchor = child.core.node().or(anchor);
                }
            }
        }

        *self.inner.mounted.borrow_mut() = next;
    }
}
