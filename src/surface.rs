//! UI-tree attach surface - the opaque boundary to the host tree.
//!
//! The core never renders; it only attaches, repositions and detaches
//! opaque [`Surface`] values supplied by the host integration. [`TestTree`]
//! is the in-memory implementation used by this crate's tests: an ordered
//! tree that records every connect/move/disconnect event, plus a deferred
//! work queue mirroring hosts that batch style/class application into a
//! later frame.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

// =============================================================================
// Surface trait
// =============================================================================

/// Identifies a position in the host tree. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef(pub u64);

/// Anything that can be attached to the host tree.
///
/// `connect` on an already-connected surface repositions it; hosts must not
/// treat that as a remount. `node` identifies the surface's position, when
/// it has one (an empty outlet has none).
pub trait Surface {
    fn connect(&mut self, parent: &NodeRef, after: Option<&NodeRef>);
    fn disconnect(&mut self);
    fn node(&self) -> Option<NodeRef>;
}

// =============================================================================
// In-memory test tree
// =============================================================================

/// Event recorded by [`TestTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    Connected { node: u64, parent: u64 },
    Moved { node: u64, parent: u64 },
    Disconnected { node: u64 },
}

struct TreeState {
    next_id: u64,
    // parent id -> ordered child ids
    children: IndexMap<u64, Vec<u64>>,
    events: Vec<TreeEvent>,
    deferred: Vec<Box<dyn FnOnce()>>,
}

/// An in-memory ordered tree for tests. Node 0 is the root.
#[derive(Clone)]
pub struct TestTree {
    state: Rc<RefCell<TreeState>>,
}

impl TestTree {
    pub fn new() -> (TestTree, NodeRef) {
        let tree = TestTree {
            state: Rc::new(RefCell::new(TreeState {
                next_id: 1,
                children: IndexMap::new(),
                events: Vec::new(),
                deferred: Vec::new(),
            })),
        };
        (tree, NodeRef(0))
    }

    /// Allocate a fresh node, not yet attached anywhere.
    pub fn node(&self) -> TestNode {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_id;
            state.next_id += 1;
            id
        };
        TestNode {
            tree: self.clone(),
            id,
            parent: Cell::new(None),
        }
    }

    /// Ordered child ids under `parent`.
    pub fn order(&self, parent: &NodeRef) -> Vec<u64> {
        self.state
            .borrow()
            .children
            .get(&parent.0)
            .cloned()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<TreeEvent> {
        self.state.borrow().events.clone()
    }

    pub fn take_events(&self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.state.borrow_mut().events)
    }

    /// Queue host work for a later frame; see [`TestTree::flush_deferred`].
    pub fn defer(&self, work: impl FnOnce() + 'static) {
        self.state.borrow_mut().deferred.push(Box::new(work));
    }

    /// Run all deferred host work. Work scheduled while a component was
    /// connected is expected to re-check connection state itself; the tree
    /// makes no such check.
    pub fn flush_deferred(&self) {
        let work = std::mem::take(&mut self.state.borrow_mut().deferred);
        for item in work {
            item();
        }
    }

    fn insert(&self, parent: u64, node: u64, after: Option<u64>) {
        let mut state = self.state.borrow_mut();
        let siblings = state.children.entry(parent).or_default();
        let position = match after {
            Some(after_id) => siblings
                .iter()
                .position(|&id| id == after_id)
                .map(|i| i + 1)
                .unwrap_or(siblings.len()),
            None => 0,
        };
        siblings.insert(position, node);
    }

    fn remove(&self, parent: u64, node: u64) {
        let mut state = self.state.borrow_mut();
        if let Some(siblings) = state.children.get_mut(&parent) {
            siblings.retain(|&id| id != node);
        }
    }

    fn record(&self, event: TreeEvent) {
        self.state.borrow_mut().events.push(event);
    }
}

/// A node in the [`TestTree`]; implements [`Surface`].
pub struct TestNode {
    tree: TestTree,
    id: u64,
    parent: Cell<Option<u64>>,
}

impl TestNode {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.parent.get().is_some()
    }
}

impl Surface for TestNode {
    fn connect(&mut self, parent: &NodeRef, after: Option<&NodeRef>) {
        let moved = match self.parent.get() {
            Some(old_parent) => {
                self.tree.remove(old_parent, self.id);
                true
            }
            None => false,
        };
        self.tree.insert(parent.0, self.id, after.map(|n| n.0));
        self.parent.set(Some(parent.0));
        if moved {
            self.tree.record(TreeEvent::Moved {
                node: self.id,
                parent: parent.0,
            });
        } else {
            self.tree.record(TreeEvent::Connected {
                node: self.id,
                parent: parent.0,
            });
        }
    }

    fn disconnect(&mut self) {
        if let Some(parent) = self.parent.take() {
            self.tree.remove(parent, self.id);
            self.tree.record(TreeEvent::Disconnected { node: self.id });
        }
    }

    fn node(&self) -> Option<NodeRef> {
        Some(NodeRef(self.id))
    }
}
