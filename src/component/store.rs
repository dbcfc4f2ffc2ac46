//! Store registry - shared state published by store components.
//!
//! Stores are keyed by the Rust type of their exports and live in a
//! [`Scope`] chain that mirrors the component tree: the application root
//! owns the outermost scope, and any component may open a child scope for
//! its subtree. Resolution walks innermost-out, so an inner registration
//! shadows an outer one (a warning is emitted on the debug channel when
//! that happens, since it is usually a mistake).
//!
//! Registration and provision are separate steps. A store component
//! registers its slot when its setup begins and provides the exports when
//! setup completes; a consumer that resolves in between gets
//! [`StoreError::NotReady`], which points at registration order rather than
//! a missing store.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::channel::DebugChannel;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store `{name}` is not registered in this scope chain")]
    NotRegistered { name: String },

    #[error(
        "store `{name}` is registered but its setup has not completed; \
         a consumer resolved it too early (check registration order)"
    )]
    NotReady { name: String },
}

// =============================================================================
// Scope
// =============================================================================

struct StoreSlot {
    name: &'static str,
    exports: Option<Rc<dyn Any>>,
}

struct ScopeInner {
    parent: Option<Scope>,
    slots: RefCell<IndexMap<TypeId, StoreSlot>>,
    channel: DebugChannel,
}

/// One level of the store scope chain. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// The application-root scope.
    pub fn app(channel: DebugChannel) -> Scope {
        Scope {
            inner: Rc::new(ScopeInner {
                parent: None,
                slots: RefCell::new(IndexMap::new()),
                channel,
            }),
        }
    }

    /// Open a child scope. Registrations here shadow the parent's for the
    /// subtree that carries this scope.
    pub fn child(&self) -> Scope {
        Scope {
            inner: Rc::new(ScopeInner {
                parent: Some(self.clone()),
                slots: RefCell::new(IndexMap::new()),
                channel: self.inner.channel.clone(),
            }),
        }
    }

    pub fn channel(&self) -> DebugChannel {
        self.inner.channel.clone()
    }

    /// Declare a store slot in this scope, not yet ready. Resolving the key
    /// before [`Scope::provide`] yields [`StoreError::NotReady`].
    pub fn register<S: 'static>(&self, name: &'static str) {
        self.register_dyn(TypeId::of::<S>(), name);
    }

    pub fn register_dyn(&self, key: TypeId, name: &'static str) {
        if let Some(outer) = self.shadowed_name(key) {
            self.inner.channel.warn(format!(
                "store `{name}` shadows `{outer}` registered in an outer scope"
            ));
        }
        self.inner.slots.borrow_mut().insert(
            key,
            StoreSlot {
                name,
                exports: None,
            },
        );
    }

    /// Publish the exports for a store registered in this scope. Registers
    /// the slot implicitly when it was not declared first.
    pub fn provide<S: 'static>(&self, name: &'static str, exports: S) {
        self.provide_dyn(TypeId::of::<S>(), name, Rc::new(exports));
    }

    pub fn provide_dyn(&self, key: TypeId, name: &'static str, exports: Rc<dyn Any>) {
        let mut slots = self.inner.slots.borrow_mut();
        match slots.get_mut(&key) {
            Some(slot) => slot.exports = Some(exports),
            None => {
                drop(slots);
                self.register_dyn(key, name);
                if let Some(slot) = self.inner.slots.borrow_mut().get_mut(&key) {
                    slot.exports = Some(exports);
                }
            }
        }
    }

    /// Remove a store from this scope. Resolution falls through to outer
    /// scopes again afterwards.
    pub fn revoke<S: 'static>(&self) {
        self.revoke_dyn(TypeId::of::<S>());
    }

    pub fn revoke_dyn(&self, key: TypeId) {
        self.inner.slots.borrow_mut().shift_remove(&key);
    }

    /// Resolve a store's exports, walking this scope then its ancestors.
    pub fn resolve<S: 'static>(&self) -> Result<Rc<S>, StoreError> {
        let exports = self.resolve_dyn(TypeId::of::<S>())?;
        exports
            .downcast::<S>()
            .map_err(|_| StoreError::NotRegistered {
                name: std::any::type_name::<S>().to_string(),
            })
    }

    pub fn resolve_dyn(&self, key: TypeId) -> Result<Rc<dyn Any>, StoreError> {
        let mut scope = Some(self.clone());
        while let Some(current) = scope {
            let slots = current.inner.slots.borrow();
            if let Some(slot) = slots.get(&key) {
                return match &slot.exports {
                    Some(exports) => Ok(exports.clone()),
                    None => Err(StoreError::NotReady {
                        name: slot.name.to_string(),
                    }),
                };
            }
            drop(slots);
            scope = current.inner.parent.clone();
        }
        Err(StoreError::NotRegistered {
            name: format!("{key:?}"),
        })
    }

    fn shadowed_name(&self, key: TypeId) -> Option<&'static str> {
        let mut scope = self.inner.parent.clone();
        while let Some(current) = scope {
            if let Some(slot) = current.inner.slots.borrow().get(&key) {
                return Some(slot.name);
            }
            scope = current.inner.parent.clone();
        }
        None
    }
}

// =============================================================================
// Tests
// =============================================================================
