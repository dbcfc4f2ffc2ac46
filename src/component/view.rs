//! Typed component wrappers.
//!
//! [`View`] and [`Store`] are thin declarations over [`ComponentCore`]:
//! they pin down what kind of [`SetupResult`] the setup function is
//! allowed to produce, and for stores, declare the export slot before
//! setup runs so early consumers see "not ready" instead of "not
//! registered".

use std::any::TypeId;
use std::marker::PhantomData;

use crate::channel::CrashError;
use crate::component::context::{
    Component, ComponentCore, Context, LifecycleState, SetupResult,
};
use crate::component::inputs::Inputs;
use crate::component::store::Scope;
use crate::surface::NodeRef;

/// A view component: its setup produces markup. Returning store exports
/// instead is a crash, not a silent acceptance.
#[derive(Clone)]
pub struct View {
    core: ComponentCore,
}

impl View {
    pub fn new(
        name: &'static str,
        scope: Scope,
        inputs: Inputs,
        setup: impl Fn(&Context) -> Result<SetupResult, CrashError> + 'static,
    ) -> View {
        let core = ComponentCore::new(name, scope, inputs, setup);
        core.expect_view();
        View { core }
    }

    pub fn core(&self) -> ComponentCore {
        self.core.clone()
    }
}

impl Component for View {
    fn connect(&self, parent: &NodeRef, after: Option<&NodeRef>) {
        self.core.connect(parent, after);
    }

    fn disconnect(&self) {
        self.core.disconnect();
    }

    fn set_children(&self, children: Vec<ComponentCore>) {
        self.core.set_children(children);
    }

    fn state(&self) -> LifecycleState {
        self.core.state()
    }

    fn node(&self) -> Option<NodeRef> {
        self.core.node()
    }
}

/// A store component exporting `S`. The slot registers when setup begins
/// and the exports publish when it completes; disconnecting revokes them.
#[derive(Clone)]
pub struct Store<S: 'static> {
    core: ComponentCore,
    _marker: PhantomData<S>,
}

impl<S: 'static> Store<S> {
    pub fn new(
        name: &'static str,
        scope: Scope,
        inputs: Inputs,
        setup: impl Fn(&Context) -> Result<SetupResult, CrashError> + 'static,
    ) -> Store<S> {
        let core = ComponentCore::new(name, scope, inputs, setup);
        core.expect_store(TypeId::of::<S>(), name);
        Store {
            core,
            _marker: PhantomData,
        }
    }

    pub fn core(&self) -> ComponentCore {
        self.core.clone()
    }
}

impl<S: 'static> Component for Store<S> {
    fn connect(&self, parent: &NodeRef, after: Option<&NodeRef>) {
        self.core.connect(parent, after);
    }

    fn disconnect(&self) {
        self.core.disconnect();
    }

    fn set_children(&self, children: Vec<ComponentCore>) {
        self.core.set_children(children);
    }

    fn state(&self) -> LifecycleState {
        self.core.state()
    }

    fn node(&self) -> Option<NodeRef> {
        self.core.node()
    }
}
