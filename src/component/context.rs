//! Component lifecycle - the core state machine and the setup context.
//!
//! Every component kind (view, store, repeat item) composes one
//! [`ComponentCore`]: a single capability set of `connect`, `disconnect`,
//! `set_children` and state query. There is no inheritance chain and no
//! thread-local "current component" - setup receives its [`Context`]
//! explicitly and every hook is a method on it.
//!
//! Lifecycle: `Unconnected -> Initializing -> Connected -> Disconnected`,
//! and from `Disconnected` back to `Initializing` on reconnect. Setup runs
//! exactly once per connection; `connect` on an already-connected instance
//! only repositions the output. Deferred setup is modeled as
//! [`SetupResult::Pending`] plus a [`SetupGate`] that completes (or
//! rejects) the transition later - the gate carries the connection epoch,
//! so a gate outliving a disconnect resolves into nothing.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::channel::{CrashError, CrashReport, DebugChannel};
use crate::component::inputs::Inputs;
use crate::component::store::{Scope, StoreError};
use crate::reactive::{Readable, StopHandle};
use crate::surface::{NodeRef, Surface};

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unconnected,
    Initializing,
    Connected,
    Disconnected,
}

/// What a setup function produces. Explicitly tagged - the core never
/// inspects the shape of a value to guess what kind of component it is.
pub enum SetupResult {
    /// A view: markup to attach to the host tree.
    View { output: Box<dyn Surface> },
    /// A store: exports to publish into the component's scope.
    Store {
        key: TypeId,
        name: &'static str,
        exports: Rc<dyn std::any::Any>,
    },
    /// Setup is not finished; attach the placeholder (if any) and wait for
    /// the [`SetupGate`].
    Pending {
        placeholder: Option<Box<dyn Surface>>,
    },
}

impl SetupResult {
    pub fn view(output: impl Surface + 'static) -> SetupResult {
        SetupResult::View {
            output: Box::new(output),
        }
    }

    pub fn store<S: 'static>(name: &'static str, exports: S) -> SetupResult {
        SetupResult::Store {
            key: TypeId::of::<S>(),
            name,
            exports: Rc::new(exports),
        }
    }

    pub fn pending(placeholder: Option<Box<dyn Surface>>) -> SetupResult {
        SetupResult::Pending { placeholder }
    }
}

/// Kind enforcement for the typed wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExpectedKind {
    View,
    Store,
}

type SetupFn = dyn Fn(&Context) -> Result<SetupResult, CrashError>;

// =============================================================================
// Core
// =============================================================================

struct CoreInner {
    name: &'static str,
    setup: Rc<SetupFn>,
    inputs: Inputs,
    scope: Scope,
    channel: DebugChannel,

    state: Cell<LifecycleState>,
    // Bumped on every connect and disconnect; stale setup gates compare
    // against it and resolve into nothing.
    epoch: Cell<u64>,
    position: RefCell<Option<(NodeRef, Option<NodeRef>)>>,

    output: RefCell<Option<Box<dyn Surface>>>,
    output_is_placeholder: Cell<bool>,
    outlet: Outlet,

    queued_observers: RefCell<Vec<Box<dyn FnOnce() -> StopHandle>>>,
    active_stops: RefCell<Vec<StopHandle>>,
    on_connect: RefCell<Vec<Box<dyn FnOnce()>>>,
    on_disconnect: RefCell<Vec<Box<dyn FnOnce()>>>,

    expected: Cell<Option<ExpectedKind>>,
    // Store components declare their slot before setup runs, so consumers
    // that resolve too early see NotReady instead of NotRegistered.
    store_slot: Cell<Option<(TypeId, &'static str)>>,
    provided_store: Cell<Option<TypeId>>,
}

/// The component capability set. Cheap to clone; clones share the instance.
#[derive(Clone)]
pub struct ComponentCore {
    inner: Rc<CoreInner>,
}

/// The minimal component interface, implemented by [`ComponentCore`] and
/// the typed wrappers.
pub trait Component {
    fn connect(&self, parent: &NodeRef, after: Option<&NodeRef>);
    fn disconnect(&self);
    fn set_children(&self, children: Vec<ComponentCore>);
    fn state(&self) -> LifecycleState;
    fn node(&self) -> Option<NodeRef>;
}

impl ComponentCore {
    pub fn new(
        name: &'static str,
        scope: Scope,
        inputs: Inputs,
        setup: impl Fn(&Context) -> Result<SetupResult, CrashError> + 'static,
    ) -> ComponentCore {
        let channel = scope.channel();
        ComponentCore {
            inner: Rc::new(CoreInner {
                name,
                setup: Rc::new(setup),
                inputs,
                scope,
                channel,
                state: Cell::new(LifecycleState::Unconnected),
                epoch: Cell::new(0),
                position: RefCell::new(None),
                output: RefCell::new(None),
                output_is_placeholder: Cell::new(false),
                outlet: Outlet::new(),
                queued_observers: RefCell::new(Vec::new()),
                active_stops: RefCell::new(Vec::new()),
                on_connect: RefCell::new(Vec::new()),
                on_disconnect: RefCell::new(Vec::new()),
                expected: Cell::new(None),
                store_slot: Cell::new(None),
                provided_store: Cell::new(None),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn inputs(&self) -> Inputs {
        self.inner.inputs.clone()
    }

    pub fn scope(&self) -> Scope {
        self.inner.scope.clone()
    }

    pub(crate) fn expect_view(&self) {
        self.inner.expected.set(Some(ExpectedKind::View));
    }

    pub(crate) fn expect_store(&self, key: TypeId, name: &'static str) {
        self.inner.expected.set(Some(ExpectedKind::Store));
        self.inner.store_slot.set(Some((key, name)));
    }

    fn reposition(&self, parent: &NodeRef, after: Option<&NodeRef>) {
        *self.inner.position.borrow_mut() = Some((parent.clone(), after.cloned()));
        if let Some(output) = self.inner.output.borrow_mut().as_mut() {
            output.connect(parent, after);
        }
    }

    fn complete(&self, result: SetupResult) {
        match result {
            SetupResult::Pending { placeholder } => {
                if let Some(mut placeholder) = placeholder {
                    if let Some((parent, after)) = self.inner.position.borrow().clone() {
                        placeholder.connect(&parent, after.as_ref());
                    }
                    *self.inner.output.borrow_mut() = Some(placeholder);
                    self.inner.output_is_placeholder.set(true);
                }
                // Still Initializing; the gate finishes the transition.
            }
            SetupResult::View { mut output } => {
                if self.inner.expected.get() == Some(ExpectedKind::Store) {
                    self.crash_out(CrashError::setup("store setup returned view output"));
                    return;
                }
                self.detach_output();
                if let Some((parent, after)) = self.inner.position.borrow().clone() {
                    output.connect(&parent, after.as_ref());
                }
                *self.inner.output.borrow_mut() = Some(output);
                self.inner.output_is_placeholder.set(false);
                self.finish_connect();
            }
            SetupResult::Store { key, name, exports } => {
                if self.inner.expected.get() == Some(ExpectedKind::View) {
                    self.crash_out(CrashError::setup("view setup returned store exports"));
                    return;
                }
                self.detach_output();
                self.inner.scope.provide_dyn(key, name, exports);
                self.inner.provided_store.set(Some(key));
                self.finish_connect();
            }
        }
    }

    fn finish_connect(&self) {
        self.inner.inputs.connect();

        // Queued observers start (and replay) before the instance is marked
        // connected; replay callbacks may queue further observers, so keep
        // draining until none remain.
        loop {
            let queued: Vec<_> = self.inner.queued_observers.borrow_mut().drain(..).collect();
            if queued.is_empty() {
                break;
            }
            for start in queued {
                let stop = start();
                self.inner.active_stops.borrow_mut().push(stop);
            }
        }
        self.inner.state.set(LifecycleState::Connected);

        // Children mount under the output by default; setup may have placed
        // the outlet elsewhere in its own markup already.
        if !self.inner.outlet.is_placed() {
            if let Some(node) = self.node() {
                self.inner.outlet.place(&node, None);
            }
        }

        let callbacks: Vec<_> = self.inner.on_connect.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }
    }

    fn crash_out(&self, error: CrashError) {
        self.inner.channel.crash(&CrashReport {
            component: self.inner.name.to_string(),
            error,
        });
        self.teardown();
    }

    /// Shared teardown path: used by `disconnect`, pending cancellation and
    /// crashed setup. Safe on a half-initialized instance.
    fn teardown(&self) {
        self.inner.epoch.set(self.inner.epoch.get() + 1);

        let callbacks: Vec<_> = self.inner.on_disconnect.borrow_mut().drain(..).collect();
        for callback in callbacks {
            callback();
        }

        for stop in self.inner.active_stops.borrow_mut().drain(..) {
            stop.stop();
        }
        self.inner.queued_observers.borrow_mut().clear();
        self.inner.on_connect.borrow_mut().clear();

        self.inner.inputs.disconnect();
        self.inner.outlet.clear_placement();
        self.detach_output();

        if let Some(key) = self.inner.provided_store.take() {
            self.inner.scope.revoke_dyn(key);
        }

        self.inner.state.set(LifecycleState::Disconnected);
    }

    fn detach_output(&self) {
        if let Some(mut output) = self.inner.output.borrow_mut().take() {
            output.disconnect();
        }
        self.inner.output_is_placeholder.set(false);
    }
}

impl Component for ComponentCore {
    fn connect(&self, parent: &NodeRef, after: Option<&NodeRef>) {
        match self.inner.state.get() {
            LifecycleState::Connected => {
                // Reposition only: no callbacks, no setup re-run.
                self.reposition(parent, after);
                return;
            }
            LifecycleState::Initializing => {
                // Setup is pending; just track the new position.
                self.reposition(parent, after);
                return;
            }
            LifecycleState::Unconnected | LifecycleState::Disconnected => {}
        }

        self.inner.state.set(LifecycleState::Initializing);
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        *self.inner.position.borrow_mut() = Some((parent.clone(), after.cloned()));

        if let Some((key, name)) = self.inner.store_slot.get() {
            self.inner.scope.register_dyn(key, name);
        }

        let context = Context {
            core: self.inner.clone(),
        };
        match (self.inner.setup.clone())(&context) {
            Ok(result) => self.complete(result),
            Err(error) => self.crash_out(error),
        }
    }

    fn disconnect(&self) {
        match self.inner.state.get() {
            LifecycleState::Connected => self.teardown(),
            // Cancels a pending setup; the outstanding gate becomes stale.
            LifecycleState::Initializing => self.teardown(),
            LifecycleState::Unconnected | LifecycleState::Disconnected => {}
        }
    }

    fn set_children(&self, children: Vec<ComponentCore>) {
        self.inner.outlet.set_children(children);
    }

    fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    fn node(&self) -> Option<NodeRef> {
        self.inner.output.borrow().as_ref().and_then(|o| o.node())
    }
}

// =============================================================================
// Context
// =============================================================================

/// What a setup function receives. Every hook lives here; the context is
/// valid for the instance it came from, across its whole life, and clones
/// cheaply so callbacks can capture it.
#[derive(Clone)]
pub struct Context {
    core: Rc<CoreInner>,
}

impl Context {
    pub fn name(&self) -> &'static str {
        self.core.name
    }

    pub fn inputs(&self) -> Inputs {
        self.core.inputs.clone()
    }

    pub fn scope(&self) -> Scope {
        self.core.scope.clone()
    }

    pub fn channel(&self) -> DebugChannel {
        self.core.channel.clone()
    }

    /// Observe a cell for this component's connected lifetime. Before the
    /// instance reaches `Connected` the observer is queued (started in
    /// registration order at connect); afterwards it starts immediately.
    /// Either way it is stopped by the next disconnect.
    pub fn observe<T: Clone + 'static>(
        &self,
        cell: &Readable<T>,
        callback: impl Fn(&T) + 'static,
    ) {
        if self.core.state.get() == LifecycleState::Connected {
            let stop = cell.observe(callback);
            self.core.active_stops.borrow_mut().push(stop);
        } else {
            let cell = cell.clone();
            self.core
                .queued_observers
                .borrow_mut()
                .push(Box::new(move || cell.observe(callback)));
        }
    }

    /// Resolve a store through this component's scope chain.
    pub fn use_store<S: 'static>(&self) -> Result<Rc<S>, StoreError> {
        self.core.scope.resolve::<S>()
    }

    /// Runs after the instance reaches `Connected`. Registered while
    /// already connected, the callback runs immediately.
    pub fn on_connect(&self, callback: impl FnOnce() + 'static) {
        if self.core.state.get() == LifecycleState::Connected {
            callback();
        } else {
            self.core.on_connect.borrow_mut().push(Box::new(callback));
        }
    }

    /// Runs first during the next disconnect, in registration order.
    pub fn on_disconnect(&self, callback: impl FnOnce() + 'static) {
        self.core.on_disconnect.borrow_mut().push(Box::new(callback));
    }

    /// Where this component's children mount. By default the outlet lands
    /// on the component's own output node; setup may place it explicitly
    /// inside its markup.
    pub fn outlet(&self) -> Outlet {
        self.core.outlet.clone()
    }

    /// A gate completing a `SetupResult::Pending` transition later. The
    /// gate is tied to this connection: once the instance disconnects, the
    /// gate resolves into nothing.
    pub fn setup_gate(&self) -> SetupGate {
        SetupGate {
            core: Rc::downgrade(&self.core),
            epoch: self.core.epoch.get(),
        }
    }

    /// Report a fatal error attributed to this component.
    pub fn crash(&self, error: CrashError) {
        self.core.channel.crash(&CrashReport {
            component: self.core.name.to_string(),
            error,
        });
    }
}

// =============================================================================
// Setup gate
// =============================================================================

/// Completes a pending setup. Holding one never keeps the instance alive.
pub struct SetupGate {
    core: Weak<CoreInner>,
    epoch: u64,
}

impl SetupGate {
    fn live_core(&self) -> Option<ComponentCore> {
        let inner = self.core.upgrade()?;
        if inner.state.get() != LifecycleState::Initializing || inner.epoch.get() != self.epoch {
            return None;
        }
        Some(ComponentCore { inner })
    }

    /// Finish the pending transition. A no-op when the instance was
    /// disconnected (or reconnected) since the gate was taken.
    pub fn resolve(self, result: SetupResult) {
        if let Some(core) = self.live_core() {
            core.detach_output();
            core.complete(result);
        }
    }

    /// Fail the pending setup: routes a crash report and tears the
    /// half-initialized instance down. Stale gates are a no-op.
    pub fn reject(self, error: CrashError) {
        if let Some(core) = self.live_core() {
            core.crash_out(error);
        }
    }
}

// =============================================================================
// Outlet
// =============================================================================

struct OutletInner {
    position: Option<(NodeRef, Option<NodeRef>)>,
    children: Vec<ComponentCore>,
}

/// The slot where a component's children mount. Implements [`Surface`], so
/// markup can embed it like any other attachable piece.
#[derive(Clone)]
pub struct Outlet {
    inner: Rc<RefCell<OutletInner>>,
}

impl Outlet {
    fn new() -> Outlet {
        Outlet {
            inner: Rc::new(RefCell::new(OutletInner {
                position: None,
                children: Vec::new(),
            })),
        }
    }

    pub fn is_placed(&self) -> bool {
        self.inner.borrow().position.is_some()
    }

    /// Anchor the outlet and (re)connect the current children there.
    pub fn place(&self, parent: &NodeRef, after: Option<&NodeRef>) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.position = Some((parent.clone(), after.cloned()));
        }
        self.connect_children();
    }

    /// Drop the anchor and disconnect the children. The child list is kept,
    /// so a later placement remounts them.
    pub fn clear_placement(&self) {
        let children = {
            let mut inner = self.inner.borrow_mut();
            inner.position = None;
            inner.children.clone()
        };
        for child in &children {
            child.disconnect();
        }
    }

    pub fn set_children(&self, children: Vec<ComponentCore>) {
        let old = std::mem::replace(&mut self.inner.borrow_mut().children, children.clone());
        for child in &old {
            if !children.iter().any(|c| Rc::ptr_eq(&c.inner, &child.inner)) {
                child.disconnect();
            }
        }
        self.connect_children();
    }

    fn connect_children(&self) {
        let (position, children) = {
            let inner = self.inner.borrow();
            (inner.position.clone(), inner.children.clone())
        };
        let Some((parent, after)) = position else { return };
        let mut anchor = after;
        for child in &children {
            child.connect(&parent, anchor.as_ref());
            anchor = child.node().or(anchor);
        }
    }
}

impl Surface for Outlet {
    fn connect(&mut self, parent: &NodeRef, after: Option<&NodeRef>) {
        self.place(parent, after);
    }

    fn disconnect(&mut self) {
        self.clear_placement();
    }

    // An outlet occupies no node of its own; the last child anchors
    // whatever follows it.
    fn node(&self) -> Option<NodeRef> {
        self.inner
            .borrow()
            .children
            .iter()
            .rev()
            .find_map(|child| child.node())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::inputs::InputsBuilder;
    use crate::reactive::Writable;
    use crate::surface::{TestTree, TreeEvent};
    use std::cell::Cell;

    fn app_scope() -> Scope {
        Scope::app(DebugChannel::new())
    }

    fn view_core(
        name: &'static str,
        scope: Scope,
        tree: &TestTree,
        setup_count: Rc<Cell<u32>>,
    ) -> ComponentCore {
        let tree = tree.clone();
        ComponentCore::new(name, scope, Inputs::none(), move |_ctx| {
            setup_count.set(setup_count.get() + 1);
            Ok(SetupResult::view(tree.node()))
        })
    }

    #[test]
    fn test_setup_runs_once_per_connection() {
        let (tree, root) = TestTree::new();
        let count = Rc::new(Cell::new(0));
        let core = view_core("counter", app_scope(), &tree, count.clone());

        core.connect(&root, None);
        assert_eq!(core.state(), LifecycleState::Connected);
        assert_eq!(count.get(), 1);

        // Reposition: no state change, no setup re-run.
        let mut sibling = tree.node();
        sibling.connect(&root, None);
        core.connect(&root, sibling.node().as_ref());
        assert_eq!(core.state(), LifecycleState::Connected);
        assert_eq!(count.get(), 1);

        core.disconnect();
        assert_eq!(core.state(), LifecycleState::Disconnected);

        // Reconnect is a fresh connection: setup runs again.
        core.connect(&root, None);
        assert_eq!(count.get(), 2);
        assert_eq!(core.state(), LifecycleState::Connected);
    }

    #[test]
    fn test_reposition_moves_output_without_remount() {
        let (tree, root) = TestTree::new();
        let core = view_core("leaf", app_scope(), &tree, Rc::new(Cell::new(0)));
        let mut anchor = tree.node();
        anchor.connect(&root, None);

        core.connect(&root, None);
        tree.take_events();
        core.connect(&root, anchor.node().as_ref());

        let events = tree.events();
        assert_eq!(events.len(), 1);
        assert!(
            matches!(events[0], TreeEvent::Moved { .. }),
            "repositioning must move, not remount"
        );
    }

    #[test]
    fn test_connect_callbacks_run_in_registration_order() {
        let (tree, root) = TestTree::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let order_clone = order.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("ordered", app_scope(), Inputs::none(), move |ctx| {
            let o1 = order_clone.clone();
            let o2 = order_clone.clone();
            ctx.on_connect(move || o1.borrow_mut().push("first"));
            ctx.on_connect(move || o2.borrow_mut().push("second"));
            Ok(SetupResult::view(tree_clone.node()))
        });

        core.connect(&root, None);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn test_observers_queue_until_connected_and_stop_at_disconnect() {
        let (tree, root) = TestTree::new();
        let cell = Writable::new(1u32);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let cell_clone = cell.clone();
        let seen_clone = seen.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("watcher", app_scope(), Inputs::none(), move |ctx| {
            let seen = seen_clone.clone();
            ctx.observe(&cell_clone.readable(), move |v| seen.borrow_mut().push(*v));
            // Setup sees no replay yet: the observer has not started.
            assert!(seen_clone.borrow().is_empty());
            Ok(SetupResult::view(tree_clone.node()))
        });

        core.connect(&root, None);
        assert_eq!(*seen.borrow(), vec![1], "observer starts with replay at connect");

        cell.set(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);

        core.disconnect();
        cell.set(3);
        assert_eq!(
            *seen.borrow(),
            vec![1, 2],
            "disconnect must stop every context observer"
        );
    }

    #[test]
    fn test_replay_runs_before_the_instance_is_marked_connected() {
        let (tree, root) = TestTree::new();
        let cell = Writable::new(1u32);
        let instance: Rc<RefCell<Option<ComponentCore>>> = Rc::new(RefCell::new(None));
        let states = Rc::new(RefCell::new(Vec::new()));

        let instance_clone = instance.clone();
        let states_clone = states.clone();
        let cell_clone = cell.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("staged", app_scope(), Inputs::none(), move |ctx| {
            let instance = instance_clone.clone();
            let states = states_clone.clone();
            ctx.observe(&cell_clone.readable(), move |_| {
                if let Some(core) = instance.borrow().as_ref() {
                    states.borrow_mut().push(core.state());
                }
            });
            Ok(SetupResult::view(tree_clone.node()))
        });
        *instance.borrow_mut() = Some(core.clone());

        core.connect(&root, None);
        cell.set(2);
        assert_eq!(
            *states.borrow(),
            vec![LifecycleState::Initializing, LifecycleState::Connected],
            "replay fires before the connected mark, later changes after it"
        );
    }

    #[test]
    fn test_observer_registered_during_replay_still_starts() {
        let (tree, root) = TestTree::new();
        let trigger = Writable::new(0u32);
        let nested_cell = Writable::new(10u32);
        let nested_seen = Rc::new(RefCell::new(Vec::new()));

        let trigger_clone = trigger.clone();
        let nested_clone = nested_cell.clone();
        let seen_clone = nested_seen.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("nested", app_scope(), Inputs::none(), move |ctx| {
            let ctx_for_replay = ctx.clone();
            let nested = nested_clone.clone();
            let seen = seen_clone.clone();
            let registered = Rc::new(Cell::new(false));
            ctx.observe(&trigger_clone.readable(), move |_| {
                if !registered.replace(true) {
                    let seen = seen.clone();
                    ctx_for_replay
                        .observe(&nested.readable(), move |v| seen.borrow_mut().push(*v));
                }
            });
            Ok(SetupResult::view(tree_clone.node()))
        });

        core.connect(&root, None);
        assert_eq!(
            *nested_seen.borrow(),
            vec![10],
            "an observer queued from a replay callback must still start"
        );

        core.disconnect();
        nested_cell.set(11);
        assert_eq!(
            *nested_seen.borrow(),
            vec![10],
            "and it must be stopped by disconnect like any other"
        );
    }

    #[test]
    fn test_disconnect_callbacks_and_inputs_freeze() {
        let (tree, root) = TestTree::new();
        let upstream = Writable::new(1u32);
        let inputs = InputsBuilder::new().with("count", upstream.readable()).build();
        let disconnected = Rc::new(Cell::new(false));

        let disconnected_clone = disconnected.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("freezer", app_scope(), inputs.clone(), move |ctx| {
            let flag = disconnected_clone.clone();
            ctx.on_disconnect(move || flag.set(true));
            Ok(SetupResult::view(tree_clone.node()))
        });

        core.connect(&root, None);
        assert!(inputs.is_connected());
        upstream.set(2);
        assert_eq!(inputs.get::<u32>("count"), Ok(2));

        core.disconnect();
        assert!(disconnected.get());
        upstream.set(3);
        assert_eq!(
            inputs.get::<u32>("count"),
            Ok(2),
            "inputs must freeze at disconnect"
        );
    }

    struct SessionStore {
        user: Writable<Option<String>>,
    }

    #[test]
    fn test_store_component_provides_and_revokes() {
        let (tree, root) = TestTree::new();
        let _ = tree;
        let scope = app_scope();
        let core = ComponentCore::new("session", scope.clone(), Inputs::none(), move |_ctx| {
            Ok(SetupResult::store(
                "session",
                SessionStore {
                    user: Writable::new(None),
                },
            ))
        });
        core.expect_store(TypeId::of::<SessionStore>(), "session");

        assert!(matches!(
            scope.resolve::<SessionStore>(),
            Err(StoreError::NotRegistered { .. })
        ));

        core.connect(&root, None);
        let store = scope.resolve::<SessionStore>().unwrap();
        store.user.set(Some("ada".into()));

        core.disconnect();
        assert!(
            scope.resolve::<SessionStore>().is_err(),
            "disconnecting the store component must revoke its exports"
        );
    }

    #[test]
    fn test_pending_setup_resolves_through_gate() {
        let (tree, root) = TestTree::new();
        let gate_slot: Rc<RefCell<Option<SetupGate>>> = Rc::new(RefCell::new(None));

        let gate_clone = gate_slot.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("lazy", app_scope(), Inputs::none(), move |ctx| {
            *gate_clone.borrow_mut() = Some(ctx.setup_gate());
            Ok(SetupResult::pending(Some(Box::new(tree_clone.node()))))
        });

        core.connect(&root, None);
        assert_eq!(core.state(), LifecycleState::Initializing);
        assert_eq!(tree.order(&root).len(), 1, "placeholder attached");

        let gate = gate_slot.borrow_mut().take().unwrap();
        gate.resolve(SetupResult::view(tree.node()));
        assert_eq!(core.state(), LifecycleState::Connected);
        assert_eq!(
            tree.order(&root).len(),
            1,
            "placeholder swapped for the real output"
        );
    }

    #[test]
    fn test_disconnect_cancels_pending_setup() {
        let (tree, root) = TestTree::new();
        let gate_slot: Rc<RefCell<Option<SetupGate>>> = Rc::new(RefCell::new(None));

        let gate_clone = gate_slot.clone();
        let core = ComponentCore::new("cancelled", app_scope(), Inputs::none(), move |ctx| {
            *gate_clone.borrow_mut() = Some(ctx.setup_gate());
            Ok(SetupResult::pending(None))
        });

        core.connect(&root, None);
        core.disconnect();
        assert_eq!(core.state(), LifecycleState::Disconnected);

        let gate = gate_slot.borrow_mut().take().unwrap();
        gate.resolve(SetupResult::view(tree.node()));
        assert_eq!(
            core.state(),
            LifecycleState::Disconnected,
            "a stale gate must resolve into nothing"
        );
        assert!(tree.order(&root).is_empty());
    }

    #[test]
    fn test_stale_gate_cannot_finish_a_newer_connection() {
        let (tree, root) = TestTree::new();
        let gates: Rc<RefCell<Vec<SetupGate>>> = Rc::new(RefCell::new(Vec::new()));

        let gates_clone = gates.clone();
        let core = ComponentCore::new("generations", app_scope(), Inputs::none(), move |ctx| {
            gates_clone.borrow_mut().push(ctx.setup_gate());
            Ok(SetupResult::pending(None))
        });

        core.connect(&root, None);
        core.disconnect();
        core.connect(&root, None); // second pending connection

        let first_gate = gates.borrow_mut().remove(0);
        first_gate.resolve(SetupResult::view(tree.node()));
        assert_eq!(
            core.state(),
            LifecycleState::Initializing,
            "the first connection's gate must not complete the second"
        );
    }

    #[test]
    fn test_setup_error_routes_crash_and_leaves_clean_state() {
        let (tree, root) = TestTree::new();
        let _ = tree;
        let channel = DebugChannel::new();
        let crashes = Rc::new(RefCell::new(Vec::new()));
        let crashes_clone = crashes.clone();
        channel.install_crash_collector(move |report| {
            crashes_clone.borrow_mut().push(report.clone());
        });

        let scope = Scope::app(channel);
        let cleaned = Rc::new(Cell::new(false));
        let cleaned_clone = cleaned.clone();
        let core = ComponentCore::new("broken", scope, Inputs::none(), move |ctx| {
            let flag = cleaned_clone.clone();
            ctx.on_disconnect(move || flag.set(true));
            Err(CrashError::setup("no backend"))
        });

        core.connect(&root, None);
        assert_eq!(core.state(), LifecycleState::Disconnected);
        assert!(cleaned.get(), "partial setup resources must be released");
        assert_eq!(crashes.borrow().len(), 1);
        assert_eq!(crashes.borrow()[0].component, "broken");

        // A later disconnect is a clean no-op, not a second error.
        core.disconnect();
        assert_eq!(crashes.borrow().len(), 1);
    }

    #[test]
    fn test_gate_reject_crashes_and_tears_down() {
        let (tree, root) = TestTree::new();
        let channel = DebugChannel::new();
        let crashes = Rc::new(Cell::new(0));
        let crashes_clone = crashes.clone();
        channel.install_crash_collector(move |_| crashes_clone.set(crashes_clone.get() + 1));

        let gate_slot: Rc<RefCell<Option<SetupGate>>> = Rc::new(RefCell::new(None));
        let gate_clone = gate_slot.clone();
        let tree_clone = tree.clone();
        let core = ComponentCore::new("rejected", Scope::app(channel), Inputs::none(), move |ctx| {
            *gate_clone.borrow_mut() = Some(ctx.setup_gate());
            Ok(SetupResult::pending(Some(Box::new(tree_clone.node()))))
        });

        core.connect(&root, None);
        let gate = gate_slot.borrow_mut().take().unwrap();
        gate.reject(CrashError::setup("fetch failed"));

        assert_eq!(core.state(), LifecycleState::Disconnected);
        assert_eq!(crashes.get(), 1);
        assert!(tree.order(&root).is_empty(), "placeholder detached");
    }

    #[test]
    fn test_children_mount_under_output_and_follow_disconnect() {
        let (tree, root) = TestTree::new();
        let scope = app_scope();
        let parent = view_core("parent", scope.clone(), &tree, Rc::new(Cell::new(0)));
        let child_a = view_core("a", scope.clone(), &tree, Rc::new(Cell::new(0)));
        let child_b = view_core("b", scope, &tree, Rc::new(Cell::new(0)));

        parent.connect(&root, None);
        parent.set_children(vec![child_a.clone(), child_b.clone()]);

        let parent_node = parent.node().unwrap();
        assert_eq!(
            tree.order(&parent_node),
            vec![child_a.node().unwrap().0, child_b.node().unwrap().0]
        );

        parent.disconnect();
        assert_eq!(child_a.state(), LifecycleState::Disconnected);
        assert_eq!(child_b.state(), LifecycleState::Disconnected);
    }

    #[test]
    fn test_set_children_replacement_disconnects_dropped_child() {
        let (tree, root) = TestTree::new();
        let scope = app_scope();
        let parent = view_core("parent", scope.clone(), &tree, Rc::new(Cell::new(0)));
        let child_a = view_core("a", scope.clone(), &tree, Rc::new(Cell::new(0)));
        let child_b = view_core("b", scope, &tree, Rc::new(Cell::new(0)));

        parent.connect(&root, None);
        parent.set_children(vec![child_a.clone(), child_b.clone()]);
        parent.set_children(vec![child_b.clone()]);

        assert_eq!(child_a.state(), LifecycleState::Disconnected);
        assert_eq!(child_b.state(), LifecycleState::Connected);
    }
}
