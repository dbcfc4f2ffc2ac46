//! # tether-ui
//!
//! Reactive Component Framework core for Rust.
//!
//! Fine-grained reactivity over single-threaded `Rc`/`RefCell` cells:
//! components own writable cells, derive read-only views, and merge any
//! number of sources glitch-free. The framework core never renders -
//! markup is an opaque [`surface::Surface`] supplied by the host
//! integration.
//!
//! ## Architecture
//!
//! ```text
//! Writable/Readable cells → merge engine → inputs record → component setup
//!                                                        → outlet/children
//!                                                        → keyed repeat
//! ```
//!
//! Components walk `Unconnected → Initializing → Connected → Disconnected`
//! and back; setup runs exactly once per connection, and reconnecting an
//! already-connected component only repositions its output.
//!
//! ## Modules
//!
//! - [`reactive`] - cells, derived values, merge, batching
//! - [`component`] - inputs binding, lifecycle core, store scopes
//! - [`collection`] - keyed repeat renderer
//! - [`surface`] - opaque host-tree attach boundary (+ in-memory test tree)
//! - [`router`] - matched-route data for the external router
//! - [`channel`] - debug logging and crash reporting

pub mod channel;
pub mod collection;
pub mod component;
pub mod reactive;
pub mod router;
pub mod surface;

// Re-export commonly used items

pub use reactive::{batch, merge, MergeSources, Readable, StopHandle, Writable};

pub use component::{
    Component, ComponentCore, Context, InputBinding, InputError, InputKind, InputSource, Inputs,
    InputsBuilder, InputsSnapshot, LifecycleState, Outlet, Scope, SetupGate, SetupResult, Store,
    StoreError, View,
};

pub use collection::Repeat;

pub use surface::{NodeRef, Surface, TestNode, TestTree, TreeEvent};

pub use router::RouteMatch;

pub use channel::{CrashError, CrashReport, DebugChannel, LogLevel};
