//! Component layer - inputs, lifecycle, stores, typed wrappers.

pub mod context;
pub mod inputs;
pub mod store;
pub mod view;

pub use context::{
    Component, ComponentCore, Context, LifecycleState, Outlet, SetupGate, SetupResult,
};
pub use inputs::{InputBinding, InputError, InputKind, InputSource, Inputs, InputsBuilder, InputsSnapshot};
pub use store::{Scope, StoreError};
pub use view::{Store, View};
