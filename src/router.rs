//! Router collaborator - matched-route data only.
//!
//! Route matching happens outside this crate. The router supplies, per
//! navigation event, a [`RouteMatch`] describing the matched pattern; by
//! convention the current navigation state is a
//! `Readable<Option<RouteMatch>>` that views observe to pick which child
//! markup to mount. "No route matched" is `None` - a normal value, never an
//! error.

use indexmap::IndexMap;

/// A matched route as delivered by the external router.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteMatch {
    /// The pattern that matched, e.g. `/users/{id}`.
    pub pattern: String,
    /// Extracted path parameters, in pattern order.
    pub params: IndexMap<String, String>,
    /// Query-string values, in appearance order.
    pub query: IndexMap<String, String>,
    /// Free-form metadata the route was registered with.
    pub meta: IndexMap<String, String>,
}

impl RouteMatch {
    pub fn new(pattern: impl Into<String>) -> Self {
        RouteMatch {
            pattern: pattern.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(name.into(), value.into());
        self
    }
}
