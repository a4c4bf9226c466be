//! Per-call context carried from the invoker to the executing fitable.

use std::collections::BTreeMap;

/// An explicit choice of fitable pinned on a call.
///
/// The version may be omitted when the genericable has exactly one version
/// of that implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub impl_id: String,
    pub version: Option<String>,
}

impl Route {
    pub fn new(impl_id: impl Into<String>, version: Option<String>) -> Self {
        Self {
            impl_id: impl_id.into(),
            version,
        }
    }
}

/// Call-scoped state: an optional pinned route and string attributes that
/// travel with the request (credentials, trace ids, tenant keys).
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    route: Option<Route>,
    attributes: BTreeMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}
