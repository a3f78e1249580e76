//! Caller context capability
//!
//! Providers pull request-scoped details (user, IP, route) through
//! [`AuditContext::attribute`]. The core never owns the context; the caller
//! hands a shared handle to each dispatch.

use std::collections::HashMap;
use std::sync::Arc;

/// Well-known attribute names
pub mod attributes {
    /// Authenticated account name
    pub const USER_NAME: &str = "UserName";
    /// Role(s) of the current user
    pub const ROLE: &str = "Role";
    /// Session identifier
    pub const SESSION_ID: &str = "SessionId";
    /// Terminal / workstation identifier
    pub const TERMINAL_ID: &str = "TerminalId";
    /// Remote client IP address
    pub const IP_ADDRESS: &str = "IpAddress";
    /// `controller/action` style path of the request
    pub const QUERY_PATH: &str = "QueryPath";
    /// Serialized route data of the request
    pub const ROUTE_PATH: &str = "RoutePath";
    /// Real account behind an impersonated session
    pub const REAL_ACCOUNT: &str = "RealAccount";
}

/// Read-only view of caller-defined attributes
///
/// A missing attribute yields an empty string, never an error.
pub trait AuditContext: Send + Sync {
    /// Value of the named attribute, or `""` if unknown
    fn attribute(&self, name: &str) -> String;
}

/// Context handle shared by every registration of a dispatch
pub type SharedContext = Arc<dyn AuditContext>;

impl AuditContext for HashMap<String, String> {
    fn attribute(&self, name: &str) -> String {
        self.get(name).cloned().unwrap_or_default()
    }
}

/// Map-backed context for callers that resolve attributes up front
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    values: HashMap<String, String>,
}

impl AttributeMap {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Wrap into a [`SharedContext`]
    pub fn shared(self) -> SharedContext {
        Arc::new(self)
    }
}

impl AuditContext for AttributeMap {
    fn attribute(&self, name: &str) -> String {
        self.values.get(name).cloned().unwrap_or_default()
    }
}

/// Context with no attributes
pub fn empty() -> SharedContext {
    Arc::new(AttributeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_attribute_is_empty() {
        let ctx = AttributeMap::new().with(attributes::USER_NAME, "mrossi");
        assert_eq!(ctx.attribute("UserName"), "mrossi");
        assert_eq!(ctx.attribute("Role"), "");
    }

    #[test]
    fn test_hashmap_context() {
        let mut map = HashMap::new();
        map.insert("IpAddress".to_string(), "10.0.0.7".to_string());
        let ctx: SharedContext = Arc::new(map);
        assert_eq!(ctx.attribute(attributes::IP_ADDRESS), "10.0.0.7");
        assert_eq!(ctx.attribute(attributes::SESSION_ID), "");
    }
}
