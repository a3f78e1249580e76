//! Audit event types
//!
//! The payload handed to every provider. Events are produced by the caller
//! and consumed read-only; the dispatcher shares one copy across all
//! registrations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A single audit trail event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier, used as the key for replace and get
    pub id: Uuid,
    /// What happened
    pub kind: EventKind,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Method that produced the event
    pub calling_method: String,
    /// Entity (table/type) name affected, empty for non-entity events
    pub entity: String,
    /// Primary key of the affected entity, empty if none
    pub primary_key: String,
    /// Whether the audited action succeeded
    pub success: bool,
    /// Error detail when the action failed
    pub error_detail: Option<String>,
    /// Opaque caller data (target object snapshot, extra fields)
    pub payload: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new successful event of the given kind, stamped now
    pub fn new(kind: impl Into<EventKind>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            timestamp: Utc::now(),
            calling_method: String::new(),
            entity: String::new(),
            primary_key: String::new(),
            success: true,
            error_detail: None,
            payload: None,
        }
    }

    /// Set the affected entity and its primary key
    pub fn with_entity(mut self, entity: impl Into<String>, primary_key: impl Into<String>) -> Self {
        self.entity = entity.into();
        self.primary_key = primary_key.into();
        self
    }

    /// Set the calling method name
    pub fn with_calling_method(mut self, method: impl Into<String>) -> Self {
        self.calling_method = method.into();
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Attach opaque caller data
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Mark the audited action as failed
    pub fn failed(mut self, detail: impl Into<String>) -> Self {
        self.success = false;
        self.error_detail = Some(detail.into());
        self
    }
}

/// Categories of audit events
///
/// Parsing is exact-match on the kind name; unknown names become [`EventKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// User logged in
    Login,
    /// User logged out
    Logout,
    /// Entity created
    Insert,
    /// Entity modified
    Update,
    /// Entity removed
    Delete,
    /// Application-defined event
    Custom(String),
}

impl EventKind {
    /// Three-digit action code used in SIEM records
    pub fn action_code(&self) -> &'static str {
        match self {
            Self::Login => "001",
            Self::Logout => "002",
            Self::Insert => "012",
            Self::Update => "013",
            Self::Delete => "014",
            Self::Custom(_) => "011",
        }
    }

    /// Kind name as it appears in records
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "Login",
            Self::Logout => "Logout",
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "Login" => Self::Login,
            "Logout" => Self::Logout,
            "Insert" => Self::Insert,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_codes() {
        assert_eq!(EventKind::Login.action_code(), "001");
        assert_eq!(EventKind::Logout.action_code(), "002");
        assert_eq!(EventKind::Insert.action_code(), "012");
        assert_eq!(EventKind::Update.action_code(), "013");
        assert_eq!(EventKind::Delete.action_code(), "014");
        assert_eq!(EventKind::from("Export").action_code(), "011");
    }

    #[test]
    fn test_kind_parsing_is_exact() {
        assert_eq!(EventKind::from("Delete"), EventKind::Delete);
        assert_eq!(
            EventKind::from("delete"),
            EventKind::Custom("delete".to_string())
        );
        assert_eq!(EventKind::Custom("Export".into()).to_string(), "Export");
    }

    #[test]
    fn test_event_builder() {
        let event = AuditEvent::new("Update")
            .with_entity("Persona", "42")
            .with_calling_method("PersonaController.Put")
            .failed("constraint violated");

        assert_eq!(event.kind, EventKind::Update);
        assert_eq!(event.entity, "Persona");
        assert_eq!(event.primary_key, "42");
        assert!(!event.success);
        assert_eq!(event.error_detail.as_deref(), Some("constraint violated"));
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let event = AuditEvent::new(EventKind::Login)
            .with_payload(serde_json::json!({ "attempt": 1 }));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"Login\""));

        let deserialized: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
