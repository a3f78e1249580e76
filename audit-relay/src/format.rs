//! SIEM line formatter
//!
//! Renders an [`AuditEvent`] plus caller context into one `key="value"` line
//! for the remote log collector. Rendering is pure: no I/O, no failure modes.

use crate::context::{attributes, AuditContext};
use crate::event::AuditEvent;

/// Default prefix of the `code` token
pub const DEFAULT_CODE_PREFIX: &str = "KLOG";

/// Timestamp layout: `yyyy-MM-dd HH:mm:ss,fff`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

/// Renders an event into a single record line
///
/// Implement this to ship a different layout through the remote-log provider.
pub trait MessageFormatter: Send + Sync {
    /// Render one line; must not contain `\n`
    fn render(&self, event: &AuditEvent, ctx: &dyn AuditContext) -> String;
}

/// `key="value"` formatter
///
/// Token order: `timestamp user role sessionId terminalId class msg ip query
/// code objectType objectId`.
#[derive(Debug, Clone)]
pub struct KeyValueFormatter {
    code_prefix: String,
}

impl Default for KeyValueFormatter {
    fn default() -> Self {
        Self {
            code_prefix: DEFAULT_CODE_PREFIX.to_string(),
        }
    }
}

impl KeyValueFormatter {
    /// Formatter with a custom `code` prefix
    pub fn with_code_prefix(prefix: impl Into<String>) -> Self {
        Self {
            code_prefix: prefix.into(),
        }
    }

    fn status_code(&self, event: &AuditEvent) -> String {
        format!(
            "{}{}{}",
            self.code_prefix,
            if event.success { "1" } else { "0" },
            event.kind.action_code()
        )
    }
}

impl MessageFormatter for KeyValueFormatter {
    fn render(&self, event: &AuditEvent, ctx: &dyn AuditContext) -> String {
        let kind = event.kind.as_str();
        let query_path = ctx.attribute(attributes::QUERY_PATH);
        let query = if query_path.is_empty() {
            format!("/{}", kind)
        } else {
            format!("/{}", query_path.trim_start_matches('/'))
        };
        let msg = format!("{} {}", kind, event.entity);

        let tokens: [(&str, String); 12] = [
            ("timestamp", event.timestamp.format(TIMESTAMP_FORMAT).to_string()),
            ("user", ctx.attribute(attributes::USER_NAME)),
            ("role", ctx.attribute(attributes::ROLE)),
            ("sessionId", ctx.attribute(attributes::SESSION_ID)),
            ("terminalId", ctx.attribute(attributes::TERMINAL_ID)),
            ("class", event.calling_method.clone()),
            ("msg", msg.trim().to_string()),
            ("ip", ctx.attribute(attributes::IP_ADDRESS)),
            ("query", query),
            ("code", self.status_code(event)),
            ("objectType", event.entity.clone()),
            ("objectId", event.primary_key.clone()),
        ];

        tokens
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, escape_value(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Escape quotes and backslashes; fold line breaks so a record stays on one line
fn escape_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AttributeMap;
    use crate::event::EventKind;
    use chrono::{TimeZone, Utc};

    fn token<'a>(line: &'a str, key: &str) -> &'a str {
        let needle = format!("{}=\"", key);
        let start = line.find(&needle).expect("token present") + needle.len();
        let end = line[start..].find('"').expect("closing quote") + start;
        &line[start..end]
    }

    #[test]
    fn test_login_renders_user_and_code() {
        let ctx = AttributeMap::new().with("UserName", "mrossi");
        let event = AuditEvent::new("Login").with_entity("", "");

        let line = KeyValueFormatter::default().render(&event, &ctx);

        assert!(line.contains("user=\"mrossi\""));
        assert!(token(&line, "code").contains("001"));
    }

    #[test]
    fn test_delete_code_suffix() {
        let event = AuditEvent::new(EventKind::Delete).with_entity("Persona", "7");
        let line = KeyValueFormatter::default().render(&event, &AttributeMap::new());
        assert!(token(&line, "code").ends_with("014"));
        assert_eq!(token(&line, "code"), "KLOG1014");
    }

    #[test]
    fn test_unknown_kind_code_suffix() {
        let event = AuditEvent::new("Export").failed("denied");
        let line = KeyValueFormatter::with_code_prefix("APP").render(&event, &AttributeMap::new());
        assert!(token(&line, "code").ends_with("011"));
        assert_eq!(token(&line, "code"), "APP0011");
    }

    #[test]
    fn test_token_order_and_timestamp() {
        let ctx = AttributeMap::new()
            .with("UserName", "mrossi")
            .with("Role", "UtenteGenerico")
            .with("IpAddress", "10.1.2.3")
            .with("QueryPath", "Persona/Insert");
        let event = AuditEvent::new("Insert")
            .with_entity("Persona", "99")
            .with_calling_method("PersonaController.Post")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap());

        let line = KeyValueFormatter::default().render(&event, &ctx);

        assert!(line.starts_with("timestamp=\"2024-03-09 14:05:07,000\" user=\"mrossi\""));
        assert_eq!(token(&line, "msg"), "Insert Persona");
        assert_eq!(token(&line, "query"), "/Persona/Insert");
        assert_eq!(token(&line, "objectType"), "Persona");
        assert!(line.ends_with("objectId=\"99\""));

        let keys: Vec<&str> = line
            .split("\" ")
            .map(|t| t.split('=').next().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec![
                "timestamp", "user", "role", "sessionId", "terminalId", "class", "msg", "ip",
                "query", "code", "objectType", "objectId"
            ]
        );
    }

    #[test]
    fn test_missing_attributes_render_empty() {
        let line = KeyValueFormatter::default().render(&AuditEvent::new("Logout"), &AttributeMap::new());
        assert!(line.contains("user=\"\""));
        assert!(line.contains("ip=\"\""));
        assert_eq!(token(&line, "query"), "/Logout");
    }

    #[test]
    fn test_values_are_escaped_onto_one_line() {
        let ctx = AttributeMap::new().with("UserName", "evil\"user\nnext");
        let line = KeyValueFormatter::default().render(&AuditEvent::new("Login"), &ctx);
        assert!(!line.contains('\n'));
        assert!(line.contains("user=\"evil\\\"user next\""));
    }
}
