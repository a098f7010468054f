//! Inbound provisioning events
//!
//! The control plane publishes one JSON document per change to a managed
//! database. Events are decoded once per message, never mutated, and dropped
//! after the outcome has been reported.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::infra::{ProvisionError, Result};

/// Kind of change announced by the control plane.
///
/// Unrecognized values decode into [`EventType::Other`] so they can be
/// reported back instead of failing the whole message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Created,
    PasswordChanged,
    Deleted,
    Other(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Created => "created",
            EventType::PasswordChanged => "password_changed",
            EventType::Deleted => "deleted",
            EventType::Other(other) => other,
        }
    }

    /// Message reported after every step of this event succeeded
    pub fn success_message(&self) -> Option<&'static str> {
        match self {
            EventType::Created => Some("created"),
            EventType::PasswordChanged => Some("password changed"),
            EventType::Deleted => Some("deleted"),
            EventType::Other(_) => None,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "created" => EventType::Created,
            "password_changed" => EventType::PasswordChanged,
            "deleted" => EventType::Deleted,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioning request for one database on one engine instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionEvent {
    pub event_type: EventType,
    pub db_id: i64,
    pub db_name: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_ro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_ro: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub extensions: Vec<String>,
}

impl ProvisionEvent {
    /// Decode an event from a raw message body.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(ProvisionError::Decode)
    }

    /// Read-only role credentials, present only when both parts are non-empty.
    pub fn read_only_credentials(&self) -> Option<(&str, &str)> {
        match (self.username_ro.as_deref(), self.password_ro.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some((user, password))
            }
            _ => None,
        }
    }
}

// Passwords stay out of logs.
impl fmt::Debug for ProvisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionEvent")
            .field("event_type", &self.event_type)
            .field("db_id", &self.db_id)
            .field("db_name", &self.db_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("username_ro", &self.username_ro)
            .field(
                "password_ro",
                &self.password_ro.as_ref().map(|_| "<redacted>"),
            )
            .field("extensions", &self.extensions)
            .finish()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_created_event() {
        let event = ProvisionEvent::decode(
            br#"{"event_type": "created", "db_id": 29, "db_name": "testdb", "username": "testdb", "password": "secret", "extensions": ["hstore"]}"#,
        )
        .unwrap();

        assert_eq!(event.event_type, EventType::Created);
        assert_eq!(event.db_id, 29);
        assert_eq!(event.db_name, "testdb");
        assert_eq!(event.username, "testdb");
        assert_eq!(event.password, "secret");
        assert_eq!(event.extensions, vec!["hstore".to_string()]);
        assert!(event.read_only_credentials().is_none());
    }

    #[test]
    fn test_decode_unknown_event_type() {
        let event = ProvisionEvent::decode(
            br#"{"event_type": "frobnicate", "db_id": 1, "db_name": "a", "username": "a"}"#,
        )
        .unwrap();

        assert_eq!(event.event_type, EventType::Other("frobnicate".to_string()));
        assert_eq!(event.event_type.success_message(), None);
    }

    #[test]
    fn test_decode_missing_and_null_optionals() {
        let event = ProvisionEvent::decode(
            br#"{"event_type": "deleted", "db_id": 3, "db_name": "a", "username": "a", "extensions": null}"#,
        )
        .unwrap();

        assert!(event.password.is_empty());
        assert!(event.extensions.is_empty());
        assert!(event.username_ro.is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = ProvisionEvent::decode(b"{not json").unwrap_err();
        assert!(matches!(err, ProvisionError::Decode(_)));

        let err = ProvisionEvent::decode(br#"{"event_type": "created"}"#).unwrap_err();
        assert!(matches!(err, ProvisionError::Decode(_)));
    }

    #[test]
    fn test_read_only_credentials_require_both_parts() {
        let mut event = ProvisionEvent::decode(
            br#"{"event_type": "created", "db_id": 1, "db_name": "a", "username": "a", "username_ro": "a_ro", "password_ro": ""}"#,
        )
        .unwrap();
        assert!(event.read_only_credentials().is_none());

        event.password_ro = Some("ro-secret".to_string());
        assert_eq!(event.read_only_credentials(), Some(("a_ro", "ro-secret")));
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let event = ProvisionEvent::decode(
            br#"{"event_type": "created", "db_id": 1, "db_name": "a", "username": "a", "password": "hunter2", "username_ro": "r", "password_ro": "hunter3"}"#,
        )
        .unwrap();

        let debug = format!("{event:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("hunter3"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_event_type_serializes_as_string() {
        assert_eq!(
            serde_json::to_string(&EventType::PasswordChanged).unwrap(),
            "\"password_changed\""
        );
        assert_eq!(
            serde_json::to_string(&EventType::Other("x".into())).unwrap(),
            "\"x\""
        );
    }
}
