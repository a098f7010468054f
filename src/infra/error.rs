//! Error types for the storage service

use thiserror::Error;

use crate::domain::BackendFamily;

/// Errors that can occur while turning an event into engine operations
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Inbound payload is not a valid event
    #[error("invalid JSON data in the incoming message: {0}")]
    Decode(#[source] serde_json::Error),

    /// Subject does not carry a dbtype and alias
    #[error("malformed routing subject: {0}")]
    MalformedRouting(String),

    /// No backend is configured for the routed pair
    #[error("database backend not found: {dbtype}/{alias}")]
    UnknownBackend { dbtype: String, alias: String },

    /// A value failed the identifier allow-list
    #[error("invalid format of {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// Could not open a connection to the engine
    #[error("connection to {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// The engine rejected a statement
    #[error("{step} failed: {source}")]
    Backend {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The backend does not implement an optional capability
    #[error("{operation} is not supported by the {family} backend")]
    Unsupported {
        operation: &'static str,
        family: BackendFamily,
    },

    /// The event type is not one the sequencer knows
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// Publishing an outbound message failed
    #[error("publish failed: {0}")]
    Reporting(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProvisionError {
    /// Short machine-friendly error kind for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::Decode(_) => "decode",
            ProvisionError::MalformedRouting(_) => "malformed_routing",
            ProvisionError::UnknownBackend { .. } => "unknown_backend",
            ProvisionError::InvalidArgument { .. } => "invalid_argument",
            ProvisionError::Connection { .. } => "connection",
            ProvisionError::Backend { .. } => "backend",
            ProvisionError::Unsupported { .. } => "unsupported",
            ProvisionError::UnknownEventType(_) => "unknown_event_type",
            ProvisionError::Reporting(_) => "reporting",
            ProvisionError::Configuration(_) => "configuration",
        }
    }

    /// Text placed in the `message` of a reported error state.
    ///
    /// Never contains SQL text: statements can embed passwords.
    pub fn report_message(&self) -> String {
        match self {
            ProvisionError::MalformedRouting(_) | ProvisionError::UnknownBackend { .. } => {
                "wrong backend".to_string()
            }
            ProvisionError::Connection { .. } | ProvisionError::Backend { .. } => {
                format!("backend problem: {self}")
            }
            other => other.to_string(),
        }
    }
}

/// Result type for storage service operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_reports_wrong_backend() {
        let err = ProvisionError::UnknownBackend {
            dbtype: "oracle".to_string(),
            alias: "main".to_string(),
        };
        assert_eq!(err.report_message(), "wrong backend");
        assert_eq!(err.to_string(), "database backend not found: oracle/main");
    }

    #[test]
    fn test_backend_error_names_step() {
        let err = ProvisionError::Backend {
            step: "create user",
            source: sqlx::Error::Protocol("Operation CREATE USER failed".to_string()),
        };
        let message = err.report_message();
        assert!(message.starts_with("backend problem: create user failed"));
        assert!(message.contains("Operation CREATE USER failed"));
        assert_eq!(err.kind(), "backend");
    }

    #[test]
    fn test_invalid_argument_message() {
        let err = ProvisionError::InvalidArgument {
            field: "username",
            reason: "invalid character ' ' at position 3".to_string(),
        };
        assert!(err.report_message().contains("invalid format of username"));
    }

    #[test]
    fn test_unknown_event_type_message() {
        let err = ProvisionError::UnknownEventType("frobnicate".to_string());
        assert_eq!(err.report_message(), "unknown event type: frobnicate");
    }
}
