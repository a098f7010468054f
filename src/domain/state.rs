//! Outcome reports published back to the control plane

use serde::{Deserialize, Serialize};

use super::ProvisionEvent;

/// Result of processing one event, published once on the states subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeState {
    pub db_id: i64,
    pub db_name: String,
    /// true if there was an error
    pub error: bool,
    /// Error description, or the success tag of the event type
    pub message: String,
}

impl OutcomeState {
    pub fn success(event: &ProvisionEvent, message: impl Into<String>) -> Self {
        Self {
            db_id: event.db_id,
            db_name: event.db_name.clone(),
            error: false,
            message: message.into(),
        }
    }

    pub fn failure(event: &ProvisionEvent, message: impl Into<String>) -> Self {
        Self {
            db_id: event.db_id,
            db_name: event.db_name.clone(),
            error: true,
            message: message.into(),
        }
    }
}
