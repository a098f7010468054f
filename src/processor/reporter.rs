//! State reporting
//!
//! Every processed event is answered with one [`OutcomeState`] on the states
//! subject of the `(dbtype, alias)` it arrived on.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info_span, Instrument};

use crate::domain::{OutcomeState, Route};
use crate::infra::{MessagePublisher, ProvisionError, Result};
use crate::telemetry::{current_trace_headers, spans};

/// Subject templates shared with the control plane
pub mod subjects {
    /// Subject the control plane publishes events on
    pub fn events(dbtype: &str, alias: &str) -> String {
        format!("admin.storages.{dbtype}.{alias}.events")
    }

    /// Subject outcomes are reported on
    pub fn states(dbtype: &str, alias: &str) -> String {
        format!("admin.storages.{dbtype}.{alias}.states")
    }
}

/// Publishes outcome states
#[derive(Clone)]
pub struct StateReporter {
    publisher: Arc<dyn MessagePublisher>,
}

impl StateReporter {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }

    /// Publish `outcome` for `route`.
    ///
    /// Failures are logged and swallowed; returns whether the report was handed
    /// to the transport.
    pub async fn report(&self, route: &Route, outcome: &OutcomeState) -> bool {
        let subject = subjects::states(&route.dbtype, &route.alias);
        let span = info_span!(spans::REPORT_STATE, subject = %subject, error = outcome.error);

        async {
            match self.publish(subject.clone(), outcome).await {
                Ok(()) => {
                    debug!(outcome = %outcome.message, "State reported");
                    true
                }
                Err(e) => {
                    error!(
                        db_id = outcome.db_id,
                        db_name = %outcome.db_name,
                        error = %e,
                        "Failed to report state"
                    );
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn publish(&self, subject: String, outcome: &OutcomeState) -> Result<()> {
        let body = serde_json::to_vec(outcome)
            .map_err(|e| ProvisionError::Reporting(format!("cannot encode state: {e}")))?;
        self.publisher.publish(subject, Bytes::from(body)).await
    }
}

/// NATS-backed publisher.
///
/// Publishes are buffered by the client; they reach the server on the next
/// flush, which the client performs in the background and on shutdown.
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessagePublisher for NatsPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client
            .publish_with_headers(subject, current_trace_headers(), payload)
            .await
            .map_err(|e| ProvisionError::Reporting(e.to_string()))
    }
}
