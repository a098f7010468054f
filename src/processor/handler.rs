//! Per-message event processing
//!
//! decode → route → sequence → report. Every failure after decoding becomes
//! an `error: true` state; nothing here is fatal to the process.

use std::sync::Arc;
use std::time::Instant;

use tracing::{field, info, info_span, warn, Span};
use uuid::Uuid;

use crate::domain::{OutcomeState, ProvisionEvent, Route};
use crate::infra::ProvisionError;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::telemetry::spans;

use super::{OperationSequencer, StateReporter, SubjectRouter};

/// What happened to an inbound message
#[derive(Debug)]
pub enum Disposition {
    /// No state could be reported: the payload or the subject was unusable
    Dropped { error: ProvisionError },
    /// An outcome was built and handed to the reporter
    Reported {
        route: Route,
        outcome: OutcomeState,
        /// Whether the transport accepted the report
        delivered: bool,
    },
}

impl Disposition {
    pub fn outcome(&self) -> Option<&OutcomeState> {
        match self {
            Disposition::Reported { outcome, .. } => Some(outcome),
            Disposition::Dropped { .. } => None,
        }
    }
}

/// Top-level handler for inbound provisioning messages
#[derive(Clone)]
pub struct EventProcessor {
    router: SubjectRouter,
    sequencer: OperationSequencer,
    reporter: StateReporter,
    metrics: Arc<MetricsRegistry>,
}

impl EventProcessor {
    pub fn new(
        router: SubjectRouter,
        reporter: StateReporter,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            router,
            sequencer: OperationSequencer::new(),
            reporter,
            metrics,
        }
    }

    /// Span for handling one message; `process` fills in the event fields.
    pub fn span(subject: &str) -> Span {
        info_span!(
            spans::HANDLE_EVENT,
            message_id = %Uuid::new_v4(),
            subject = %subject,
            db_id = field::Empty,
            db_name = field::Empty,
            event_type = field::Empty,
        )
    }

    pub async fn process(&self, subject: &str, payload: &[u8]) -> Disposition {
        let started = Instant::now();
        self.metrics
            .inc_counter(metric_names::MESSAGES_PROCESSED)
            .await;

        let event = match ProvisionEvent::decode(payload) {
            Ok(event) => event,
            Err(error) => {
                warn!(error = %error, "Dropping message");
                self.metrics.inc_counter(metric_names::DECODE_ERRORS).await;
                return Disposition::Dropped { error };
            }
        };

        let span = Span::current();
        span.record("db_id", event.db_id);
        span.record("db_name", event.db_name.as_str());
        span.record("event_type", event.event_type.as_str());
        info!(event = ?event, "Received event");

        let route = match self.router.route(subject) {
            Ok(route) => route,
            Err(error) => {
                warn!(error = %error, "Dropping message, no states subject to answer on");
                return Disposition::Dropped { error };
            }
        };

        let outcome = self.execute(&route, &event).await;

        let delivered = self.reporter.report(&route, &outcome).await;
        if !delivered {
            self.metrics.inc_counter(metric_names::REPORTS_FAILED).await;
        }

        self.metrics
            .observe_histogram(metric_names::EVENT_LATENCY, started.elapsed().as_secs_f64())
            .await;

        Disposition::Reported {
            route,
            outcome,
            delivered,
        }
    }

    async fn execute(&self, route: &Route, event: &ProvisionEvent) -> OutcomeState {
        let result = match self.router.resolve(route) {
            Ok(backend) => self.sequencer.run(event, backend.as_ref()).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(message) => {
                self.metrics.inc_counter(metric_names::EVENTS_SUCCEEDED).await;
                info!(route = %route, outcome = message, "Event processed");
                OutcomeState::success(event, message)
            }
            Err(e) => {
                self.metrics.inc_counter(metric_names::EVENTS_FAILED).await;
                warn!(route = %route, kind = e.kind(), error = %e, "Event failed");
                OutcomeState::failure(event, e.report_message())
            }
        }
    }
}
