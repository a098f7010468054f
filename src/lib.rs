//! Storage Service Library
//!
//! Provisions database users, databases and schemas on MySQL-family and
//! PostgreSQL engines in response to control-plane events on NATS, and
//! reports the outcome of each event back to the control plane.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (events, outcome states, engine types)
//! - [`infra`] - Engine backends, identifier validation, registry, shutdown
//! - [`processor`] - Routing, operation sequencing and state reporting
//! - [`metrics`] - In-process metrics and periodic emission
//! - [`telemetry`] - Logging, tracing and trace context propagation
//! - [`server`] - NATS service bootstrap

pub mod domain;
pub mod infra;
pub mod metrics;
pub mod processor;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{BackendFamily, DbType, EventType, OutcomeState, ProvisionEvent, Route};

pub use infra::{
    Backend, BackendConfig, BackendFactory, BackendRegistry, MessagePublisher, ProvisionError,
    Result,
};

pub use processor::{Disposition, EventProcessor};
