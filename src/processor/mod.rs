//! Event-driven provisioning engine
//!
//! Turns inbound control-plane events into backend operations and answers
//! each with an outcome state:
//! - Subject routing to a configured backend
//! - Ordered, short-circuiting operation sequences per event type
//! - State reporting on the matching states subject

mod handler;
mod reporter;
mod router;
mod sequencer;

pub use handler::{Disposition, EventProcessor};
pub use reporter::{subjects, NatsPublisher, StateReporter};
pub use router::{parse_subject, SubjectRouter};
pub use sequencer::OperationSequencer;
