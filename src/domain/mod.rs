//! Domain models for the storage service
//!
//! Inbound provisioning events, outbound outcome states and the engine/routing
//! types they are addressed with.

mod event;
mod state;
mod types;

pub use event::*;
pub use state::*;
pub use types::*;
