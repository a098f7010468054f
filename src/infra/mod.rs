//! Infrastructure layer for the storage service
//!
//! Contains trait definitions and implementations for:
//! - Database engine backends (MySQL family, PostgreSQL)
//! - Identifier validation for generated administrative SQL
//! - Backend registry (configured engine instances)
//! - Graceful shutdown (in-flight event draining)

mod error;
mod graceful_shutdown;
pub mod identifier;
pub mod mysql;
pub mod postgres;
mod registry;
mod statement;
mod traits;

pub use error::*;
pub use graceful_shutdown::{
    shutdown_signal, InFlightGuard, InFlightTracker, ShutdownCoordinator, ShutdownSignal,
};
pub use identifier::{escape_literal, validate, InvalidIdentifier};
pub use mysql::{MySqlBackend, MySqlRunner};
pub use postgres::{PgBackend, PgRunner};
pub use registry::{BackendConfig, BackendKey, BackendRegistry, SqlBackendFactory};
pub use statement::{Script, Statement, Target};
pub use traits::*;
