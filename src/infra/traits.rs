//! Trait definitions for the storage service seams

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;

use crate::domain::BackendFamily;

use super::{BackendConfig, ProvisionError, Result, Script};

/// Administrative capabilities of one database engine instance.
///
/// Every operation validates its identifier arguments before touching the
/// network, opens its own connection(s), and releases them on every exit
/// path. Operations are not idempotent: repeating one against an object that
/// already exists fails with the engine's error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Engine family served by this backend
    fn kind(&self) -> BackendFamily;

    /// Create the owning role of a database
    async fn create_user(&self, user: &str, password: &str, database: &str) -> Result<()>;

    /// Create a database owned by `owner` and install `extensions` where supported
    async fn create_database(&self, database: &str, owner: &str, extensions: &[String])
        -> Result<()>;

    /// Create a role with read-only access to `database`
    async fn create_ro_user(&self, _user: &str, _password: &str, _database: &str) -> Result<()> {
        Err(ProvisionError::Unsupported {
            operation: "create_ro_user",
            family: self.kind(),
        })
    }

    /// Replace the password of an existing role
    async fn change_password(&self, user: &str, password: &str) -> Result<()>;

    /// Drop a role
    async fn drop_user(&self, user: &str) -> Result<()>;

    /// Drop a database
    async fn drop_database(&self, database: &str) -> Result<()>;

    /// Open a connection and run a trivial query
    async fn check_connection(&self) -> Result<()>;
}

/// Builds a backend for a configured engine instance.
///
/// Construction is cheap: nothing connects until an operation runs.
#[cfg_attr(test, automock)]
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &BackendConfig) -> Box<dyn Backend>;
}

/// Executes statement scripts against an engine.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run every statement of `script` on one fresh connection, stopping at
    /// the first failure. The connection is closed whatever the result.
    async fn run(&self, script: &Script) -> Result<()>;
}

/// Outbound message transport
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}
