//! Operation sequencing
//!
//! Each event type maps to a fixed list of backend operations:
//!
//! | event_type         | steps                                                |
//! |--------------------|------------------------------------------------------|
//! | `created`          | create_user, create_database, create_ro_user if set  |
//! | `password_changed` | change_password                                      |
//! | `deleted`          | drop_database, drop_user                             |
//!
//! `created` and `password_changed` require a non-empty password. The first
//! failing step ends the sequence. Steps that already succeeded
//! are not rolled back: a failed `create_database` leaves the user behind.

use tracing::{info, instrument, warn};

use crate::domain::{EventType, ProvisionEvent};
use crate::infra::{Backend, ProvisionError, Result};

/// Steps completed so far, for logging partial failures
#[derive(Default)]
struct Progress {
    completed: Vec<&'static str>,
}

impl Progress {
    async fn step<F>(&mut self, name: &'static str, operation: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        match operation.await {
            Ok(()) => {
                self.completed.push(name);
                Ok(())
            }
            Err(e) => {
                if !self.completed.is_empty() {
                    warn!(
                        failed_step = name,
                        completed = ?self.completed,
                        "Sequence stopped after partial progress; completed steps are not rolled back"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Events that set a password must carry one; an empty password is never
/// handed to the engine.
fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(ProvisionError::InvalidArgument {
            field: "password",
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Runs the step sequence of an event against one backend
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationSequencer;

impl OperationSequencer {
    pub fn new() -> Self {
        Self
    }

    /// Run every step of `event`, returning the success message.
    #[instrument(skip_all, fields(event_type = %event.event_type, db_id = event.db_id))]
    pub async fn run(&self, event: &ProvisionEvent, backend: &dyn Backend) -> Result<&'static str> {
        let mut progress = Progress::default();

        match &event.event_type {
            EventType::Created => {
                require_password(&event.password)?;
                progress
                    .step(
                        "create_user",
                        backend.create_user(&event.username, &event.password, &event.db_name),
                    )
                    .await?;
                progress
                    .step(
                        "create_database",
                        backend.create_database(&event.db_name, &event.username, &event.extensions),
                    )
                    .await?;
                if let Some((user, password)) = event.read_only_credentials() {
                    progress
                        .step(
                            "create_ro_user",
                            backend.create_ro_user(user, password, &event.db_name),
                        )
                        .await?;
                }
            }
            EventType::PasswordChanged => {
                require_password(&event.password)?;
                progress
                    .step(
                        "change_password",
                        backend.change_password(&event.username, &event.password),
                    )
                    .await?;
            }
            EventType::Deleted => {
                progress
                    .step("drop_database", backend.drop_database(&event.db_name))
                    .await?;
                progress
                    .step("drop_user", backend.drop_user(&event.username))
                    .await?;
            }
            EventType::Other(other) => {
                return Err(ProvisionError::UnknownEventType(other.clone()));
            }
        }

        let message = event
            .event_type
            .success_message()
            .ok_or_else(|| ProvisionError::UnknownEventType(event.event_type.to_string()))?;

        info!(steps = ?progress.completed, "Event sequence completed");
        Ok(message)
    }
}
