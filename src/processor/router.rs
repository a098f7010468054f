//! Subject routing
//!
//! Inbound subjects look like `admin.storages.<dbtype>.<alias>.events`; the
//! engine type and alias sit at fixed positions.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{DbType, Route};
use crate::infra::{Backend, BackendFactory, BackendRegistry, ProvisionError, Result};

const DBTYPE_SEGMENT: usize = 2;
const ALIAS_SEGMENT: usize = 3;

/// Extract `(dbtype, alias)` from a dot-delimited subject
pub fn parse_subject(subject: &str) -> Result<Route> {
    let segments: Vec<&str> = subject.split('.').collect();

    match (segments.get(DBTYPE_SEGMENT), segments.get(ALIAS_SEGMENT)) {
        (Some(dbtype), Some(alias)) if !dbtype.is_empty() && !alias.is_empty() => {
            Ok(Route::new(*dbtype, *alias))
        }
        _ => Err(ProvisionError::MalformedRouting(subject.to_string())),
    }
}

/// Selects the backend for a routed event
#[derive(Clone)]
pub struct SubjectRouter {
    registry: Arc<BackendRegistry>,
    factory: Arc<dyn BackendFactory>,
}

impl SubjectRouter {
    pub fn new(registry: Arc<BackendRegistry>, factory: Arc<dyn BackendFactory>) -> Self {
        Self { registry, factory }
    }

    /// Parse the routing part of an inbound subject
    pub fn route(&self, subject: &str) -> Result<Route> {
        parse_subject(subject)
    }

    /// Build the backend configured for `route`.
    ///
    /// Nothing is constructed when the pair is not configured.
    pub fn resolve(&self, route: &Route) -> Result<Box<dyn Backend>> {
        let unknown = || ProvisionError::UnknownBackend {
            dbtype: route.dbtype.clone(),
            alias: route.alias.clone(),
        };

        let dbtype: DbType = route.dbtype.parse().map_err(|_| unknown())?;
        let config = self.registry.get(dbtype, &route.alias).ok_or_else(unknown)?;

        debug!(route = %route, host = %config.hostname, port = config.port, "Resolved backend");
        Ok(self.factory.build(config))
    }
}
