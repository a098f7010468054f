//! Backend registry
//!
//! Maps each configured `(alias, dbtype)` pair to the connection parameters
//! of one engine instance. The registry is built once at startup from the
//! `DATABASES` setting and shared read-only between concurrent events.

use std::collections::BTreeMap;
use std::fmt;

use tracing::warn;

use crate::domain::{BackendFamily, DbType};

use super::{Backend, BackendFactory, MySqlBackend, PgBackend, ProvisionError, Result};

/// Separator between `DATABASES` records
pub const RECORD_SEPARATOR: char = ';';

/// Separator between fields of one record
pub const FIELD_SEPARATOR: char = ':';

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendKey {
    pub alias: String,
    pub dbtype: DbType,
}

impl BackendKey {
    pub fn new(alias: impl Into<String>, dbtype: DbType) -> Self {
        Self {
            alias: alias.into(),
            dbtype,
        }
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.alias, self.dbtype)
    }
}

/// Connection parameters of one engine instance
#[derive(Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub alias: String,
    pub dbtype: DbType,
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Database PostgreSQL connects to for administrative work.
    /// Defaults to the admin username.
    pub admin_database: Option<String>,
}

impl BackendConfig {
    /// Parse one `alias:dbtype:hostname:port:username:password` record.
    ///
    /// The password is the remainder of the record and may contain `:`.
    pub fn parse_record(record: &str) -> Result<Self> {
        let fields: Vec<&str> = record.trim().splitn(6, FIELD_SEPARATOR).collect();
        let [alias, dbtype, hostname, port, username, password] = fields[..] else {
            return Err(ProvisionError::Configuration(format!(
                "database record for '{}' needs 6 fields (alias:dbtype:hostname:port:username:password), got {}",
                fields.first().copied().unwrap_or_default(),
                fields.len()
            )));
        };

        if alias.is_empty() {
            return Err(ProvisionError::Configuration(
                "database record has an empty alias".to_string(),
            ));
        }

        let dbtype: DbType = dbtype.parse().map_err(|e| {
            ProvisionError::Configuration(format!("database record '{alias}': {e}"))
        })?;

        let port: u16 = port.parse().map_err(|e| {
            ProvisionError::Configuration(format!(
                "database record '{alias}': invalid port '{port}': {e}"
            ))
        })?;

        Ok(Self {
            alias: alias.to_string(),
            dbtype,
            hostname: hostname.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            admin_database: None,
        })
    }

    pub fn key(&self) -> BackendKey {
        BackendKey::new(self.alias.clone(), self.dbtype)
    }

    pub fn admin_database(&self) -> &str {
        self.admin_database.as_deref().unwrap_or(&self.username)
    }

    pub fn with_admin_database(mut self, database: impl Into<String>) -> Self {
        self.admin_database = Some(database.into());
        self
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("alias", &self.alias)
            .field("dbtype", &self.dbtype)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("admin_database", &self.admin_database)
            .finish()
    }
}

/// Immutable mapping from `(alias, dbtype)` to connection parameters
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendKey, BackendConfig>,
}

impl BackendRegistry {
    /// Build a registry from parsed records.
    ///
    /// A later record with the same alias and dbtype replaces the earlier one.
    pub fn from_configs(configs: impl IntoIterator<Item = BackendConfig>) -> Self {
        let mut backends = BTreeMap::new();
        for config in configs {
            let key = config.key();
            if backends.insert(key.clone(), config).is_some() {
                warn!(backend = %key, "Duplicate database record, the later one wins");
            }
        }
        Self { backends }
    }

    /// Parse the semicolon-separated `DATABASES` setting.
    pub fn parse(databases: &str) -> Result<Self> {
        let configs = databases
            .split(RECORD_SEPARATOR)
            .filter(|record| !record.trim().is_empty())
            .map(BackendConfig::parse_record)
            .collect::<Result<Vec<_>>>()?;

        if configs.is_empty() {
            return Err(ProvisionError::Configuration(
                "no database records configured".to_string(),
            ));
        }

        Ok(Self::from_configs(configs))
    }

    /// Use `database` as the administrative database of every PostgreSQL backend
    pub fn with_pg_admin_database(self, database: &str) -> Self {
        let backends = self
            .backends
            .into_iter()
            .map(|(key, config)| match config.dbtype.family() {
                BackendFamily::Postgres => (key, config.with_admin_database(database)),
                BackendFamily::MySql => (key, config),
            })
            .collect();
        Self { backends }
    }

    pub fn get(&self, dbtype: DbType, alias: &str) -> Option<&BackendConfig> {
        self.backends.get(&BackendKey::new(alias, dbtype))
    }

    pub fn keys(&self) -> impl Iterator<Item = &BackendKey> {
        self.backends.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BackendKey, &BackendConfig)> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Builds the sqlx-backed backend matching a config's engine family
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBackendFactory;

impl BackendFactory for SqlBackendFactory {
    fn build(&self, config: &BackendConfig) -> Box<dyn Backend> {
        match config.dbtype.family() {
            BackendFamily::MySql => Box::new(MySqlBackend::new(config)),
            BackendFamily::Postgres => Box::new(PgBackend::new(config)),
        }
    }
}
