//! Engine and routing types shared by the registry, router and backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database engine type as it appears in subjects and in `DATABASES` records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Mysql,
    Mariadb,
    Pgsql,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Mysql => "mysql",
            DbType::Mariadb => "mariadb",
            DbType::Pgsql => "pgsql",
        }
    }

    /// Backend implementation family handling this engine type
    pub fn family(&self) -> BackendFamily {
        match self {
            DbType::Mysql | DbType::Mariadb => BackendFamily::MySql,
            DbType::Pgsql => BackendFamily::Postgres,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mysql" => Ok(DbType::Mysql),
            "mariadb" => Ok(DbType::Mariadb),
            "pgsql" => Ok(DbType::Pgsql),
            other => Err(format!(
                "unknown dbtype '{other}'. Expected: mysql, mariadb or pgsql"
            )),
        }
    }
}

/// Backend implementation family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    /// MySQL and MariaDB
    MySql,
    /// PostgreSQL
    Postgres,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendFamily::MySql => write!(f, "mysql"),
            BackendFamily::Postgres => write!(f, "postgres"),
        }
    }
}

/// `(dbtype, alias)` pair taken from an inbound subject.
///
/// Both parts stay raw strings: a reply can still be addressed to the states
/// subject of a dbtype this service does not know.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub dbtype: String,
    pub alias: String,
}

impl Route {
    pub fn new(dbtype: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            dbtype: dbtype.into(),
            alias: alias.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dbtype, self.alias)
    }
}
