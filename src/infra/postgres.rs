//! PostgreSQL backend
//!
//! A PostgreSQL connection always names an existing database. Administrative
//! work runs on the backend's admin database; the per-database half of
//! `create_database` and `create_ro_user` reconnects to the target database.
//! Each database gets a schema of the same name, owned by the database owner,
//! and extensions are installed into that schema. Identifiers are emitted
//! unquoted and therefore lowercased first.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::Connection;
use tracing::{debug, warn};

use crate::domain::BackendFamily;

use super::identifier::{escape_literal, require_identifier};
use super::{
    Backend, BackendConfig, ProvisionError, Result, Script, ScriptRunner, Statement, Target,
};

/// Statement plans for PostgreSQL operations.
///
/// Planning validates every identifier, extensions included, so a bad
/// argument fails before the first connection is opened.
pub mod plan {
    use super::*;

    /// Validate an identifier and fold it the way the server folds unquoted
    /// names, so SQL text, connection targets and `datname` lookups agree.
    fn identifier(field: &'static str, value: &str) -> Result<String> {
        require_identifier(field, value)?;
        Ok(value.to_ascii_lowercase())
    }

    pub fn create_user(user: &str, password: &str, database: &str) -> Result<Vec<Script>> {
        let user = identifier("username", user)?;
        identifier("database", database)?;

        Ok(vec![Script::admin(vec![Statement::new(
            "create user",
            format!(
                "CREATE USER {user} WITH PASSWORD E'{}';",
                escape_literal(password)
            ),
        )])])
    }

    pub fn create_database(
        database: &str,
        owner: &str,
        extensions: &[String],
    ) -> Result<Vec<Script>> {
        let owner = identifier("owner", owner)?;
        let database = identifier("database", database)?;
        let extensions = extensions
            .iter()
            .map(|extension| identifier("extension", extension))
            .collect::<Result<Vec<_>>>()?;

        let mut schema = vec![
            Statement::new("create schema", format!("CREATE SCHEMA {database};")),
            Statement::new(
                "set schema owner",
                format!("ALTER SCHEMA {database} OWNER TO {owner};"),
            ),
        ];
        schema.extend(extensions.iter().map(|extension| {
            Statement::new(
                "create extension",
                format!("CREATE EXTENSION {extension} SCHEMA {database};"),
            )
        }));

        Ok(vec![
            Script::admin(vec![Statement::new(
                "create database",
                format!("CREATE DATABASE {database} OWNER {owner};"),
            )]),
            Script::on_database(database, schema),
        ])
    }

    pub fn create_ro_user(user: &str, password: &str, database: &str) -> Result<Vec<Script>> {
        let user = identifier("username", user)?;
        let database = identifier("database", database)?;

        Ok(vec![
            Script::admin(vec![
                Statement::new(
                    "create read-only user",
                    format!(
                        "CREATE USER {user} WITH PASSWORD E'{}';",
                        escape_literal(password)
                    ),
                ),
                Statement::new(
                    "grant read-only privileges",
                    format!("GRANT CONNECT ON DATABASE {database} TO {user};"),
                ),
            ]),
            Script::on_database(
                database.clone(),
                vec![
                    Statement::new(
                        "grant read-only privileges",
                        format!("GRANT USAGE ON SCHEMA {database} TO {user};"),
                    ),
                    Statement::new(
                        "grant read-only privileges",
                        format!("GRANT SELECT ON ALL TABLES IN SCHEMA {database} TO {user};"),
                    ),
                    Statement::new(
                        "grant read-only privileges",
                        format!(
                            "ALTER DEFAULT PRIVILEGES IN SCHEMA {database} GRANT SELECT ON TABLES TO {user};"
                        ),
                    ),
                ],
            ),
        ])
    }

    pub fn change_password(user: &str, password: &str) -> Result<Vec<Script>> {
        let user = identifier("username", user)?;

        Ok(vec![Script::admin(vec![Statement::new(
            "change password",
            format!("ALTER USER {user} PASSWORD E'{}';", escape_literal(password)),
        )])])
    }

    pub fn drop_user(user: &str) -> Result<Vec<Script>> {
        let user = identifier("username", user)?;

        Ok(vec![Script::admin(vec![
            Statement::new(
                "drop owned objects",
                format!("DROP OWNED BY {user} CASCADE;"),
            ),
            Statement::new("drop user", format!("DROP ROLE {user};")),
        ])])
    }

    pub fn drop_database(database: &str) -> Result<Vec<Script>> {
        let database = identifier("database", database)?;

        Ok(vec![Script::admin(vec![
            Statement::new(
                "terminate connections",
                format!(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = '{database}';"
                ),
            ),
            Statement::new("drop database", format!("DROP DATABASE {database};")),
        ])])
    }

    pub fn check_connection() -> Vec<Script> {
        vec![Script::admin(vec![Statement::new(
            "check connection",
            "SELECT 1;",
        )])]
    }
}

/// Runs scripts over a fresh, unpooled PostgreSQL connection per script
pub struct PgRunner {
    options: PgConnectOptions,
    endpoint: String,
    admin_database: String,
}

impl PgRunner {
    pub fn new(config: &BackendConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.hostname)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .ssl_mode(PgSslMode::Disable);

        Self {
            options,
            endpoint: format!("{}:{}", config.hostname, config.port),
            admin_database: config.admin_database().to_string(),
        }
    }

    fn database_for<'a>(&'a self, target: &'a Target) -> &'a str {
        match target {
            Target::Admin => &self.admin_database,
            Target::Database(database) => database,
        }
    }
}

#[async_trait]
impl ScriptRunner for PgRunner {
    async fn run(&self, script: &Script) -> Result<()> {
        let database = self.database_for(&script.target);
        let target = format!("{}/{}", self.endpoint, database);
        let options = self.options.clone().database(database);

        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(|source| ProvisionError::Connection {
                target: target.clone(),
                source,
            })?;

        let result = execute_all(&mut conn, &script.statements).await;

        if let Err(e) = conn.close().await {
            warn!(target = %target, error = %e, "Failed to close PostgreSQL connection");
        }

        result
    }
}

async fn execute_all(conn: &mut PgConnection, statements: &[Statement]) -> Result<()> {
    for statement in statements {
        debug!(step = statement.purpose(), "Executing PostgreSQL statement");
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(statement.sql()))
            .await
            .map_err(|source| ProvisionError::Backend {
                step: statement.purpose(),
                source,
            })?;
    }
    Ok(())
}

/// PostgreSQL backend
pub struct PgBackend {
    runner: Arc<dyn ScriptRunner>,
}

impl PgBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self::with_runner(Arc::new(PgRunner::new(config)))
    }

    pub fn with_runner(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { runner }
    }

    async fn execute(&self, scripts: Vec<Script>) -> Result<()> {
        for script in &scripts {
            self.runner.run(script).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for PgBackend {
    fn kind(&self) -> BackendFamily {
        BackendFamily::Postgres
    }

    async fn create_user(&self, user: &str, password: &str, database: &str) -> Result<()> {
        self.execute(plan::create_user(user, password, database)?)
            .await
    }

    async fn create_database(
        &self,
        database: &str,
        owner: &str,
        extensions: &[String],
    ) -> Result<()> {
        self.execute(plan::create_database(database, owner, extensions)?)
            .await
    }

    async fn create_ro_user(&self, user: &str, password: &str, database: &str) -> Result<()> {
        self.execute(plan::create_ro_user(user, password, database)?)
            .await
    }

    async fn change_password(&self, user: &str, password: &str) -> Result<()> {
        self.execute(plan::change_password(user, password)?).await
    }

    async fn drop_user(&self, user: &str) -> Result<()> {
        self.execute(plan::drop_user(user)?).await
    }

    async fn drop_database(&self, database: &str) -> Result<()> {
        self.execute(plan::drop_database(database)?).await
    }

    async fn check_connection(&self) -> Result<()> {
        self.execute(plan::check_connection()).await
    }
}
