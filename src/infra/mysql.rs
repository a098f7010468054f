//! MySQL-family backend (MySQL and MariaDB)
//!
//! Users are always created for any host (`'user'@'%'`). The engine has no
//! extension concept, so `create_database` accepts and ignores the extension
//! list.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use sqlx::Connection;
use tracing::{debug, warn};

use crate::domain::{BackendFamily, DbType};

use super::identifier::{escape_literal, require_identifier};
use super::{
    Backend, BackendConfig, ProvisionError, Result, Script, ScriptRunner, Statement, Target,
};

/// Statement plans for MySQL-family operations.
///
/// Every function validates its identifier arguments first and returns the
/// scripts to run, in order. Nothing here touches the network.
pub mod plan {
    use super::*;

    pub fn create_user(user: &str, password: &str, database: &str) -> Result<Vec<Script>> {
        require_identifier("username", user)?;
        require_identifier("database", database)?;

        Ok(vec![Script::admin(vec![Statement::new(
            "create user",
            format!(
                "CREATE USER '{user}'@'%' IDENTIFIED BY '{}';",
                escape_literal(password)
            ),
        )])])
    }

    pub fn create_database(database: &str, owner: &str) -> Result<Vec<Script>> {
        require_identifier("owner", owner)?;
        require_identifier("database", database)?;

        Ok(vec![Script::admin(vec![
            Statement::new("create database", format!("CREATE DATABASE {database};")),
            Statement::new(
                "grant privileges",
                format!("GRANT ALL PRIVILEGES ON {database}.* TO '{owner}'@'%';"),
            ),
            Statement::new("flush privileges", "FLUSH PRIVILEGES;"),
        ])])
    }

    pub fn create_ro_user(user: &str, password: &str, database: &str) -> Result<Vec<Script>> {
        require_identifier("username", user)?;
        require_identifier("database", database)?;

        Ok(vec![Script::admin(vec![
            Statement::new(
                "create read-only user",
                format!(
                    "CREATE USER '{user}'@'%' IDENTIFIED BY '{}';",
                    escape_literal(password)
                ),
            ),
            Statement::new(
                "grant read-only privileges",
                format!("GRANT SELECT ON {database}.* TO '{user}'@'%';"),
            ),
        ])])
    }

    /// MariaDB still hashes through `PASSWORD()`; MySQL 8 removed it and takes
    /// the plain literal.
    pub fn change_password(dbtype: DbType, user: &str, password: &str) -> Result<Vec<Script>> {
        require_identifier("username", user)?;

        let password = escape_literal(password);
        let sql = match dbtype {
            DbType::Mariadb => format!("SET PASSWORD FOR '{user}'@'%' = PASSWORD('{password}');"),
            _ => format!("SET PASSWORD FOR '{user}'@'%' = '{password}';"),
        };

        Ok(vec![Script::admin(vec![Statement::new(
            "change password",
            sql,
        )])])
    }

    pub fn drop_user(user: &str) -> Result<Vec<Script>> {
        require_identifier("username", user)?;

        Ok(vec![Script::admin(vec![Statement::new(
            "drop user",
            format!("DROP USER '{user}'@'%';"),
        )])])
    }

    pub fn drop_database(database: &str) -> Result<Vec<Script>> {
        require_identifier("database", database)?;

        Ok(vec![Script::admin(vec![Statement::new(
            "drop database",
            format!("DROP DATABASE {database};"),
        )])])
    }

    pub fn check_connection() -> Vec<Script> {
        vec![Script::admin(vec![Statement::new(
            "check connection",
            "SELECT 1;",
        )])]
    }
}

/// Runs scripts over a fresh, unpooled MySQL connection per script
pub struct MySqlRunner {
    options: MySqlConnectOptions,
    endpoint: String,
}

impl MySqlRunner {
    pub fn new(config: &BackendConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.hostname)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Disabled);

        Self {
            options,
            endpoint: format!("{}:{}", config.hostname, config.port),
        }
    }

    fn connect_options(&self, target: &Target) -> (MySqlConnectOptions, String) {
        match target {
            Target::Admin => (self.options.clone(), self.endpoint.clone()),
            Target::Database(database) => (
                self.options.clone().database(database),
                format!("{}/{}", self.endpoint, database),
            ),
        }
    }
}

#[async_trait]
impl ScriptRunner for MySqlRunner {
    async fn run(&self, script: &Script) -> Result<()> {
        let (options, target) = self.connect_options(&script.target);

        let mut conn = MySqlConnection::connect_with(&options)
            .await
            .map_err(|source| ProvisionError::Connection {
                target: target.clone(),
                source,
            })?;

        let result = execute_all(&mut conn, &script.statements).await;

        if let Err(e) = conn.close().await {
            warn!(target = %target, error = %e, "Failed to close MySQL connection");
        }

        result
    }
}

async fn execute_all(conn: &mut MySqlConnection, statements: &[Statement]) -> Result<()> {
    for statement in statements {
        debug!(step = statement.purpose(), "Executing MySQL statement");
        sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(statement.sql()))
            .await
            .map_err(|source| ProvisionError::Backend {
                step: statement.purpose(),
                source,
            })?;
    }
    Ok(())
}

/// MySQL-family backend
pub struct MySqlBackend {
    dbtype: DbType,
    runner: Arc<dyn ScriptRunner>,
}

impl MySqlBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self::with_runner(config.dbtype, Arc::new(MySqlRunner::new(config)))
    }

    pub fn with_runner(dbtype: DbType, runner: Arc<dyn ScriptRunner>) -> Self {
        Self { dbtype, runner }
    }

    async fn execute(&self, scripts: Vec<Script>) -> Result<()> {
        for script in &scripts {
            self.runner.run(script).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MySqlBackend {
    fn kind(&self) -> BackendFamily {
        BackendFamily::MySql
    }

    async fn create_user(&self, user: &str, password: &str, database: &str) -> Result<()> {
        self.execute(plan::create_user(user, password, database)?)
            .await
    }

    async fn create_database(
        &self,
        database: &str,
        owner: &str,
        _extensions: &[String],
    ) -> Result<()> {
        self.execute(plan::create_database(database, owner)?).await
    }

    async fn create_ro_user(&self, user: &str, password: &str, database: &str) -> Result<()> {
        self.execute(plan::create_ro_user(user, password, database)?)
            .await
    }

    async fn change_password(&self, user: &str, password: &str) -> Result<()> {
        self.execute(plan::change_password(self.dbtype, user, password)?)
            .await
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
