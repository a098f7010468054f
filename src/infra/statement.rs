//! Statement plans for backend operations
//!
//! Every backend operation is first turned into a list of [`Script`]s: a
//! connection [`Target`] plus the statements to issue on it, in order.
//! Planning validates every identifier, so an invalid argument is rejected
//! before a connection is opened. Running a plan opens one connection per
//! script and stops at the first failing statement.

use std::fmt;

/// Database a script connects to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The backend's administrative database
    Admin,
    /// A named database, e.g. one created earlier in the same operation
    Database(String),
}

/// One administrative statement.
///
/// The purpose is what gets reported when the statement fails; the SQL text
/// may embed a password and is never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Statement {
    purpose: &'static str,
    sql: String,
}

impl Statement {
    pub fn new(purpose: &'static str, sql: impl Into<String>) -> Self {
        Self {
            purpose,
            sql: sql.into(),
        }
    }

    pub fn purpose(&self) -> &'static str {
        self.purpose
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

/// Statements sharing one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub target: Target,
    pub statements: Vec<Statement>,
}

impl Script {
    pub fn admin(statements: Vec<Statement>) -> Self {
        Self {
            target: Target::Admin,
            statements,
        }
    }

    pub fn on_database(database: impl Into<String>, statements: Vec<Statement>) -> Self {
        Self {
            target: Target::Database(database.into()),
            statements,
        }
    }

    /// Purposes of the statements, in execution order
    pub fn purposes(&self) -> Vec<&'static str> {
        self.statements.iter().map(Statement::purpose).collect()
    }
}
