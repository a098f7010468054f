//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use storage_service::domain::{BackendFamily, OutcomeState};
use storage_service::infra::{
    Backend, BackendConfig, BackendFactory, BackendRegistry, MessagePublisher, MySqlBackend,
    PgBackend, ProvisionError, Result, Script, ScriptRunner, Target,
};
use storage_service::metrics::MetricsRegistry;
use storage_service::processor::{EventProcessor, StateReporter, SubjectRouter};

/// Registry with one MariaDB and one PostgreSQL instance, both aliased `main`
pub const TEST_DATABASES: &str =
    "main:mariadb:10.0.0.10:3306:root:rootpw;main:pgsql:10.0.0.20:5432:postgres:pgpw";

pub const MARIADB_EVENTS: &str = "admin.storages.mariadb.main.events";
pub const MARIADB_STATES: &str = "admin.storages.mariadb.main.states";
pub const PGSQL_EVENTS: &str = "admin.storages.pgsql.main.events";
pub const PGSQL_STATES: &str = "admin.storages.pgsql.main.states";

/// A script as the runner saw it
#[derive(Debug, Clone)]
pub struct RecordedScript {
    pub target: Target,
    pub purposes: Vec<&'static str>,
    pub sql: Vec<String>,
}

/// Script runner that records scripts instead of touching an engine.
///
/// Can be told to fail the script containing a statement with a given purpose.
#[derive(Default)]
pub struct RecordingRunner {
    scripts: Mutex<Vec<RecordedScript>>,
    fail_on: Option<&'static str>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(purpose: &'static str) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(Vec::new()),
            fail_on: Some(purpose),
        })
    }

    pub fn scripts(&self) -> Vec<RecordedScript> {
        self.scripts.lock().unwrap().clone()
    }

    pub fn statement_count(&self) -> usize {
        self.scripts().iter().map(|s| s.sql.len()).sum()
    }

    pub fn all_sql(&self) -> Vec<String> {
        self.scripts().into_iter().flat_map(|s| s.sql).collect()
    }
}

#[async_trait]
impl ScriptRunner for RecordingRunner {
    async fn run(&self, script: &Script) -> Result<()> {
        let mut executed = RecordedScript {
            target: script.target.clone(),
            purposes: Vec::new(),
            sql: Vec::new(),
        };

        let mut result = Ok(());
        for statement in &script.statements {
            if self.fail_on == Some(statement.purpose()) {
                result = Err(ProvisionError::Backend {
                    step: statement.purpose(),
                    source: sqlx::Error::Protocol("simulated engine failure".to_string()),
                });
                break;
            }
            executed.purposes.push(statement.purpose());
            executed.sql.push(statement.sql().to_string());
        }

        self.scripts.lock().unwrap().push(executed);
        result
    }
}

/// Builds real backends that run their scripts on a shared recording runner
pub struct RecordingBackendFactory {
    runner: Arc<RecordingRunner>,
    builds: AtomicUsize,
}

impl RecordingBackendFactory {
    pub fn new(runner: Arc<RecordingRunner>) -> Arc<Self> {
        Arc::new(Self {
            runner,
            builds: AtomicUsize::new(0),
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl BackendFactory for RecordingBackendFactory {
    fn build(&self, config: &BackendConfig) -> Box<dyn Backend> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let runner: Arc<dyn ScriptRunner> = self.runner.clone();
        match config.dbtype.family() {
            BackendFamily::MySql => Box::new(MySqlBackend::with_runner(config.dbtype, runner)),
            BackendFamily::Postgres => Box::new(PgBackend::with_runner(runner)),
        }
    }
}

/// Publisher that keeps every message in memory
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, Bytes)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn messages(&self) -> Vec<(String, Bytes)> {
        self.messages.lock().unwrap().clone()
    }

    /// Published outcome states, decoded
    pub fn states(&self) -> Vec<(String, OutcomeState)> {
        self.messages()
            .into_iter()
            .map(|(subject, payload)| {
                let state: OutcomeState = serde_json::from_slice(&payload).unwrap();
                (subject, state)
            })
            .collect()
    }
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        if self.fail {
            return Err(ProvisionError::Reporting("publisher offline".to_string()));
        }
        self.messages.lock().unwrap().push((subject, payload));
        Ok(())
    }
}

/// Everything an end-to-end processor test needs to inspect
pub struct Harness {
    pub processor: EventProcessor,
    pub runner: Arc<RecordingRunner>,
    pub factory: Arc<RecordingBackendFactory>,
    pub publisher: Arc<RecordingPublisher>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(RecordingRunner::new(), RecordingPublisher::new())
    }

    pub fn with(runner: Arc<RecordingRunner>, publisher: Arc<RecordingPublisher>) -> Self {
        let registry = Arc::new(BackendRegistry::parse(TEST_DATABASES).unwrap());
        let factory = RecordingBackendFactory::new(runner.clone());
        let metrics = Arc::new(MetricsRegistry::new());

        let processor = EventProcessor::new(
            SubjectRouter::new(registry, factory.clone()),
            StateReporter::new(publisher.clone()),
            metrics.clone(),
        );

        Self {
            processor,
            runner,
            factory,
            publisher,
            metrics,
        }
    }
}

/// The reference "created" event
pub fn created_event() -> serde_json::Value {
    json!({
        "event_type": "created",
        "db_id": 29,
        "db_name": "testdb",
        "username": "testdb",
        "password": "secret",
        "extensions": []
    })
}

pub fn event_with(event_type: &str) -> serde_json::Value {
    let mut event = created_event();
    event["event_type"] = json!(event_type);
    event
}

pub fn payload(event: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(event).unwrap()
}
