//! NATS service bootstrap for the storage service.
//!
//! This module wires together:
//! - configuration
//! - the NATS connection and one subscription per configured backend
//! - the event processor, with one task per inbound message
//! - periodic metrics emission
//! - graceful shutdown

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_nats::{ConnectOptions, Subscriber};
use futures::StreamExt;
use tracing::{error, info, warn, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::infra::{
    shutdown_signal, BackendRegistry, InFlightTracker, MessagePublisher, ProvisionError,
    ShutdownCoordinator, ShutdownSignal, SqlBackendFactory,
};
use crate::metrics::{MetricsEmitter, MetricsRegistry};
use crate::processor::{subjects, EventProcessor, NatsPublisher, StateReporter, SubjectRouter};
use crate::telemetry::{
    extract_context_from_headers, init_telemetry, shutdown_telemetry, TelemetryConfig,
};

/// Client name announced to the NATS server
pub const CLIENT_NAME: &str = "storage-service";

/// Service configuration.
#[derive(Clone)]
pub struct Config {
    /// NATS server URL.
    pub nats_url: String,
    /// Optional NATS auth token.
    pub nats_token: Option<String>,
    /// Configured database engine instances.
    pub registry: BackendRegistry,
    /// Subject for periodic metrics.
    pub metrics_subject: String,
    /// Service identity inside metrics messages.
    pub metrics_ident: String,
    /// Metrics emission period; `None` disables emission.
    pub metrics_interval: Option<Duration>,
    /// How long shutdown waits for in-flight events.
    pub drain_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ProvisionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ProvisionError::Configuration(format!("{key} is required")))
        };
        let seconds = |key: &str, default: u64| -> Result<u64, ProvisionError> {
            match lookup(key) {
                Some(value) => value.trim().parse().map_err(|e| {
                    ProvisionError::Configuration(format!("invalid {key} '{value}': {e}"))
                }),
                None => Ok(default),
            }
        };

        let nats_url = required("NATS_URL")?;
        let mut registry = BackendRegistry::parse(&required("DATABASES")?)?;
        if let Some(database) = lookup("PG_ADMIN_DATABASE").filter(|db| !db.trim().is_empty()) {
            registry = registry.with_pg_admin_database(database.trim());
        }

        let metrics_interval = match seconds("METRICS_INTERVAL_SECS", 60)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            nats_url,
            nats_token: lookup("NATS_TOKEN").filter(|token| !token.is_empty()),
            registry,
            metrics_subject: lookup("NATS_METRICS_SUBJECT")
                .unwrap_or_else(|| "svc.metrics".to_string()),
            metrics_ident: lookup("METRICS_IDENT")
                .unwrap_or_else(|| "storage_service".to_string()),
            metrics_interval,
            drain_timeout: Duration::from_secs(seconds("SHUTDOWN_DRAIN_TIMEOUT_SECS", 30)?),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("nats_url", &self.nats_url)
            .field("nats_token", &self.nats_token.as_ref().map(|_| "<redacted>"))
            .field("registry", &self.registry)
            .field("metrics_subject", &self.metrics_subject)
            .field("metrics_ident", &self.metrics_ident)
            .field("metrics_interval", &self.metrics_interval)
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

/// Connect to NATS, with token auth when configured.
pub async fn connect(
    nats_url: &str,
    nats_token: Option<&str>,
) -> anyhow::Result<async_nats::Client> {
    let options = match nats_token {
        Some(token) => ConnectOptions::with_token(token.to_string()),
        None => ConnectOptions::new(),
    }
    .name(CLIENT_NAME);

    let client = options
        .connect(nats_url)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to NATS at {nats_url}: {e}"))?;
    Ok(client)
}

/// Run the storage service until SIGINT or SIGTERM.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    info!("Starting storage service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  NATS URL: {}", config.nats_url);
    info!("  Backends: {}", config.registry.len());
    info!("  Metrics subject: {}", config.metrics_subject);

    info!("Connecting to NATS...");
    let client = connect(&config.nats_url, config.nats_token.as_deref()).await?;
    info!("Connected to NATS");

    let registry = Arc::new(config.registry.clone());
    let metrics = Arc::new(MetricsRegistry::new());
    let publisher: Arc<dyn MessagePublisher> = Arc::new(NatsPublisher::new(client.clone()));

    let processor = EventProcessor::new(
        SubjectRouter::new(Arc::clone(&registry), Arc::new(SqlBackendFactory)),
        StateReporter::new(Arc::clone(&publisher)),
        Arc::clone(&metrics),
    );

    let coordinator = ShutdownCoordinator::new();

    let mut listeners = Vec::new();
    for key in registry.keys() {
        let subject = subjects::events(key.dbtype.as_str(), &key.alias);
        match client.subscribe(subject.clone()).await {
            Ok(subscriber) => {
                info!(subject = %subject, "Listening");
                listeners.push(tokio::spawn(listen(
                    subscriber,
                    processor.clone(),
                    coordinator.signal(),
                    coordinator.in_flight(),
                )));
            }
            Err(e) => error!(subject = %subject, error = %e, "Subscribe failed"),
        }
    }

    if listeners.is_empty() {
        anyhow::bail!("no subscription could be established");
    }

    let emitter = config.metrics_interval.map(|interval| {
        let emitter = MetricsEmitter::new(
            Arc::clone(&metrics),
            Arc::clone(&publisher),
            config.metrics_subject.clone(),
            config.metrics_ident.clone(),
        )
        .with_in_flight(coordinator.in_flight());
        tokio::spawn(emitter.run(interval, coordinator.signal()))
    });

    info!("Storage service is ready");
    shutdown_signal().await;

    coordinator.shutdown();
    for listener in listeners {
        if let Err(e) = listener.await {
            warn!(error = %e, "Listener task failed");
        }
    }
    if let Some(emitter) = emitter {
        if let Err(e) = emitter.await {
            warn!(error = %e, "Metrics task failed");
        }
    }

    coordinator.graceful_shutdown(config.drain_timeout).await;

    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS client");
    }

    shutdown_telemetry();
    info!("Storage service stopped");
    Ok(())
}

/// Handle messages from one subscription until shutdown.
///
/// Each message runs on its own task, so slow engine work on one backend
/// does not hold up other messages.
pub async fn listen(
    mut subscriber: Subscriber,
    processor: EventProcessor,
    shutdown: ShutdownSignal,
    in_flight: Arc<InFlightTracker>,
) {
    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            message = subscriber.next() => {
                let Some(message) = message else {
                    warn!("Subscription closed by the server");
                    break;
                };

                let guard = in_flight.track();
                let processor = processor.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    dispatch(&processor, message).await;
                });
            }
        }
    }

    if let Err(e) = subscriber.unsubscribe().await {
        warn!(error = %e, "Failed to unsubscribe");
    }
}

async fn dispatch(processor: &EventProcessor, message: async_nats::Message) {
    let span = EventProcessor::span(&message.subject);
    if let Some(headers) = &message.headers {
        span.set_parent(extract_context_from_headers(headers));
    }

    processor
        .process(&message.subject, &message.payload)
        .instrument(span)
        .await;
}
