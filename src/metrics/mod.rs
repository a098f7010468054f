//! Metrics for the storage service
//!
//! Counters and latency histograms kept in memory and published
//! periodically as a JSON document on the metrics subject.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::infra::{InFlightTracker, MessagePublisher, ShutdownSignal};

/// Global metrics registry
pub struct MetricsRegistry {
    /// Counter metrics
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,

    /// Gauge metrics (current values)
    gauges: RwLock<HashMap<String, Arc<AtomicU64>>>,

    /// Histogram metrics (bucketed)
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,

    /// Service start time
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Increment a counter
    pub async fn inc_counter(&self, name: &str) {
        self.add_counter(name, 1).await;
    }

    /// Add to a counter
    pub async fn add_counter(&self, name: &str, value: u64) {
        let counters = self.counters.read().await;
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
            return;
        }
        drop(counters);

        let mut counters = self.counters.write().await;
        let counter = counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        counter.fetch_add(value, Ordering::Relaxed);
    }

    /// Set a gauge value
    pub async fn set_gauge(&self, name: &str, value: u64) {
        let gauges = self.gauges.read().await;
        if let Some(gauge) = gauges.get(name) {
            gauge.store(value, Ordering::Relaxed);
            return;
        }
        drop(gauges);

        let mut gauges = self.gauges.write().await;
        gauges.insert(name.to_string(), Arc::new(AtomicU64::new(value)));
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let counters = self.counters.read().await;
        counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn get_gauge(&self, name: &str) -> u64 {
        let gauges = self.gauges.read().await;
        gauges
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Record a histogram observation
    pub async fn observe_histogram(&self, name: &str, value: f64) {
        let histograms = self.histograms.read().await;
        if let Some(histogram) = histograms.get(name) {
            histogram.observe(value);
            return;
        }
        drop(histograms);

        let mut histograms = self.histograms.write().await;
        let histogram = histograms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::default()));
        histogram.observe(value);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get all metrics as JSON
    pub async fn to_json(&self) -> serde_json::Value {
        let counters = self.counters.read().await;
        let gauges = self.gauges.read().await;
        let histograms = self.histograms.read().await;

        let counter_values: HashMap<String, u64> = counters
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        let gauge_values: HashMap<String, u64> = gauges
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();

        let histogram_values: HashMap<String, serde_json::Value> = histograms
            .iter()
            .map(|(name, histogram)| (name.clone(), histogram.to_json()))
            .collect();

        serde_json::json!({
            "uptime_seconds": self.uptime_seconds(),
            "counters": counter_values,
            "gauges": gauge_values,
            "histograms": histogram_values,
        })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Simple histogram implementation
pub struct Histogram {
    /// Bucket upper bounds
    buckets: Vec<f64>,

    /// Count per bucket
    counts: Vec<AtomicU64>,

    /// Sum of all observations, in milliseconds
    sum_millis: AtomicU64,

    /// Total count of observations
    count: AtomicU64,
}

impl Histogram {
    pub fn new(buckets: Vec<f64>) -> Self {
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_millis: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record an observation. Values above the last bucket only count
    /// towards sum and count.
    pub fn observe(&self, value: f64) {
        self.sum_millis
            .fetch_add((value * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        if let Some(i) = self.buckets.iter().position(|bucket| value <= *bucket) {
            self.counts[i].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let bucket_counts: Vec<u64> = self
            .counts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect();

        serde_json::json!({
            "buckets": self.buckets,
            "counts": bucket_counts,
            "sum": self.sum_millis.load(Ordering::Relaxed) as f64 / 1000.0,
            "count": self.count(),
        })
    }
}

impl Default for Histogram {
    fn default() -> Self {
        // Provisioning latency in seconds; DDL plus connection setup
        Self::new(vec![
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
        ])
    }
}

/// Predefined metric names
pub mod metric_names {
    // Inbound messages
    pub const MESSAGES_PROCESSED: &str = "storage.messages.processed";
    pub const DECODE_ERRORS: &str = "storage.messages.decode_errors";

    // Event outcomes
    pub const EVENTS_SUCCEEDED: &str = "storage.events.succeeded";
    pub const EVENTS_FAILED: &str = "storage.events.failed";

    // State reporting
    pub const REPORTS_FAILED: &str = "storage.reports.failed";

    // Latency histograms
    pub const EVENT_LATENCY: &str = "storage.event.latency_seconds";

    // Gauges
    pub const EVENTS_IN_FLIGHT: &str = "storage.events.in_flight";
}

/// Periodically publishes the registry on the metrics subject
pub struct MetricsEmitter {
    metrics: Arc<MetricsRegistry>,
    publisher: Arc<dyn MessagePublisher>,
    in_flight: Option<Arc<InFlightTracker>>,
    subject: String,
    ident: String,
}

impl MetricsEmitter {
    pub fn new(
        metrics: Arc<MetricsRegistry>,
        publisher: Arc<dyn MessagePublisher>,
        subject: impl Into<String>,
        ident: impl Into<String>,
    ) -> Self {
        Self {
            metrics,
            publisher,
            in_flight: None,
            subject: subject.into(),
            ident: ident.into(),
        }
    }

    /// Report the in-flight event count as a gauge
    pub fn with_in_flight(mut self, in_flight: Arc<InFlightTracker>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    /// Build the metrics document
    pub async fn snapshot(&self) -> serde_json::Value {
        if let Some(in_flight) = &self.in_flight {
            self.metrics
                .set_gauge(metric_names::EVENTS_IN_FLIGHT, in_flight.active_count())
                .await;
        }

        let mut document = self.metrics.to_json().await;
        if let Some(object) = document.as_object_mut() {
            object.insert("ident".to_string(), self.ident.clone().into());
            object.insert("timestamp".to_string(), Utc::now().to_rfc3339().into());
        }
        document
    }

    /// Publish one snapshot. Failures are logged only.
    pub async fn emit_once(&self) {
        let document = self.snapshot().await;
        let payload = match serde_json::to_vec(&document) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!(error = %e, "Failed to serialize metrics");
                return;
            }
        };

        match self.publisher.publish(self.subject.clone(), payload).await {
            Ok(()) => debug!(subject = %self.subject, "Metrics published"),
            Err(e) => warn!(subject = %self.subject, error = %e, "Failed to publish metrics"),
        }
    }

    /// Emit every `interval` until shutdown
    pub async fn run(self, interval: Duration, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => self.emit_once().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{MockMessagePublisher, ProvisionError, ShutdownCoordinator};

    #[tokio::test]
    async fn test_counter() {
        let registry = MetricsRegistry::new();

        registry.inc_counter("test.counter").await;
        registry.inc_counter("test.counter").await;
        registry.add_counter("test.counter", 5).await;

        assert_eq!(registry.get_counter("test.counter").await, 7);
        assert_eq!(registry.get_counter("missing").await, 0);
    }

    #[tokio::test]
    async fn test_gauge() {
        let registry = MetricsRegistry::new();

        registry.set_gauge("test.gauge", 100).await;
        assert_eq!(registry.get_gauge("test.gauge").await, 100);

        registry.set_gauge("test.gauge", 50).await;
        assert_eq!(registry.get_gauge("test.gauge").await, 50);
    }

    #[tokio::test]
    async fn test_histogram() {
        let registry = MetricsRegistry::new();

        registry.observe_histogram("test.latency", 0.005).await;
        registry.observe_histogram("test.latency", 0.05).await;
        registry.observe_histogram("test.latency", 120.0).await;

        let json = registry.to_json().await;
        let latency = &json["histograms"]["test.latency"];

        assert_eq!(latency["count"].as_u64().unwrap(), 3);
        let counts: u64 = latency["counts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c.as_u64().unwrap())
            .sum();
        assert_eq!(counts, 2);
    }

    #[tokio::test]
    async fn test_snapshot_document() {
        let registry = Arc::new(MetricsRegistry::new());
        registry.inc_counter(metric_names::MESSAGES_PROCESSED).await;

        let tracker = Arc::new(InFlightTracker::new());
        let _guard = tracker.track();

        let emitter = MetricsEmitter::new(
            registry,
            Arc::new(MockMessagePublisher::new()),
            "svc.metrics",
            "storage_service",
        )
        .with_in_flight(tracker);

        let document = emitter.snapshot().await;
        assert_eq!(document["ident"], "storage_service");
        assert!(document["timestamp"].is_string());
        assert_eq!(document["counters"][metric_names::MESSAGES_PROCESSED], 1);
        assert_eq!(document["gauges"][metric_names::EVENTS_IN_FLIGHT], 1);
    }

    #[tokio::test]
    async fn test_emit_once_publishes_on_subject() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .withf(|subject, payload| {
                subject == "svc.metrics"
                    && serde_json::from_slice::<serde_json::Value>(payload).is_ok()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let emitter = MetricsEmitter::new(
            Arc::new(MetricsRegistry::new()),
            Arc::new(publisher),
            "svc.metrics",
            "storage_service",
        );
        emitter.emit_once().await;
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let mut publisher = MockMessagePublisher::new();
        publisher
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(ProvisionError::Reporting("no connection".to_string())));

        let emitter = MetricsEmitter::new(
            Arc::new(MetricsRegistry::new()),
            Arc::new(publisher),
            "svc.metrics",
            "storage_service",
        );
        emitter.emit_once().await;
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let emitter = MetricsEmitter::new(
            Arc::new(MetricsRegistry::new()),
            Arc::new(MockMessagePublisher::new()),
            "svc.metrics",
            "storage_service",
        );

        let handle = tokio::spawn(emitter.run(Duration::from_secs(3600), coordinator.signal()));
        coordinator.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
