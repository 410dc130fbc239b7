//! Prometheus metrics registry for the scheduler.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the scheduler and the status server.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`) when the status server is enabled.

use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};

use crate::alerts::Severity;

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Completed polling cycles.
    pub cycles_total: Counter,
    /// Location fetches that failed with a transport error.
    pub fetch_errors_total: Counter,
    /// Slot records dropped for missing or unparseable start times.
    pub malformed_slots_total: Counter,
    /// Slots that passed the filter for the first time.
    pub new_slots_total: Counter,
    /// Notifications handed to the notifier, by severity.
    pub notifications_total: CounterVec,
    /// Notifications no target accepted.
    pub notification_failures_total: Counter,
    /// Identities held by the dedup store after the last cycle.
    pub dedup_records: Gauge,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Returns an error if any metric
    /// name is invalid or duplicated (should not happen in practice).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycles_total = Counter::with_opts(Opts::new(
            "ttp_scheduler_cycles_total",
            "Completed polling cycles",
        ))?;

        let fetch_errors_total = Counter::with_opts(Opts::new(
            "ttp_scheduler_fetch_errors_total",
            "Failed location fetches",
        ))?;

        let malformed_slots_total = Counter::with_opts(Opts::new(
            "ttp_scheduler_malformed_slots_total",
            "Slot records dropped as malformed",
        ))?;

        let new_slots_total = Counter::with_opts(Opts::new(
            "ttp_scheduler_new_slots_total",
            "Newly eligible slots discovered",
        ))?;

        let notifications_total = CounterVec::new(
            Opts::new(
                "ttp_scheduler_notifications_total",
                "Notifications dispatched by severity",
            ),
            &["severity"],
        )?;

        let notification_failures_total = Counter::with_opts(Opts::new(
            "ttp_scheduler_notification_failures_total",
            "Notifications that reached no target",
        ))?;

        let dedup_records = Gauge::with_opts(Opts::new(
            "ttp_scheduler_dedup_records",
            "Slot identities held by the dedup store",
        ))?;

        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(fetch_errors_total.clone()))?;
        registry.register(Box::new(malformed_slots_total.clone()))?;
        registry.register(Box::new(new_slots_total.clone()))?;
        registry.register(Box::new(notifications_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(dedup_records.clone()))?;

        Ok(Self {
            cycles_total,
            fetch_errors_total,
            malformed_slots_total,
            new_slots_total,
            notifications_total,
            notification_failures_total,
            dedup_records,
            registry,
        })
    }

    pub fn notification_sent(&self, severity: Severity) {
        self.notifications_total
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    pub fn notifications_with(&self, severity: Severity) -> f64 {
        self.notifications_total
            .with_label_values(&[severity.as_str()])
            .get()
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
