//! Prometheus metrics for Croupier components.
//!
//! All metrics follow the naming convention: `croupier_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., bus_messages_published_total)
//! - **Gauge**: Value that can go up or down (e.g., registry_services)
//! - **Histogram**: Distribution of values (e.g., bus_delivery_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BROKER METRICS
    // =========================================================================

    /// Messages accepted by `publish`
    pub static ref BUS_MESSAGES_PUBLISHED: Counter = Counter::new(
        "croupier_bus_messages_published_total",
        "Total messages accepted by the broker"
    ).expect("metric creation failed");

    /// Handler invocations by outcome
    pub static ref BUS_DELIVERIES: CounterVec = CounterVec::new(
        Opts::new("croupier_bus_deliveries_total", "Handler invocations"),
        &["outcome"]  // outcome: handled/failed/panicked
    ).expect("metric creation failed");

    /// Handler duration
    pub static ref BUS_DELIVERY_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "croupier_bus_delivery_duration_seconds",
            "Time spent inside subscriber handlers"
        ).buckets(exponential_buckets(0.0001, 2.0, 15).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Redeliveries of unacknowledged messages
    pub static ref BUS_ACK_RETRIES: Counter = Counter::new(
        "croupier_bus_ack_retries_total",
        "Total redeliveries caused by missing acknowledgments"
    ).expect("metric creation failed");

    /// Terminal acknowledgment states
    pub static ref BUS_ACK_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("croupier_bus_ack_outcomes_total", "Terminal acknowledgment outcomes"),
        &["outcome"]  // outcome: acked/failed
    ).expect("metric creation failed");

    // =========================================================================
    // REGISTRY METRICS
    // =========================================================================

    /// Services currently known to the registry
    pub static ref REGISTRY_SERVICES: Gauge = Gauge::new(
        "croupier_registry_services",
        "Number of services known to the registry"
    ).expect("metric creation failed");

    // =========================================================================
    // SUPERVISOR METRICS
    // =========================================================================

    /// Live supervised processes
    pub static ref SUPERVISOR_PROCESSES: Gauge = Gauge::new(
        "croupier_supervisor_processes",
        "Number of external processes under supervision"
    ).expect("metric creation failed");

    /// Process exits by kind
    pub static ref SUPERVISOR_EXITS: CounterVec = CounterVec::new(
        Opts::new("croupier_supervisor_exits_total", "Supervised process exits"),
        &["kind"]  // kind: stopped/exited/crashed
    ).expect("metric creation failed");

    // =========================================================================
    // SHUTDOWN METRICS
    // =========================================================================

    /// Participant teardown results
    pub static ref SHUTDOWN_PARTICIPANTS: CounterVec = CounterVec::new(
        Opts::new("croupier_shutdown_participants_total", "Shutdown participant outcomes"),
        &["outcome"]  // outcome: ok/failed/timed_out/panicked/skipped
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; metrics already registered are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Broker
        Box::new(BUS_MESSAGES_PUBLISHED.clone()),
        Box::new(BUS_DELIVERIES.clone()),
        Box::new(BUS_DELIVERY_DURATION.clone()),
        Box::new(BUS_ACK_RETRIES.clone()),
        Box::new(BUS_ACK_OUTCOMES.clone()),
        // Registry
        Box::new(REGISTRY_SERVICES.clone()),
        // Supervisor
        Box::new(SUPERVISOR_PROCESSES.clone()),
        Box::new(SUPERVISOR_EXITS.clone()),
        // Shutdown
        Box::new(SHUTDOWN_PARTICIPANTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics in the Prometheus text exposition format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_counter_increment() {
        BUS_MESSAGES_PUBLISHED.inc();
        assert!(BUS_MESSAGES_PUBLISHED.get() >= 1.0);
    }

    #[test]
    fn test_labelled_counter() {
        BUS_ACK_OUTCOMES.with_label_values(&["acked"]).inc();
        assert!(BUS_ACK_OUTCOMES.with_label_values(&["acked"]).get() >= 1.0);
    }

    #[test]
    fn test_gather_includes_registered_names() {
        register_metrics().unwrap();
        BUS_DELIVERIES.with_label_values(&["handled"]).inc();
        SUPERVISOR_PROCESSES.set(2.0);

        let text = gather_metrics().unwrap();
        assert!(text.contains("croupier_bus_deliveries_total"));
        assert!(text.contains("croupier_supervisor_processes"));
    }
}
