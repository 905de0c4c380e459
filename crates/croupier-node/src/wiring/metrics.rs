//! Prometheus recording for broker traffic and shutdown outcomes.

use std::time::Duration;

use croupier_bus::{AckOutcome, Delivery, DeliveryOutcome, Middleware};
use croupier_lifecycle::{ShutdownParticipantError, ShutdownReport};
use croupier_telemetry::metrics::{
    BUS_ACK_OUTCOMES, BUS_ACK_RETRIES, BUS_DELIVERIES, BUS_DELIVERY_DURATION,
    BUS_MESSAGES_PUBLISHED, SHUTDOWN_PARTICIPANTS,
};
use croupier_types::{Message, MessageId};

/// Broker middleware feeding the `croupier_bus_*` metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsMiddleware;

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    fn on_publish(&self, _message: &Message, _delivered_to: usize) {
        BUS_MESSAGES_PUBLISHED.inc();
    }

    fn on_delivered(&self, _delivery: &Delivery, outcome: &DeliveryOutcome, elapsed: Duration) {
        BUS_DELIVERIES.with_label_values(&[outcome.as_str()]).inc();
        BUS_DELIVERY_DURATION.observe(elapsed.as_secs_f64());
    }

    fn on_retry(&self, _message_id: &MessageId, _attempt: u32) {
        BUS_ACK_RETRIES.inc();
    }

    fn on_ack_outcome(&self, _message_id: &MessageId, outcome: &AckOutcome) {
        let label = match outcome {
            AckOutcome::Acked { .. } => "acked",
            AckOutcome::Failed { .. } => "failed",
            AckOutcome::NotTracked => return,
        };
        BUS_ACK_OUTCOMES.with_label_values(&[label]).inc();
    }
}

/// Metric label for one participant outcome.
#[must_use]
pub fn outcome_label(result: &Result<(), ShutdownParticipantError>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(ShutdownParticipantError::Failed { .. }) => "failed",
        Err(ShutdownParticipantError::TimedOut { .. }) => "timed_out",
        Err(ShutdownParticipantError::Panicked { .. }) => "panicked",
        Err(ShutdownParticipantError::Skipped { .. }) => "skipped",
    }
}

/// Count every participant outcome of a finished shutdown.
pub fn record_shutdown_report(report: &ShutdownReport) {
    for outcome in &report.outcomes {
        SHUTDOWN_PARTICIPANTS
            .with_label_values(&[outcome_label(&outcome.result)])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use croupier_lifecycle::ParticipantOutcome;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&Ok(())), "ok");
        assert_eq!(
            outcome_label(&Err(ShutdownParticipantError::Skipped {
                participant_id: "broker".into()
            })),
            "skipped"
        );
        assert_eq!(
            outcome_label(&Err(ShutdownParticipantError::TimedOut {
                participant_id: "registry".into(),
                after: Duration::from_secs(5),
            })),
            "timed_out"
        );
    }

    #[test]
    fn test_record_shutdown_report_counts_outcomes() {
        let before = SHUTDOWN_PARTICIPANTS.with_label_values(&["panicked"]).get();
        let report = ShutdownReport {
            reason: "test".into(),
            elapsed: Duration::from_millis(3),
            outcomes: vec![ParticipantOutcome {
                participant_id: "service:echo".into(),
                priority: 50,
                elapsed: Duration::from_millis(1),
                result: Err(ShutdownParticipantError::Panicked {
                    participant_id: "service:echo".into(),
                }),
            }],
        };

        record_shutdown_report(&report);
        assert!(SHUTDOWN_PARTICIPANTS.with_label_values(&["panicked"]).get() >= before + 1.0);
    }

    #[test]
    fn test_ack_outcome_not_tracked_is_ignored() {
        let middleware = MetricsMiddleware;
        let before = BUS_ACK_OUTCOMES.with_label_values(&["acked"]).get();
        middleware.on_ack_outcome(&MessageId::from("m1"), &AckOutcome::Acked { retries: 0 });
        middleware.on_ack_outcome(&MessageId::from("m2"), &AckOutcome::NotTracked);
        assert!(BUS_ACK_OUTCOMES.with_label_values(&["acked"]).get() >= before + 1.0);
        assert_eq!(middleware.name(), "metrics");
    }
}
