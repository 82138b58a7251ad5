//! Prometheus metrics for SQS consumers

use crate::outcome::ExecuteResult;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

static EXPORTER: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus recorder with an HTTP scrape endpoint
///
/// Must run inside a tokio runtime. Subsequent calls are no-ops and return
/// the address bound first.
pub fn init_metrics(listen: SocketAddr) -> Result<SocketAddr, BuildError> {
    EXPORTER
        .get_or_try_init(|| {
            PrometheusBuilder::new()
                .with_http_listener(listen)
                .install()?;
            info!(addr = %listen, "Prometheus exporter listening");
            Ok::<_, BuildError>(listen)
        })
        .copied()
}

/// Per-handler metrics helper
#[derive(Debug, Clone)]
pub struct ConsumerMetrics {
    handler: String,
    queue: String,
}

impl ConsumerMetrics {
    pub fn new(handler: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            queue: queue.into(),
        }
    }

    /// Record a received batch
    pub fn messages_received(&self, count: usize) {
        counter!(
            "sqs_worker_messages_received_total",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone()
        )
        .increment(count as u64);
    }

    /// Record a resolved execution
    pub fn execution(&self, result: ExecuteResult, duration: Duration) {
        counter!(
            "sqs_worker_executions_total",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone(),
            "result" => result.as_ref().to_string()
        )
        .increment(1);

        histogram!(
            "sqs_worker_execution_duration_seconds",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a handler failure (before classification)
    pub fn handler_failed(&self) {
        counter!(
            "sqs_worker_handler_failures_total",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    /// Record a finalization that could not complete
    pub fn finalize_failed(&self, reason: &'static str) {
        counter!(
            "sqs_worker_finalize_errors_total",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn receive_failed(&self) {
        counter!(
            "sqs_worker_receive_errors_total",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone()
        )
        .increment(1);
    }

    /// Record a lifecycle subscriber error
    pub fn subscriber_failed(&self, signal: &'static str) {
        counter!(
            "sqs_worker_subscriber_errors_total",
            "handler" => self.handler.clone(),
            "signal" => signal
        )
        .increment(1);
    }

    /// Update the in-flight executions gauge
    pub fn in_flight(&self, count: usize) {
        gauge!(
            "sqs_worker_in_flight",
            "handler" => self.handler.clone(),
            "queue" => self.queue.clone()
        )
        .set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_without_recorder() {
        let metrics = ConsumerMetrics::new("orders", "http://q/orders");
        assert_eq!(metrics.handler, "orders");
        assert_eq!(metrics.queue, "http://q/orders");

        // No recorder installed: recording is a no-op
        metrics.messages_received(3);
        metrics.execution(ExecuteResult::Deletable, Duration::from_millis(12));
        metrics.in_flight(1);
    }
}
