//! Built-in handlers and lifecycle subscribers
//!
//! | Name       | Queue                     | Behavior                                  |
//! |------------|---------------------------|-------------------------------------------|
//! | `simple`   | `sqs-worker-simple`       | logs the body, deletes the message        |
//! | `json`     | `sqs-worker-json`         | decodes JSON, rejects non-object bodies   |
//! | `flaky`    | `sqs-worker-flaky`        | asks for redelivery until the third try   |
//! | `fifo_dlq` | `sqs-worker-orders.fifo`  | routes bodies containing `poison` to DLQ  |
//! | `env`      | `SQS_QUEUE_NAME`/`_URL`   | `simple`, configured from `SQS_*`         |

use async_trait::async_trait;
use sqs_worker::{
    BodyDecoder, ConfigError, ConnectionProfile, Delivery, HandlerConfig, HandlerDescriptor,
    HandlerOutcome, HandlerRegistry, MessageHandler, SignalBus, handler_fn,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redeliveries the `flaky` handler asks for before succeeding
const FLAKY_ATTEMPTS: u32 = 2;

/// Registry with every built-in handler
pub fn registry() -> Result<HandlerRegistry, ConfigError> {
    let connection = ConnectionProfile::from_env();
    let mut registry = HandlerRegistry::new();

    registry.register(
        "simple",
        HandlerConfig::for_queue_name("sqs-worker-simple").with_connection(connection.clone()),
        handler_fn(log_body),
    )?;

    registry.register(
        "json",
        HandlerConfig::for_queue_name("sqs-worker-json")
            .with_connection(connection.clone())
            .with_decoder(BodyDecoder::base64_json())
            .with_max_messages(10)
            .with_max_workers(4),
        handler_fn(|delivery: Delivery| async move {
            match delivery.body.as_json() {
                Some(value) if value.is_object() => {
                    info!(message_id = %delivery.message_id, payload = %value, "Received JSON");
                    HandlerOutcome::Continue
                }
                _ => {
                    warn!(message_id = %delivery.message_id, "Not a JSON object, rejecting");
                    HandlerOutcome::Reject
                }
            }
        }),
    )?;

    registry.register(
        "flaky",
        HandlerConfig::for_queue_name("sqs-worker-flaky")
            .with_connection(connection.clone())
            .with_visibility_timeout(5)
            .with_max_retry_count(5),
        handler_fn(|delivery: Delivery| async move {
            if delivery.retry < FLAKY_ATTEMPTS {
                info!(message_id = %delivery.message_id, retry = delivery.retry, "Not yet");
                HandlerOutcome::Retry
            } else {
                info!(message_id = %delivery.message_id, retry = delivery.retry, "Done");
                HandlerOutcome::Continue
            }
        }),
    )?;

    registry.register(
        "fifo_dlq",
        HandlerConfig::for_queue_name("sqs-worker-orders.fifo")
            .with_connection(connection)
            .with_max_messages(10)
            .with_max_workers(2)
            .with_poll_interval(Duration::from_millis(500)),
        DeadLetterRouter::new("poison"),
    )?;

    match HandlerConfig::from_env() {
        Ok(config) => registry.register("env", config, handler_fn(log_body))?,
        Err(ConfigError::MissingQueueIdentity) => {}
        Err(e) => return Err(e),
    }

    Ok(registry)
}

async fn log_body(delivery: Delivery) -> HandlerOutcome {
    info!(
        message_id = %delivery.message_id,
        retry = delivery.retry,
        group_id = ?delivery.group_id,
        body = %delivery.body,
        "Received message"
    );
    HandlerOutcome::Continue
}

/// Sends messages whose body contains `marker` to the dead-letter queue
pub struct DeadLetterRouter {
    marker: String,
}

impl DeadLetterRouter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for DeadLetterRouter {
    async fn handle(&self, descriptor: &HandlerDescriptor, delivery: Delivery) -> HandlerOutcome {
        let poisoned = delivery
            .body
            .as_text()
            .is_some_and(|body| body.contains(&self.marker));

        if poisoned {
            warn!(
                handler = %descriptor.name(),
                message_id = %delivery.message_id,
                group_id = ?delivery.group_id,
                dlq_url = ?descriptor.dead_letter_queue_url(),
                "Routing message to dead-letter queue"
            );
            return HandlerOutcome::SendDlq;
        }

        info!(
            handler = %descriptor.name(),
            message_id = %delivery.message_id,
            group_id = ?delivery.group_id,
            "Order processed"
        );
        HandlerOutcome::Continue
    }
}

/// Log every lifecycle event
pub fn connect_logging(signals: &SignalBus) {
    signals.ready.connect(|event| {
        info!(event = %serde_json::to_string(event)?, "ready");
        Ok(())
    });
    signals.heartbeat.connect(|event| {
        debug!(
            tick = event.tick,
            received = event.received,
            in_flight = event.in_flight,
            "heartbeat"
        );
        Ok(())
    });
    signals.shutdown.connect(|event| {
        info!(event = %serde_json::to_string(event)?, "shutdown");
        Ok(())
    });
    signals.handler_result.connect(|event| {
        match &event.error {
            Some(error) => warn!(
                message_id = %event.message_id,
                result = %event.result,
                retry = event.retry,
                error = %error,
                "handler_result"
            ),
            None => debug!(
                message_id = %event.message_id,
                result = %event.result,
                retry = event.retry,
                "handler_result"
            ),
        }
        Ok(())
    });
    signals.missing_receipt_handle.connect(|event| {
        warn!(message_id = %event.message_id, result = %event.result, "missing_receipt_handle");
        Ok(())
    });
}
