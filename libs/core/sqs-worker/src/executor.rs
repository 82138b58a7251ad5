//! Per-message execution and finalization
//!
//! Every execution resolves to exactly one `ExecuteResult` and then attempts
//! exactly one finalization:
//!
//! | Result               | Queue action                                  |
//! |----------------------|-----------------------------------------------|
//! | `Deletable`/`Reject` | delete                                        |
//! | `Retry`              | visibility timeout set to 0                   |
//! | `SendDlq`            | send body and FIFO ids to the DLQ, then delete |

use crate::client::{ChangeVisibilityRequest, DeleteRequest, QueueClient, SendRequest};
use crate::descriptor::HandlerDescriptor;
use crate::error::WorkerError;
use crate::event::{HandlerResultEvent, MissingReceiptHandleEvent};
use crate::message::Message;
use crate::metrics::ConsumerMetrics;
use crate::outcome::{ExecuteResult, HandlerOutcome};
use crate::signal::SignalBus;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Failure details reported by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
struct FailureReport {
    message: String,
    trace: Option<String>,
}

/// Runs one message through its handler and finalizes it
#[derive(Clone)]
pub struct Executor {
    descriptor: Arc<HandlerDescriptor>,
    client: Arc<dyn QueueClient>,
    signals: Arc<SignalBus>,
    metrics: ConsumerMetrics,
}

impl Executor {
    pub fn new(
        descriptor: Arc<HandlerDescriptor>,
        client: Arc<dyn QueueClient>,
        signals: Arc<SignalBus>,
    ) -> Self {
        let metrics = ConsumerMetrics::new(descriptor.name(), descriptor.queue_label());
        Self {
            descriptor,
            client,
            signals,
            metrics,
        }
    }

    pub fn descriptor(&self) -> &Arc<HandlerDescriptor> {
        &self.descriptor
    }

    /// Execute and finalize one message
    ///
    /// A `handler_result` subscriber error does not prevent finalization; it is
    /// returned once finalization succeeded.
    pub async fn execute(&self, message: Message) -> Result<ExecuteResult, WorkerError> {
        let retry = message.retry_count();
        let span = info_span!(
            "execute",
            handler = %self.descriptor.name(),
            message_id = %message.id(),
            retry
        );

        async move {
            let started = Instant::now();
            let (result, failure) = self.run_handler(&message, retry).await;
            self.metrics.execution(result, started.elapsed());

            let event = HandlerResultEvent {
                handler: self.descriptor.name().to_string(),
                message_id: message.id().to_string(),
                result,
                retry,
                error: failure.as_ref().map(|f| f.message.clone()),
                trace: failure.and_then(|f| f.trace),
                at: Utc::now(),
            };
            let emitted = self.signals.handler_result.send(&event);
            if let Err(e) = &emitted {
                self.metrics.subscriber_failed("handler_result");
                warn!(error = %e, "handler_result subscriber failed");
            }

            self.finalize(result, &message).await?;
            emitted?;
            Ok(result)
        }
        .instrument(span)
        .await
    }

    async fn run_handler(
        &self,
        message: &Message,
        retry: u32,
    ) -> (ExecuteResult, Option<FailureReport>) {
        if self.descriptor.is_max_retry(retry) {
            info!(
                max_retry_count = self.descriptor.config().max_retry_count,
                "Retry limit reached, rejecting without invoking handler"
            );
            return (ExecuteResult::Reject, None);
        }

        let outcome = match self.descriptor.delivery(message, retry) {
            Ok(delivery) => {
                let handler = self.descriptor.handler().clone();
                AssertUnwindSafe(handler.handle(&self.descriptor, delivery))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        HandlerOutcome::failure(format!(
                            "handler panicked: {}",
                            panic_message(panic.as_ref())
                        ))
                    })
            }
            Err(e) => HandlerOutcome::failure(format!("failed to decode message body: {e}")),
        };

        let result = ExecuteResult::classify(&outcome, self.descriptor.config().deletable_on_error);
        match outcome {
            HandlerOutcome::Failure {
                message: error,
                trace,
            } => {
                self.metrics.handler_failed();
                warn!(
                    error = %error,
                    trace = trace.as_deref().unwrap_or_default(),
                    result = %result,
                    "Handler failed"
                );
                (
                    result,
                    Some(FailureReport {
                        message: error,
                        trace,
                    }),
                )
            }
            outcome => {
                debug!(outcome = ?outcome, result = %result, "Handler finished");
                (result, None)
            }
        }
    }

    /// Apply the queue action for `result`
    pub async fn finalize(
        &self,
        result: ExecuteResult,
        message: &Message,
    ) -> Result<(), WorkerError> {
        let Some(receipt_handle) = message.receipt_handle.as_deref() else {
            return Err(self.missing_receipt_handle(result, message));
        };
        let queue_url = self
            .descriptor
            .queue_url()
            .ok_or_else(|| WorkerError::Internal("queue URL not resolved".into()))?;

        let outcome = match result {
            ExecuteResult::Deletable | ExecuteResult::Reject => {
                self.delete(queue_url, receipt_handle).await
            }
            ExecuteResult::Retry => {
                self.client
                    .change_visibility(&ChangeVisibilityRequest {
                        queue_url: queue_url.to_string(),
                        receipt_handle: receipt_handle.to_string(),
                        visibility_timeout: 0,
                    })
                    .await
            }
            ExecuteResult::SendDlq => self.send_to_dead_letter(queue_url, receipt_handle, message).await,
            ExecuteResult::Nil => Err(WorkerError::Internal(
                "execution finished without an outcome".into(),
            )),
        };

        match &outcome {
            Ok(()) => debug!(result = %result, "Message finalized"),
            Err(e) => {
                self.metrics.finalize_failed("queue");
                error!(error = %e, result = %result, "Failed to finalize message");
            }
        }
        outcome
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), WorkerError> {
        self.client
            .delete(&DeleteRequest {
                queue_url: queue_url.to_string(),
                receipt_handle: receipt_handle.to_string(),
            })
            .await
    }

    async fn send_to_dead_letter(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        message: &Message,
    ) -> Result<(), WorkerError> {
        let dlq_url = self.descriptor.dead_letter_queue_url().ok_or_else(|| {
            WorkerError::DeadLetterNotConfigured {
                queue_url: queue_url.to_string(),
            }
        })?;

        self.client
            .send(&SendRequest {
                queue_url: dlq_url.to_string(),
                body: message.body().to_string(),
                group_id: message.group_id().map(str::to_string),
                deduplication_id: message.deduplication_id().map(str::to_string),
            })
            .await?;
        info!(dlq_url = %dlq_url, "Moved message to dead-letter queue");

        self.delete(queue_url, receipt_handle).await
    }

    fn missing_receipt_handle(&self, result: ExecuteResult, message: &Message) -> WorkerError {
        self.metrics.finalize_failed("missing_receipt_handle");
        error!(result = %result, "Message has no receipt handle, leaving it to visibility expiry");

        let event = MissingReceiptHandleEvent {
            handler: self.descriptor.name().to_string(),
            message_id: message.id().to_string(),
            result,
            at: Utc::now(),
        };
        let subscriber = self
            .signals
            .missing_receipt_handle
            .send(&event)
            .inspect_err(|e| {
                self.metrics.subscriber_failed("missing_receipt_handle");
                warn!(error = %e, "missing_receipt_handle subscriber failed");
            })
            .err();

        WorkerError::MissingReceiptHandle {
            message_id: message.id().to_string(),
            subscriber,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
