//! SQS Worker Framework
//!
//! A polling consumer framework for Amazon SQS.
//!
//! ## Features
//!
//! - **Handler registry**: name → queue config + async handler
//! - **Bounded concurrency**: `max_workers` execution slots per handler
//! - **FIFO ordering**: messages of one `MessageGroupId` never overlap
//! - **Dead Letter Queue**: handlers can redirect messages to the queue's DLQ
//! - **Retry limit**: messages past `max_retry_count` are rejected
//! - **Lifecycle signals**: `ready`, `heartbeat`, `shutdown`, `handler_result`,
//!   `missing_receipt_handle`
//! - **Graceful drain**: SIGHUP/SIGTERM/SIGINT stop polling and wait for in-flight work
//! - **Prometheus metrics**: Built-in observability
//!
//! ## Example
//!
//! ```ignore
//! use sqs_worker::{
//!     ConfigOverrides, HandlerConfig, HandlerOutcome, HandlerRegistry, PollingScheduler,
//!     SessionProvider, SignalBus, SqsClientFactory, handler_fn,
//! };
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(
//!     "orders",
//!     HandlerConfig::for_queue_name("orders.fifo").with_max_workers(4),
//!     handler_fn(|delivery| async move {
//!         tracing::info!(body = %delivery.body, "order received");
//!         HandlerOutcome::Continue
//!     }),
//! )?;
//!
//! let scheduler = PollingScheduler::from_registry(
//!     &registry,
//!     "orders",
//!     ConfigOverrides::default(),
//!     Arc::new(SessionProvider::new(SqsClientFactory)),
//!     Arc::new(SignalBus::new()),
//! )?;
//! scheduler.run_until_signal().await?;
//! ```

mod client;
mod config;
mod decode;
mod descriptor;
mod error;
pub mod event;
mod executor;
mod handler;
mod message;
pub mod metrics;
mod outcome;
mod registry;
mod scheduler;
mod session;
mod shutdown;
mod signal;
mod sqs;

// Re-export main types
pub use client::{
    ChangeVisibilityRequest, DeleteRequest, QueueAttributesRequest, QueueClient, QueueName,
    REDRIVE_POLICY, ReceiveRequest, SendRequest,
};
pub use config::{
    ConfigOverrides, ConnectionProfile, DEFAULT_VISIBILITY_TIMEOUT, DEFAULT_WAIT_TIME_SECONDS,
    HandlerConfig, MAX_BATCH_SIZE, WorkerKind,
};
pub use decode::{Body, BodyDecoder, DecodeError, optional_base64_decode};
pub use descriptor::{FIFO_SUFFIX, HandlerDescriptor};
pub use error::{ConfigError, ErrorScope, WorkerError};
pub use executor::Executor;
pub use handler::{Delivery, FnHandler, MessageHandler, handler_fn};
pub use message::{
    APPROXIMATE_RECEIVE_COUNT, AttributeValue, Attributes, MESSAGE_DEDUPLICATION_ID,
    MESSAGE_GROUP_ID, Message, MessageAttributeValue, decode_attributes, group_by_message_group,
};
pub use self::metrics::{ConsumerMetrics, init_metrics};
pub use outcome::{ExecuteResult, HandlerOutcome};
pub use registry::HandlerRegistry;
pub use scheduler::{PollingScheduler, SchedulerState};
pub use session::{ClientFactory, SessionProvider};
pub use shutdown::{ShutdownCoordinator, ShutdownReason};
pub use signal::{Signal, SignalBus, SignalError, SubscriberError, SubscriptionId};
pub use sqs::{AwsSqsClient, SqsClientFactory};
