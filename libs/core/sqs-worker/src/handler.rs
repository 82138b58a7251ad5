//! Handler contract
//!
//! A handler receives one `Delivery` at a time and answers with a
//! `HandlerOutcome`. It runs inside a worker slot and may block that slot for
//! as long as it needs; there is no per-handler timeout.
//!
//! ```rust,ignore
//! use sqs_worker::{handler_fn, Delivery, HandlerOutcome};
//!
//! let handler = handler_fn(|delivery: Delivery| async move {
//!     if delivery.retry >= 3 {
//!         return HandlerOutcome::SendDlq;
//!     }
//!     HandlerOutcome::Continue
//! });
//! ```

use crate::decode::Body;
use crate::descriptor::HandlerDescriptor;
use crate::message::Attributes;
use crate::outcome::HandlerOutcome;
use async_trait::async_trait;
use std::future::Future;

/// Everything a handler is given for one message
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: String,
    /// Previous deliveries of this message (0 on first delivery)
    pub retry: u32,
    pub body: Body,
    /// Decoded message attributes, `None` when the message has none
    pub attributes: Option<Attributes>,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

/// Message handler
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message
    async fn handle(&self, descriptor: &HandlerDescriptor, delivery: Delivery) -> HandlerOutcome;
}

/// Handler built from an async closure
pub struct FnHandler<F>(F);

/// Wrap an async closure as a `MessageHandler`
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    async fn handle(&self, _descriptor: &HandlerDescriptor, delivery: Delivery) -> HandlerOutcome {
        (self.0)(delivery).await
    }
}
