//! Event payloads carried by the lifecycle signals

use crate::outcome::ExecuteResult;
use crate::shutdown::ShutdownReason;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Emitted once the queue endpoints are resolved, before the first poll
#[derive(Debug, Clone, Serialize)]
pub struct ReadyEvent {
    pub handler: String,
    pub queue_url: String,
    pub dead_letter_queue_url: Option<String>,
    pub fifo: bool,
    pub max_workers: usize,
    pub at: DateTime<Utc>,
}

/// Emitted after each poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatEvent {
    pub handler: String,
    pub tick: u64,
    /// Messages received in this cycle
    pub received: usize,
    /// Executions currently holding a worker slot
    pub in_flight: usize,
    pub at: DateTime<Utc>,
}

/// Emitted when the scheduler starts draining
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownEvent {
    pub handler: String,
    pub reason: ShutdownReason,
    pub in_flight: usize,
    pub at: DateTime<Utc>,
}

/// Emitted after every execution, before finalization
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResultEvent {
    pub handler: String,
    pub message_id: String,
    pub result: ExecuteResult,
    pub retry: u32,
    /// Failure message when the handler failed
    pub error: Option<String>,
    pub trace: Option<String>,
    pub at: DateTime<Utc>,
}

/// Emitted when finalization finds no receipt handle
#[derive(Debug, Clone, Serialize)]
pub struct MissingReceiptHandleEvent {
    pub handler: String,
    pub message_id: String,
    pub result: ExecuteResult,
    pub at: DateTime<Utc>,
}
