//! Queue client abstraction
//!
//! `QueueClient` is the capability the scheduler and executor need from the
//! queue service. `AwsSqsClient` implements it over aws-sdk-sqs. Tests use the
//! generated `MockQueueClient` or an in-memory queue.

use crate::error::WorkerError;
use crate::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;

/// Queue attribute holding the dead-letter redrive policy
pub const REDRIVE_POLICY: &str = "RedrivePolicy";

/// One long-poll receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub visibility_timeout: i32,
    pub max_messages: i32,
    pub wait_time_seconds: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub queue_url: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeVisibilityRequest {
    pub queue_url: String,
    pub receipt_handle: String,
    pub visibility_timeout: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub queue_url: String,
    pub body: String,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAttributesRequest {
    pub queue_url: String,
    pub attribute_names: Vec<String>,
}

/// Queue service operations used by the consumer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive up to `max_messages`, requesting all system and message attributes
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, WorkerError>;

    async fn delete(&self, request: &DeleteRequest) -> Result<(), WorkerError>;

    async fn change_visibility(&self, request: &ChangeVisibilityRequest)
    -> Result<(), WorkerError>;

    async fn send(&self, request: &SendRequest) -> Result<(), WorkerError>;

    /// Resolve a queue name to its URL
    async fn get_queue_url(&self, queue_name: &QueueName) -> Result<String, WorkerError>;

    async fn get_queue_attributes(
        &self,
        request: &QueueAttributesRequest,
    ) -> Result<HashMap<String, String>, WorkerError>;
}

/// Logical queue name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueName(pub String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
