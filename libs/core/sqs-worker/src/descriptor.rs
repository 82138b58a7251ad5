//! Handler descriptor
//!
//! A `HandlerDescriptor` binds a handler to its configuration and to the queue
//! endpoints resolved at startup. Resolved endpoints are written once; the
//! per-message retry count is never stored here.

use crate::client::{QueueAttributesRequest, QueueClient, QueueName, REDRIVE_POLICY};
use crate::config::{ConfigOverrides, HandlerConfig};
use crate::decode::DecodeError;
use crate::error::{ConfigError, WorkerError};
use crate::handler::{Delivery, MessageHandler};
use crate::message::Message;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Suffix identifying FIFO queues
pub const FIFO_SUFFIX: &str = ".fifo";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedrivePolicy {
    #[serde(default)]
    dead_letter_target_arn: String,
}

/// A registered consumer
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: String,
    config: HandlerConfig,
    handler: Arc<dyn MessageHandler>,
    queue_url: OnceLock<String>,
    dead_letter_queue_url: OnceLock<Option<String>>,
}

impl HandlerDescriptor {
    /// Create a descriptor, validating the queue identity
    pub fn new(
        name: impl Into<String>,
        config: HandlerConfig,
        handler: impl MessageHandler + 'static,
    ) -> Result<Self, ConfigError> {
        Self::with_handler(name, config, Arc::new(handler))
    }

    pub fn with_handler(
        name: impl Into<String>,
        config: HandlerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let queue_url = literal_url(&config);
        Ok(Self {
            name: name.into(),
            config,
            handler,
            queue_url,
            dead_letter_queue_url: OnceLock::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    /// Replace the handler function
    pub fn set_handler(&mut self, handler: impl MessageHandler + 'static) {
        self.handler = Arc::new(handler);
    }

    /// Queue URL, once known
    pub fn queue_url(&self) -> Option<&str> {
        self.queue_url.get().map(String::as_str)
    }

    /// Dead-letter queue URL, `None` when unresolved or not configured
    pub fn dead_letter_queue_url(&self) -> Option<&str> {
        self.dead_letter_queue_url.get().and_then(|url| url.as_deref())
    }

    /// Target of log fields: the URL when known, else the logical name
    pub fn queue_label(&self) -> &str {
        self.queue_url()
            .or(self.config.queue_name.as_deref())
            .unwrap_or_default()
    }

    pub fn is_fifo(&self) -> bool {
        self.queue_label().ends_with(FIFO_SUFFIX)
    }

    /// True once `retry` has reached a non-zero `max_retry_count`
    pub fn is_max_retry(&self, retry: u32) -> bool {
        self.config.max_retry_count > 0 && retry >= self.config.max_retry_count
    }

    /// Apply overrides before the scheduler starts
    ///
    /// Resolved endpoints are discarded so the next `resolve` sees the new
    /// identity.
    pub fn update(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if overrides.is_empty() {
            return Ok(());
        }
        let mut config = self.config.clone();
        config.apply(overrides);
        config.validate()?;

        debug!(handler = %self.name, config = ?config, "Handler configuration updated");
        self.queue_url = literal_url(&config);
        self.dead_letter_queue_url = OnceLock::new();
        self.config = config;
        Ok(())
    }

    /// Resolve the queue URL from the logical name, at most once
    pub async fn resolve(&self, client: &dyn QueueClient) -> Result<&str, WorkerError> {
        if let Some(url) = self.queue_url.get() {
            return Ok(url.as_str());
        }

        let name = self
            .config
            .queue_name
            .as_deref()
            .ok_or(ConfigError::MissingQueueIdentity)?;
        let url = client.get_queue_url(&QueueName::new(name)).await?;
        info!(handler = %self.name, queue = %name, queue_url = %url, "Resolved queue URL");

        Ok(self.queue_url.get_or_init(|| url).as_str())
    }

    /// Resolve the dead-letter queue from the queue's redrive policy
    ///
    /// Without a redrive policy the dead-letter URL stays empty; an error is
    /// raised only if a message is later routed there.
    pub async fn resolve_dead_letter(
        &self,
        client: &dyn QueueClient,
    ) -> Result<Option<&str>, WorkerError> {
        if let Some(url) = self.dead_letter_queue_url.get() {
            return Ok(url.as_deref());
        }

        let queue_url = self.resolve(client).await?;
        let attributes = client
            .get_queue_attributes(&QueueAttributesRequest {
                queue_url: queue_url.to_string(),
                attribute_names: vec![REDRIVE_POLICY.to_string()],
            })
            .await?;

        let resolved = match attributes.get(REDRIVE_POLICY).filter(|p| !p.is_empty()) {
            Some(raw) => {
                let policy: RedrivePolicy = serde_json::from_str(raw)
                    .map_err(|e| WorkerError::InvalidRedrivePolicy(e.to_string()))?;
                match dead_letter_queue_name(&policy.dead_letter_target_arn) {
                    Some(name) => {
                        let url = client.get_queue_url(&QueueName::new(name)).await?;
                        info!(handler = %self.name, dlq_url = %url, "Resolved dead-letter queue");
                        Some(url)
                    }
                    None => None,
                }
            }
            None => {
                debug!(handler = %self.name, "No redrive policy, dead-letter queue disabled");
                None
            }
        };

        Ok(self.dead_letter_queue_url.get_or_init(|| resolved).as_deref())
    }

    /// Build the handler input for `message`
    pub fn delivery(&self, message: &Message, retry: u32) -> Result<Delivery, DecodeError> {
        Ok(Delivery {
            message_id: message.id().to_string(),
            retry,
            body: self.config.decoder.decode(message.body())?,
            attributes: message.decoded_attributes(),
            group_id: message.group_id().map(str::to_string),
            deduplication_id: message.deduplication_id().map(str::to_string),
        })
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("queue_url", &self.queue_url.get())
            .field("dead_letter_queue_url", &self.dead_letter_queue_url.get())
            .finish_non_exhaustive()
    }
}

fn literal_url(config: &HandlerConfig) -> OnceLock<String> {
    config
        .queue_url
        .clone()
        .filter(|url| !url.is_empty())
        .map(OnceLock::from)
        .unwrap_or_default()
}

/// Queue name from the last `:` segment of an ARN
fn dead_letter_queue_name(arn: &str) -> Option<&str> {
    arn.rsplit(':').next().filter(|name| !name.is_empty())
}
