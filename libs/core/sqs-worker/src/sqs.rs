//! aws-sdk-sqs implementation of `QueueClient`

use crate::client::{
    ChangeVisibilityRequest, DeleteRequest, QueueAttributesRequest, QueueClient, QueueName,
    ReceiveRequest, SendRequest,
};
use crate::config::ConnectionProfile;
use crate::error::WorkerError;
use crate::message::{Message, MessageAttributeValue};
use crate::session::ClientFactory;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::Client;
use aws_sdk_sqs::config::Credentials;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Queue client backed by Amazon SQS (or an SQS-compatible endpoint)
#[derive(Clone)]
pub struct AwsSqsClient {
    client: Client,
}

impl AwsSqsClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a connection profile
    ///
    /// Unset profile fields fall back to the SDK's default provider chain
    /// (environment, shared config, IMDS).
    pub async fn from_profile(profile: &ConnectionProfile) -> Result<Self, WorkerError> {
        profile.validate()?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &profile.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &profile.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some((key, secret)) = profile.static_credentials() {
            let credentials = Credentials::new(
                key,
                secret,
                profile.session_token.clone(),
                None, // expiry
                "sqs-worker-profile",
            );
            loader = loader.credentials_provider(credentials);
        }

        let config = loader.load().await;
        if config.region().is_none() {
            return Err(WorkerError::Session(
                "no AWS region configured (set AWS_REGION or the profile region)".into(),
            ));
        }

        info!(
            region = ?config.region(),
            endpoint = ?profile.endpoint_url,
            "SQS client created"
        );
        Ok(Self::new(Client::new(&config)))
    }
}

#[async_trait]
impl QueueClient for AwsSqsClient {
    async fn receive(&self, request: &ReceiveRequest) -> Result<Vec<Message>, WorkerError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&request.queue_url)
            .visibility_timeout(request.visibility_timeout)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(request.wait_time_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| WorkerError::queue("ReceiveMessage", DisplayErrorContext(e)))?;

        let messages: Vec<Message> = output.messages().iter().map(convert_message).collect();
        debug!(queue_url = %request.queue_url, count = messages.len(), "Received messages");
        Ok(messages)
    }

    async fn delete(&self, request: &DeleteRequest) -> Result<(), WorkerError> {
        self.client
            .delete_message()
            .queue_url(&request.queue_url)
            .receipt_handle(&request.receipt_handle)
            .send()
            .await
            .map_err(|e| WorkerError::queue("DeleteMessage", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn change_visibility(
        &self,
        request: &ChangeVisibilityRequest,
    ) -> Result<(), WorkerError> {
        self.client
            .change_message_visibility()
            .queue_url(&request.queue_url)
            .receipt_handle(&request.receipt_handle)
            .visibility_timeout(request.visibility_timeout)
            .send()
            .await
            .map_err(|e| WorkerError::queue("ChangeMessageVisibility", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn send(&self, request: &SendRequest) -> Result<(), WorkerError> {
        let output = self
            .client
            .send_message()
            .queue_url(&request.queue_url)
            .message_body(&request.body)
            .set_message_group_id(request.group_id.clone())
            .set_message_deduplication_id(request.deduplication_id.clone())
            .send()
            .await
            .map_err(|e| WorkerError::queue("SendMessage", DisplayErrorContext(e)))?;

        debug!(
            queue_url = %request.queue_url,
            message_id = ?output.message_id(),
            "Message sent"
        );
        Ok(())
    }

    async fn get_queue_url(&self, queue_name: &QueueName) -> Result<String, WorkerError> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(queue_name.as_str())
            .send()
            .await
            .map_err(|e| WorkerError::queue("GetQueueUrl", DisplayErrorContext(e)))?;

        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| WorkerError::QueueNotFound(queue_name.to_string()))
    }

    async fn get_queue_attributes(
        &self,
        request: &QueueAttributesRequest,
    ) -> Result<HashMap<String, String>, WorkerError> {
        let names = request
            .attribute_names
            .iter()
            .map(|name| QueueAttributeName::from(name.as_str()))
            .collect();

        let output = self
            .client
            .get_queue_attributes()
            .queue_url(&request.queue_url)
            .set_attribute_names(Some(names))
            .send()
            .await
            .map_err(|e| WorkerError::queue("GetQueueAttributes", DisplayErrorContext(e)))?;

        Ok(output
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn convert_message(message: &aws_sdk_sqs::types::Message) -> Message {
    let attributes = message
        .attributes()
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    let message_attributes = message
        .message_attributes()
        .map(|attrs| {
            attrs
                .iter()
                .map(|(name, value)| (name.clone(), convert_attribute(value)))
                .collect()
        })
        .unwrap_or_default();

    Message {
        message_id: message.message_id().map(str::to_string),
        receipt_handle: message.receipt_handle().map(str::to_string),
        body: message.body().map(str::to_string),
        attributes,
        message_attributes,
    }
}

fn convert_attribute(value: &aws_sdk_sqs::types::MessageAttributeValue) -> MessageAttributeValue {
    MessageAttributeValue {
        data_type: value.data_type().to_string(),
        string_value: value.string_value().map(str::to_string),
        binary_value: value.binary_value().map(|b| b.as_ref().to_vec()),
        string_list_values: value.string_list_values().to_vec(),
        binary_list_values: value
            .binary_list_values()
            .iter()
            .map(|b| b.as_ref().to_vec())
            .collect(),
    }
}

/// Builds `AwsSqsClient`s from connection profiles
#[derive(Debug, Clone, Copy, Default)]
pub struct SqsClientFactory;

#[async_trait]
impl ClientFactory for SqsClientFactory {
    async fn connect(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Arc<dyn QueueClient>, WorkerError> {
        let client = AwsSqsClient::from_profile(profile).await?;
        Ok(Arc::new(client))
    }
}
