//! Queue message model
//!
//! `Message` is the client-independent view of an SQS message. The AWS adapter
//! converts SDK types into it and tests build it directly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::IntErrorKind;

/// System attribute holding the delivery count
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// FIFO ordering group
pub const MESSAGE_GROUP_ID: &str = "MessageGroupId";

/// FIFO deduplication id
pub const MESSAGE_DEDUPLICATION_ID: &str = "MessageDeduplicationId";

/// Typed message attribute as delivered by SQS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttributeValue {
    pub data_type: String,
    pub string_value: Option<String>,
    pub binary_value: Option<Vec<u8>>,
    #[serde(default)]
    pub string_list_values: Vec<String>,
    #[serde(default)]
    pub binary_list_values: Vec<Vec<u8>>,
}

impl MessageAttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: "String".into(),
            string_value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self {
            data_type: "Binary".into(),
            binary_value: Some(value.into()),
            ..Default::default()
        }
    }

    /// First populated member: string, binary, string list, then binary list
    pub fn value(&self) -> Option<AttributeValue> {
        if let Some(s) = &self.string_value {
            return Some(AttributeValue::String(s.clone()));
        }
        if let Some(b) = &self.binary_value {
            return Some(AttributeValue::Binary(b.clone()));
        }
        if !self.string_list_values.is_empty() {
            return Some(AttributeValue::StringList(self.string_list_values.clone()));
        }
        if !self.binary_list_values.is_empty() {
            return Some(AttributeValue::BinaryList(self.binary_list_values.clone()));
        }
        None
    }
}

/// Decoded attribute value handed to handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Binary(Vec<u8>),
    StringList(Vec<String>),
    BinaryList(Vec<Vec<u8>>),
}

/// Decoded attribute map: name to value, `None` when no member is populated
pub type Attributes = HashMap<String, Option<AttributeValue>>;

/// A message pulled from the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub message_id: Option<String>,
    /// Acknowledgment token required for delete and visibility changes
    pub receipt_handle: Option<String>,
    pub body: Option<String>,
    /// System attributes (`ApproximateReceiveCount`, `MessageGroupId`, ...)
    pub attributes: HashMap<String, String>,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
}

impl Message {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn with_receipt_handle(mut self, handle: impl Into<String>) -> Self {
        self.receipt_handle = Some(handle.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_message_attribute(
        mut self,
        name: impl Into<String>,
        value: MessageAttributeValue,
    ) -> Self {
        self.message_attributes.insert(name.into(), value);
        self
    }

    pub fn with_group_id(self, group_id: impl Into<String>) -> Self {
        self.with_attribute(MESSAGE_GROUP_ID, group_id)
    }

    /// Id used in logs and events
    pub fn id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("<unknown>")
    }

    pub fn body(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }

    /// Delivery count, 1 when the attribute is absent or unparsable
    ///
    /// Counts beyond `u32::MAX` saturate.
    pub fn receive_count(&self) -> u32 {
        let Some(raw) = self.attributes.get(APPROXIMATE_RECEIVE_COUNT) else {
            return 1;
        };
        match raw.trim().parse::<u32>() {
            Ok(count) => count,
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => u32::MAX,
            Err(_) => 1,
        }
    }

    /// Number of previous deliveries
    pub fn retry_count(&self) -> u32 {
        self.receive_count().saturating_sub(1)
    }

    pub fn group_id(&self) -> Option<&str> {
        self.attributes.get(MESSAGE_GROUP_ID).map(String::as_str)
    }

    pub fn deduplication_id(&self) -> Option<&str> {
        self.attributes
            .get(MESSAGE_DEDUPLICATION_ID)
            .map(String::as_str)
    }

    /// Decoded message attributes, `None` when the message carries none
    pub fn decoded_attributes(&self) -> Option<Attributes> {
        if self.message_attributes.is_empty() {
            return None;
        }
        Some(decode_attributes(&self.message_attributes))
    }
}

/// Map every attribute to its first populated member
pub fn decode_attributes(raw: &HashMap<String, MessageAttributeValue>) -> Attributes {
    raw.iter()
        .map(|(name, value)| (name.clone(), value.value()))
        .collect()
}

/// Split a batch into FIFO groups, keeping arrival order within and across groups
///
/// Messages without a group id share one anonymous group.
pub fn group_by_message_group(messages: Vec<Message>) -> Vec<(Option<String>, Vec<Message>)> {
    let mut groups: Vec<(Option<String>, Vec<Message>)> = Vec::new();
    for message in messages {
        let key = message.group_id().map(str::to_string);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(message),
            None => groups.push((key, vec![message])),
        }
    }
    groups
}
