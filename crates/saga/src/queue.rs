//! Courier-assignment work items and the queue that carries them.

use async_trait::async_trait;
use common::{BookId, OrderId, Quantity, TaskToken};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::SagaError;

/// The order to fulfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub book_id: BookId,
    pub quantity: Quantity,
}

/// A unit of asynchronous courier work, correlated to a suspended saga by its token.
///
/// Wire shape: `{ "Input": { "bookId": .., "quantity": .. }, "Token": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(rename = "Input")]
    pub input: FulfillmentInput,
    #[serde(rename = "Token")]
    pub token: TaskToken,
}

impl WorkItem {
    /// Parses a work item from a message body.
    pub fn parse(body: &str) -> Result<Self, SagaError> {
        serde_json::from_str(body).map_err(|e| SagaError::InvalidWorkItem(e.to_string()))
    }

    /// Pulls just the token out of a body that may not parse as a whole item.
    pub fn extract_token(body: &str) -> Option<TaskToken> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        value
            .get("Token")
            .and_then(|t| t.as_str())
            .map(TaskToken::from)
    }
}

/// A message as delivered by the queue. Delivery is at-least-once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: Uuid,
    pub body: String,
}

impl QueueMessage {
    /// Wraps a raw body in a new message.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body: body.into(),
        }
    }

    /// Serializes a work item into a new message.
    pub fn from_work_item(item: &WorkItem) -> Result<Self, SagaError> {
        Ok(Self::new(serde_json::to_string(item)?))
    }
}

/// Trait for the queue that dispatches courier work.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueues a message.
    async fn send(&self, message: QueueMessage) -> Result<(), SagaError>;
}

/// Work queue backed by a bounded in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelWorkQueue {
    sender: mpsc::Sender<QueueMessage>,
}

impl ChannelWorkQueue {
    /// Creates a queue and the receiver a worker drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueueMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WorkQueue for ChannelWorkQueue {
    async fn send(&self, message: QueueMessage) -> Result<(), SagaError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SagaError::QueueClosed)
    }
}
