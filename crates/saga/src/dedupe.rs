//! Delivery deduplication for the courier worker.
//!
//! The queue may deliver a work item more than once. The worker marks each
//! token before acting on it, so a redelivery is recognised and skipped.
//! A token whose resolution could not be sent is released again so the next
//! delivery retries it.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use common::TaskToken;
use tokio::sync::RwLock;

use crate::error::SagaError;

/// Tokens remembered by [`InMemoryDeliveryLedger::new`].
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// Trait for recording which tokens the worker has already taken up.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Marks the token as taken.
    ///
    /// Returns true if this is the first time the token was seen.
    async fn check_and_mark(&self, token: &TaskToken) -> Result<bool, SagaError>;

    /// Forgets the token so a later delivery is handled again.
    async fn release(&self, token: &TaskToken) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: DeliveryLedger + ?Sized> DeliveryLedger for Arc<T> {
    async fn check_and_mark(&self, token: &TaskToken) -> Result<bool, SagaError> {
        (**self).check_and_mark(token).await
    }

    async fn release(&self, token: &TaskToken) -> Result<(), SagaError> {
        (**self).release(token).await
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    seen: HashSet<TaskToken>,
    order: VecDeque<TaskToken>,
}

/// In-memory ledger holding the most recent `capacity` tokens.
///
/// The oldest token is forgotten once the ledger is full. Size the capacity
/// to cover the queue's redelivery window.
#[derive(Debug, Clone)]
pub struct InMemoryDeliveryLedger {
    state: Arc<RwLock<LedgerState>>,
    capacity: usize,
}

impl Default for InMemoryDeliveryLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl InMemoryDeliveryLedger {
    /// Creates an empty ledger with the default capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty ledger remembering at most `capacity` tokens.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            capacity: capacity.max(1),
        }
    }

    /// Returns the number of marked tokens.
    pub async fn len(&self) -> usize {
        self.state.read().await.seen.len()
    }

    /// Returns true if no token is marked.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.seen.is_empty()
    }
}

#[async_trait]
impl DeliveryLedger for InMemoryDeliveryLedger {
    async fn check_and_mark(&self, token: &TaskToken) -> Result<bool, SagaError> {
        let mut state = self.state.write().await;
        if !state.seen.insert(token.clone()) {
            return Ok(false);
        }
        state.order.push_back(token.clone());
        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.seen.remove(&oldest);
            }
        }
        Ok(true)
    }

    async fn release(&self, token: &TaskToken) -> Result<(), SagaError> {
        let mut state = self.state.write().await;
        if state.seen.remove(token) {
            state.order.retain(|t| t != token);
        }
        Ok(())
    }
}
