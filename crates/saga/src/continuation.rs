//! Continuation-token protocol.
//!
//! A suspended step is resumed by sending exactly one [`TaskResolution`]
//! for its token. [`PendingTask`] makes the "at most once" half of that
//! structural: resolving consumes it.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use common::TaskToken;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

use crate::error::SagaError;
use crate::services::courier::CourierAssignment;

/// Error name reported when the courier step fails for any reason.
pub const NO_COURIER_AVAILABLE: &str = "NoCourierAvailable";

/// Accepted resolutions kept for inspection by [`InMemoryContinuationRegistry::new`].
pub const DEFAULT_RESOLUTION_HISTORY: usize = 1024;

/// The outcome sent back for a token.
///
/// Success: `{ "output": { "courier": .. }, "taskToken": .. }`.
/// Failure: `{ "error": .., "cause": .., "taskToken": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResolution {
    Success {
        output: CourierAssignment,
        #[serde(rename = "taskToken")]
        task_token: TaskToken,
    },
    Failure {
        error: String,
        cause: String,
        #[serde(rename = "taskToken")]
        task_token: TaskToken,
    },
}

impl TaskResolution {
    /// Returns the token this resolution is for.
    pub fn task_token(&self) -> &TaskToken {
        match self {
            TaskResolution::Success { task_token, .. } | TaskResolution::Failure { task_token, .. } => {
                task_token
            }
        }
    }

    /// Returns true for a success resolution.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskResolution::Success { .. })
    }

    fn outcome_label(&self) -> &'static str {
        if self.is_success() { "success" } else { "failure" }
    }
}

/// Trait for the orchestrator endpoint that accepts resolutions.
#[async_trait]
pub trait TaskTokenResolver: Send + Sync {
    /// Resumes the suspended step identified by the resolution's token.
    ///
    /// Fails with `InvalidTaskToken` if the token is unknown or already resolved.
    async fn resolve(&self, resolution: TaskResolution) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: TaskTokenResolver + ?Sized> TaskTokenResolver for Arc<T> {
    async fn resolve(&self, resolution: TaskResolution) -> Result<(), SagaError> {
        (**self).resolve(resolution).await
    }
}

/// A suspended step awaiting its outcome.
#[derive(Debug)]
#[must_use = "a pending task must be resolved exactly once"]
pub struct PendingTask {
    token: TaskToken,
}

impl PendingTask {
    /// Takes ownership of the right to resolve `token`.
    pub fn new(token: TaskToken) -> Self {
        Self { token }
    }

    /// Returns the token being resolved.
    pub fn token(&self) -> &TaskToken {
        &self.token
    }

    /// Resolves the token with a courier assignment.
    pub async fn succeed<R: TaskTokenResolver + ?Sized>(
        self,
        resolver: &R,
        output: CourierAssignment,
    ) -> Result<TaskResolution, SagaError> {
        let task_token = self.token.clone();
        self.send(resolver, TaskResolution::Success { output, task_token })
            .await
    }

    /// Resolves the token with a failure.
    pub async fn fail<R: TaskTokenResolver + ?Sized>(
        self,
        resolver: &R,
        error: &str,
        cause: impl Into<String>,
    ) -> Result<TaskResolution, SagaError> {
        let task_token = self.token.clone();
        self.send(
            resolver,
            TaskResolution::Failure {
                error: error.to_string(),
                cause: cause.into(),
                task_token,
            },
        )
        .await
    }

    async fn send<R: TaskTokenResolver + ?Sized>(
        self,
        resolver: &R,
        resolution: TaskResolution,
    ) -> Result<TaskResolution, SagaError> {
        let outcome = resolution.outcome_label();
        resolver.resolve(resolution.clone()).await?;
        metrics::counter!("task_tokens_resolved_total", "outcome" => outcome).increment(1);
        tracing::info!(task_token = %self.token, outcome, "task token resolved");
        Ok(resolution)
    }
}

struct RegistryState {
    pending: HashMap<TaskToken, oneshot::Sender<TaskResolution>>,
    resolutions: VecDeque<TaskResolution>,
    history: usize,
}

/// In-process stand-in for the orchestrator's token registry.
///
/// Issues tokens, hands the waiting side a receiver, and accepts one
/// resolution per token. The most recent accepted resolutions are kept for
/// inspection, up to the history bound.
#[derive(Clone)]
pub struct InMemoryContinuationRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl Default for InMemoryContinuationRegistry {
    fn default() -> Self {
        Self::with_history(DEFAULT_RESOLUTION_HISTORY)
    }
}

impl InMemoryContinuationRegistry {
    /// Creates an empty registry keeping the default resolution history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry that keeps at most `history` resolutions.
    pub fn with_history(history: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                pending: HashMap::new(),
                resolutions: VecDeque::with_capacity(history.min(DEFAULT_RESOLUTION_HISTORY)),
                history,
            })),
        }
    }

    /// Issues a fresh token and returns the receiver its resolution arrives on.
    pub async fn issue(&self) -> (TaskToken, oneshot::Receiver<TaskResolution>) {
        let token = TaskToken::new(Uuid::new_v4().to_string());
        let receiver = self.register(token.clone()).await;
        (token, receiver)
    }

    /// Registers a caller-chosen token.
    pub async fn register(&self, token: TaskToken) -> oneshot::Receiver<TaskResolution> {
        let (sender, receiver) = oneshot::channel();
        self.state.lock().await.pending.insert(token, sender);
        receiver
    }

    /// Drops a pending token so later resolutions are rejected.
    ///
    /// Returns false if the token was not pending.
    pub async fn expire(&self, token: &TaskToken) -> bool {
        self.state.lock().await.pending.remove(token).is_some()
    }

    /// Closes a token whose waiter has given up.
    ///
    /// Returns the resolution if one was accepted before the token could be
    /// expired, and `None` once the token is expired.
    pub async fn close(
        &self,
        token: &TaskToken,
        mut receiver: oneshot::Receiver<TaskResolution>,
    ) -> Option<TaskResolution> {
        if self.expire(token).await {
            return None;
        }
        // Resolution sends complete under the state lock, so a token that is
        // no longer pending already has its value in the channel.
        receiver.try_recv().ok()
    }

    /// Returns the number of tokens awaiting resolution.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Returns the retained resolutions, oldest first.
    pub async fn resolutions(&self) -> Vec<TaskResolution> {
        self.state.lock().await.resolutions.iter().cloned().collect()
    }

    /// Returns the retained resolutions for one token.
    pub async fn resolutions_for(&self, token: &TaskToken) -> Vec<TaskResolution> {
        self.state
            .lock()
            .await
            .resolutions
            .iter()
            .filter(|r| r.task_token() == token)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskTokenResolver for InMemoryContinuationRegistry {
    async fn resolve(&self, resolution: TaskResolution) -> Result<(), SagaError> {
        let mut state = self.state.lock().await;
        let token = resolution.task_token().clone();
        let sender = state
            .pending
            .remove(&token)
            .ok_or_else(|| SagaError::InvalidTaskToken(token.clone()))?;

        // A dropped receiver means the waiting side gave up on this token.
        sender
            .send(resolution.clone())
            .map_err(|_| SagaError::TaskTimedOut(token))?;
        if state.history > 0 {
            if state.resolutions.len() == state.history {
                state.resolutions.pop_front();
            }
            state.resolutions.push_back(resolution);
        }
        Ok(())
    }
}
