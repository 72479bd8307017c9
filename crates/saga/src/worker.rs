//! Asynchronous courier-assignment worker.
//!
//! Consumes work items from the queue, assigns a courier, debits stock and
//! resolves the item's continuation token. Every path that takes up a token
//! ends in exactly one resolution, or hands the token back to the ledger
//! when no resolution could be sent.

use common::TaskToken;
use store::BookStore;
use tokio::sync::mpsc;

use crate::config::SagaConfig;
use crate::continuation::{NO_COURIER_AVAILABLE, PendingTask, TaskResolution, TaskTokenResolver};
use crate::dedupe::DeliveryLedger;
use crate::error::SagaError;
use crate::queue::{FulfillmentInput, QueueMessage, WorkItem};
use crate::services::courier::{CourierAssignment, CourierService};
use crate::state::WorkItemState;
use crate::steps::InventorySteps;

/// What the worker did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// The token was resolved.
    Resolved {
        state: WorkItemState,
        resolution: TaskResolution,
    },
    /// The token had already been taken up; the redelivery was dropped.
    Duplicate(TaskToken),
    /// The body carried no usable token, so there was nothing to resolve.
    Rejected(String),
}

/// Worker that fulfills courier work items.
pub struct FulfillmentWorker<B, C, R, L> {
    inventory: InventorySteps<B>,
    courier: C,
    resolver: R,
    ledger: L,
}

impl<B, C, R, L> FulfillmentWorker<B, C, R, L>
where
    B: BookStore,
    C: CourierService,
    R: TaskTokenResolver,
    L: DeliveryLedger,
{
    pub fn new(books: B, courier: C, resolver: R, ledger: L, config: &SagaConfig) -> Self {
        Self {
            inventory: InventorySteps::new(books, config),
            courier,
            resolver,
            ledger,
        }
    }

    /// Drains the queue until every sender is dropped.
    pub async fn run(&self, mut receiver: mpsc::Receiver<QueueMessage>) {
        tracing::info!("fulfillment worker started");
        while let Some(message) = receiver.recv().await {
            match self.handle_message(&message).await {
                Ok(outcome) => tracing::debug!(?outcome, "work item handled"),
                Err(e) => tracing::error!(
                    message_id = %message.message_id,
                    error = %e,
                    "work item handling failed"
                ),
            }
        }
        tracing::info!("fulfillment worker stopped");
    }

    /// Handles one delivery.
    #[tracing::instrument(skip(self, message), fields(message_id = %message.message_id))]
    pub async fn handle_message(&self, message: &QueueMessage) -> Result<WorkOutcome, SagaError> {
        metrics::counter!("fulfillment_work_items_total").increment(1);

        let item = match WorkItem::parse(&message.body) {
            Ok(item) => item,
            Err(err) => return self.reject(&message.body, err).await,
        };

        if !self.ledger.check_and_mark(&item.token).await? {
            metrics::counter!("duplicate_deliveries_total").increment(1);
            tracing::info!(task_token = %item.token, "duplicate delivery dropped");
            return Ok(WorkOutcome::Duplicate(item.token));
        }

        let state = WorkItemState::Received.transition(WorkItemState::Fulfilling)?;
        let result = self.fulfill_and_resolve(&item, state).await;
        self.release_unresolved(&item.token, result).await
    }

    /// Fulfills the item and sends its one resolution.
    ///
    /// A success the resolver refuses for a still-open token is replaced by
    /// a failure resolution after the debit is undone.
    async fn fulfill_and_resolve(
        &self,
        item: &WorkItem,
        state: WorkItemState,
    ) -> Result<WorkOutcome, SagaError> {
        let cause = match self.fulfill(&item.input).await {
            Ok(assignment) => {
                let task = PendingTask::new(item.token.clone());
                match task.succeed(&self.resolver, assignment).await {
                    Ok(resolution) => {
                        return Ok(WorkOutcome::Resolved {
                            state: state.transition(WorkItemState::ResolvedSuccess)?,
                            resolution,
                        });
                    }
                    Err(err) => {
                        // Stock is already debited for an order that will not complete.
                        self.undo_debit(&item.input).await;
                        if err.is_token_closed() {
                            return Err(err);
                        }
                        tracing::warn!(task_token = %item.token, error = %err, "success resolution not accepted");
                        err.to_string()
                    }
                }
            }
            Err(err) => {
                tracing::warn!(book_id = %item.input.book_id, error = %err, "fulfillment failed");
                err.to_string()
            }
        };

        let resolution = PendingTask::new(item.token.clone())
            .fail(&self.resolver, NO_COURIER_AVAILABLE, cause)
            .await?;
        Ok(WorkOutcome::Resolved {
            state: state.transition(WorkItemState::ResolvedFailure)?,
            resolution,
        })
    }

    async fn fulfill(&self, input: &FulfillmentInput) -> Result<CourierAssignment, SagaError> {
        let assignment = self.courier.assign(input).await?;
        self.inventory
            .debit_quantity(&input.book_id, input.quantity)
            .await?;
        Ok(assignment)
    }

    async fn reject(&self, body: &str, err: SagaError) -> Result<WorkOutcome, SagaError> {
        let Some(token) = WorkItem::extract_token(body) else {
            tracing::warn!(error = %err, "work item without a token rejected");
            return Ok(WorkOutcome::Rejected(err.to_string()));
        };

        if !self.ledger.check_and_mark(&token).await? {
            metrics::counter!("duplicate_deliveries_total").increment(1);
            return Ok(WorkOutcome::Duplicate(token));
        }

        tracing::warn!(task_token = %token, error = %err, "malformed work item failed");
        let result = PendingTask::new(token.clone())
            .fail(&self.resolver, NO_COURIER_AVAILABLE, err.to_string())
            .await
            .and_then(|resolution| {
                Ok(WorkOutcome::Resolved {
                    state: WorkItemState::Received.transition(WorkItemState::ResolvedFailure)?,
                    resolution,
                })
            });
        self.release_unresolved(&token, result).await
    }

    /// Unmarks a token whose resolution never reached an open orchestrator,
    /// so the queue's redelivery tries again.
    async fn release_unresolved(
        &self,
        token: &TaskToken,
        result: Result<WorkOutcome, SagaError>,
    ) -> Result<WorkOutcome, SagaError> {
        if let Err(err) = &result {
            if !err.is_token_closed() {
                self.ledger.release(token).await?;
                tracing::warn!(task_token = %token, error = %err, "token released for redelivery");
            }
        }
        result
    }

    async fn undo_debit(&self, input: &FulfillmentInput) {
        if let Err(e) = self
            .inventory
            .restore_quantity(&input.book_id, input.quantity)
            .await
        {
            tracing::error!(
                book_id = %input.book_id,
                quantity = input.quantity,
                error = %e,
                "failed to restore stock after rejected resolution"
            );
        }
    }
}
