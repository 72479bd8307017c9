//! Saga coordinator for book orders.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::{BookId, OrderId, Quantity, UserId};
use serde::{Deserialize, Serialize};
use store::{BookStore, UserStore};
use tokio::sync::RwLock;

use crate::aggregate::SagaInstance;
use crate::config::SagaConfig;
use crate::continuation::{InMemoryContinuationRegistry, TaskResolution};
use crate::error::SagaError;
use crate::events::{SagaEvent, StepOutput};
use crate::order_fulfillment;
use crate::queue::{FulfillmentInput, QueueMessage, WorkItem, WorkQueue};
use crate::services::billing::BillingService;
use crate::services::courier::CourierAssignment;
use crate::steps::{InventorySteps, LoyaltySteps, bill_customer, calculate_total};

/// An order to run through the saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Generated when absent.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub book_id: BookId,
    pub quantity: Quantity,
    pub user_id: UserId,
    #[serde(default)]
    pub redeem_points: bool,
    /// Passed through to billing untouched.
    #[serde(default)]
    pub billing: serde_json::Value,
}

type StepFailure = (&'static str, SagaError);

/// Drives one order at a time through check-inventory, pricing, optional
/// redemption, billing and courier assignment.
///
/// The courier step suspends on a continuation token until the worker
/// resolves it or `task_timeout` elapses. Each saga is kept in memory,
/// keyed by order ID.
pub struct SagaCoordinator<B, U, P, Q> {
    inventory: InventorySteps<B>,
    loyalty: LoyaltySteps<U>,
    billing: P,
    queue: Q,
    registry: InMemoryContinuationRegistry,
    task_timeout: Duration,
    sagas: RwLock<HashMap<OrderId, SagaInstance>>,
}

impl<B, U, P, Q> SagaCoordinator<B, U, P, Q>
where
    B: BookStore,
    U: UserStore,
    P: BillingService,
    Q: WorkQueue,
{
    /// Creates a new saga coordinator.
    ///
    /// `registry` must be the one the worker resolves tokens against.
    pub fn new(
        books: B,
        users: U,
        billing: P,
        queue: Q,
        registry: InMemoryContinuationRegistry,
        config: &SagaConfig,
    ) -> Self {
        Self {
            inventory: InventorySteps::new(books, config),
            loyalty: LoyaltySteps::new(users),
            billing,
            queue,
            registry,
            task_timeout: config.task_timeout,
            sagas: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the saga for an order, if one was started.
    pub async fn get_saga(&self, order_id: OrderId) -> Option<SagaInstance> {
        self.sagas.read().await.get(&order_id).cloned()
    }

    /// Runs the saga for one order to a terminal state.
    ///
    /// A failing step does not produce an `Err`: the saga compensates and
    /// is returned in the `Failed` state. `Err` is reserved for orders that
    /// could not be started.
    #[tracing::instrument(skip(self, request), fields(saga_type = order_fulfillment::SAGA_TYPE, order_id = tracing::field::Empty))]
    pub async fn execute_saga(&self, request: OrderRequest) -> Result<SagaInstance, SagaError> {
        let order_id = request.order_id.unwrap_or_default();
        tracing::Span::current().record("order_id", tracing::field::display(order_id));

        let mut saga = SagaInstance::default();
        saga.record(SagaEvent::saga_started(
            order_id,
            order_fulfillment::SAGA_TYPE,
            request.book_id.clone(),
            request.quantity,
            request.user_id.clone(),
        ));
        {
            let mut sagas = self.sagas.write().await;
            if sagas.contains_key(&order_id) {
                return Err(SagaError::AlreadyStarted(order_id));
            }
            sagas.insert(order_id, saga.clone());
        }

        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = Instant::now();

        match self.run_steps(&mut saga, order_id, &request).await {
            Ok(()) => {
                self.settle_points(&saga).await;
                self.record(&mut saga, SagaEvent::saga_completed()).await;

                let duration = saga_start.elapsed().as_secs_f64();
                metrics::histogram!("saga_duration_seconds").record(duration);
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(%order_id, duration, "saga completed successfully");
            }
            Err((step, err)) => {
                metrics::counter!("saga_step_failures_total", "step" => step).increment(1);
                if err.is_business() {
                    tracing::info!(step, error = %err, "saga step rejected");
                } else {
                    tracing::warn!(step, error = %err, "saga step failed");
                }
                let reason = format!("{}: {}", err.error_name(), err);
                self.record(
                    &mut saga,
                    SagaEvent::step_failed(step, err.error_name(), err.to_string()),
                )
                .await;

                self.compensate(&mut saga, step).await;
                self.record(&mut saga, SagaEvent::saga_failed(reason)).await;

                metrics::histogram!("saga_duration_seconds")
                    .record(saga_start.elapsed().as_secs_f64());
                metrics::counter!("saga_failed").increment(1);
            }
        }

        Ok(saga)
    }

    async fn run_steps(
        &self,
        saga: &mut SagaInstance,
        order_id: OrderId,
        request: &OrderRequest,
    ) -> Result<(), StepFailure> {
        // 1. Check inventory
        let step = order_fulfillment::STEP_CHECK_INVENTORY;
        self.record(saga, SagaEvent::step_started(step)).await;
        let book = self
            .inventory
            .check_inventory(&request.book_id, request.quantity)
            .await
            .map_err(|e| (step, e))?;
        self.record(
            saga,
            SagaEvent::step_completed(
                step,
                StepOutput::InventoryChecked {
                    unit_price: book.price,
                    in_stock: book.quantity,
                },
            ),
        )
        .await;

        // 2. Calculate total
        let step = order_fulfillment::STEP_CALCULATE_TOTAL;
        self.record(saga, SagaEvent::step_started(step)).await;
        let mut total = calculate_total(&book, request.quantity)
            .map_err(|e| (step, e))?
            .total;
        self.record(
            saga,
            SagaEvent::step_completed(step, StepOutput::TotalCalculated { total }),
        )
        .await;

        // 3. Redeem points, if asked
        let step = order_fulfillment::STEP_REDEEM_POINTS;
        if request.redeem_points {
            self.record(saga, SagaEvent::step_started(step)).await;
            let redemption = self
                .loyalty
                .redeem_points(&request.user_id, total)
                .await
                .map_err(|e| (step, e))?;
            total = redemption.total;
            self.record(
                saga,
                SagaEvent::step_completed(
                    step,
                    StepOutput::PointsRedeemed {
                        total: redemption.total,
                        points_redeemed: redemption.points_redeemed,
                    },
                ),
            )
            .await;
        } else {
            self.record(saga, SagaEvent::step_skipped(step)).await;
        }

        // 4. Bill
        let step = order_fulfillment::STEP_BILL_CUSTOMER;
        self.record(saga, SagaEvent::step_started(step)).await;
        let params = serde_json::json!({
            "orderId": order_id,
            "userId": request.user_id,
            "total": total,
            "details": request.billing,
        });
        let confirmation = bill_customer(&self.billing, &params)
            .await
            .map_err(|e| (step, e))?;
        self.record(
            saga,
            SagaEvent::step_completed(
                step,
                StepOutput::Billed {
                    charge_id: confirmation.charge_id,
                    status: confirmation.status,
                },
            ),
        )
        .await;

        // 5. Hand off to the courier worker and wait
        let step = order_fulfillment::STEP_ASSIGN_COURIER;
        self.record(saga, SagaEvent::step_started(step)).await;
        let input = FulfillmentInput {
            order_id: Some(order_id),
            book_id: request.book_id.clone(),
            quantity: request.quantity,
        };
        let assignment = self.await_courier(input).await.map_err(|e| (step, e))?;
        self.record(
            saga,
            SagaEvent::step_completed(
                step,
                StepOutput::CourierAssigned {
                    courier: assignment.courier,
                },
            ),
        )
        .await;

        Ok(())
    }

    /// Enqueues the work item and suspends until its token is resolved.
    async fn await_courier(&self, input: FulfillmentInput) -> Result<CourierAssignment, SagaError> {
        let (token, mut receiver) = self.registry.issue().await;
        let item = WorkItem {
            input,
            token: token.clone(),
        };

        let enqueued = match QueueMessage::from_work_item(&item) {
            Ok(message) => self.queue.send(message).await,
            Err(e) => Err(e),
        };
        if let Err(e) = enqueued {
            self.registry.expire(&token).await;
            return Err(e);
        }
        tracing::info!(task_token = %token, "waiting on courier assignment");

        let resolution = match tokio::time::timeout(self.task_timeout, &mut receiver).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => {
                self.registry.expire(&token).await;
                return Err(SagaError::TaskTimedOut(token));
            }
            // Late resolutions for this token are rejected from here on,
            // unless one was accepted before the token could be closed.
            Err(_) => match self.registry.close(&token, receiver).await {
                Some(resolution) => {
                    tracing::info!(task_token = %token, "resolution accepted at the deadline");
                    resolution
                }
                None => return Err(SagaError::TaskTimedOut(token)),
            },
        };

        match resolution {
            TaskResolution::Success { output, .. } => Ok(output),
            TaskResolution::Failure { cause, .. } => Err(SagaError::NoCourierAvailable(cause)),
        }
    }

    /// Undoes applied effects after `failed_step` failed.
    ///
    /// Only redemption is compensated here. Billing has no refund, and a
    /// failed courier step never leaves a committed debit behind.
    #[tracing::instrument(skip(self, saga))]
    async fn compensate(&self, saga: &mut SagaInstance, failed_step: &'static str) {
        if !saga.state().can_compensate() {
            tracing::warn!(state = %saga.state(), failed_step, "saga is not running, nothing to compensate");
            return;
        }
        self.record(saga, SagaEvent::compensation_started(failed_step))
            .await;

        if !saga.has_completed(order_fulfillment::STEP_REDEEM_POINTS) {
            return;
        }
        let (Some(user_id), Some(points)) = (saga.user_id().cloned(), saga.points_redeemed())
        else {
            return;
        };

        let step = order_fulfillment::COMPENSATE_RESTORE_POINTS;
        let event = match self.loyalty.restore_redeem_points(&user_id, points).await {
            Ok(_) => SagaEvent::compensation_step_completed(step),
            Err(e) => {
                tracing::error!(%user_id, points, error = %e, "points restoration failed");
                SagaEvent::compensation_step_failed(step, e.error_name(), e.to_string())
            }
        };
        self.record(saga, event).await;
    }

    async fn settle_points(&self, saga: &SagaInstance) {
        let (Some(user_id), Some(points)) = (saga.user_id(), saga.points_redeemed()) else {
            return;
        };
        if let Err(e) = self.loyalty.settle_redeemed_points(user_id, points).await {
            tracing::warn!(%user_id, points, error = %e, "failed to settle redeemed points");
        }
    }

    async fn record(&self, saga: &mut SagaInstance, event: SagaEvent) {
        tracing::debug!(event_type = event.event_type(), "saga event");
        saga.record(event);
        if let Some(order_id) = saga.order_id() {
            self.sagas.write().await.insert(order_id, saga.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ChannelWorkQueue;
    use crate::services::billing::InMemoryBillingService;
    use crate::state::SagaState;
    use common::Money;
    use store::{Book, InMemoryBookStore, InMemoryUserStore, User};

    fn coordinator(
        timeout: Duration,
    ) -> (
        SagaCoordinator<InMemoryBookStore, InMemoryUserStore, InMemoryBillingService, ChannelWorkQueue>,
        tokio::sync::mpsc::Receiver<QueueMessage>,
    ) {
        let (queue, receiver) = ChannelWorkQueue::new(8);
        let config = SagaConfig {
            task_timeout: timeout,
            ..SagaConfig::default()
        };
        let coordinator = SagaCoordinator::new(
            InMemoryBookStore::with_books([Book::new("b1", Money::from_cents(10), 5)]),
            InMemoryUserStore::with_users([User::new("u1", 20)]),
            InMemoryBillingService::new(),
            queue,
            InMemoryContinuationRegistry::new(),
            &config,
        );
        (coordinator, receiver)
    }

    fn order(quantity: Quantity) -> OrderRequest {
        OrderRequest {
            order_id: None,
            book_id: BookId::new("b1"),
            quantity,
            user_id: UserId::new("u1"),
            redeem_points: true,
            billing: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_out_of_stock_fails_without_compensation() {
        let (coordinator, _rx) = coordinator(Duration::from_secs(1));
        let saga = coordinator.execute_saga(order(5)).await.unwrap();

        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.failed_step(), Some(order_fulfillment::STEP_CHECK_INVENTORY));
        assert!(saga.failure_reason().unwrap().starts_with("BookOutOfStock"));
        assert!(saga.compensated_steps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_restores_points() {
        let (coordinator, _rx) = coordinator(Duration::from_secs(5));
        let saga = coordinator.execute_saga(order(3)).await.unwrap();

        assert_eq!(saga.state(), SagaState::Failed);
        assert_eq!(saga.failed_step(), Some(order_fulfillment::STEP_ASSIGN_COURIER));
        assert!(saga.failure_reason().unwrap().starts_with("TaskTimedOut"));
        assert_eq!(
            saga.compensated_steps(),
            [order_fulfillment::COMPENSATE_RESTORE_POINTS.to_string()]
        );
    }

    #[tokio::test]
    async fn test_duplicate_order_id_is_rejected() {
        let (coordinator, _rx) = coordinator(Duration::from_secs(1));
        let mut request = order(5);
        request.order_id = Some(OrderId::new());

        coordinator.execute_saga(request.clone()).await.unwrap();
        let err = coordinator.execute_saga(request).await.unwrap_err();
        assert!(matches!(err, SagaError::AlreadyStarted(_)));
    }

    #[test]
    fn test_order_request_defaults() {
        let request: OrderRequest =
            serde_json::from_str(r#"{"bookId":"b1","quantity":3,"userId":"u1"}"#).unwrap();
        assert!(!request.redeem_points);
        assert!(request.order_id.is_none());
        assert!(request.billing.is_null());
    }
}
