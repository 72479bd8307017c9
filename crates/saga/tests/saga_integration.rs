//! Integration tests for the book order saga.

use std::time::Duration;

use common::{BookId, Money, TaskToken, UserId};
use saga::order_fulfillment;
use saga::steps::{InventorySteps, LoyaltySteps, calculate_total};
use saga::{
    ChannelWorkQueue, FixedCourierService, FulfillmentWorker, InMemoryBillingService,
    InMemoryContinuationRegistry, InMemoryDeliveryLedger, NO_COURIER_AVAILABLE, OrderRequest,
    QueueMessage, SagaConfig, SagaCoordinator, SagaError, SagaState, TaskResolution, WorkOutcome,
    WorkQueue,
};
use store::{Book, BookStore, InMemoryBookStore, InMemoryUserStore, User, UserStore};

type TestCoordinator =
    SagaCoordinator<InMemoryBookStore, InMemoryUserStore, InMemoryBillingService, ChannelWorkQueue>;

struct TestHarness {
    coordinator: TestCoordinator,
    books: InMemoryBookStore,
    users: InMemoryUserStore,
    billing: InMemoryBillingService,
    courier: FixedCourierService,
    registry: InMemoryContinuationRegistry,
}

impl TestHarness {
    /// Book b1 at 10 with 5 in stock; user u1 with 20 points; worker running.
    fn new() -> Self {
        Self::with_worker(true)
    }

    fn with_worker(spawn_worker: bool) -> Self {
        let books = InMemoryBookStore::with_books([Book::new("b1", Money::from_cents(10), 5)]);
        let users = InMemoryUserStore::with_users([User::new("u1", 20)]);
        let billing = InMemoryBillingService::new();
        let courier = FixedCourierService::new("courier-7");
        let registry = InMemoryContinuationRegistry::new();
        let config = SagaConfig {
            task_timeout: Duration::from_secs(5),
            ..SagaConfig::default()
        };

        let (queue, receiver) = ChannelWorkQueue::new(16);
        let coordinator = SagaCoordinator::new(
            books.clone(),
            users.clone(),
            billing.clone(),
            queue,
            registry.clone(),
            &config,
        );

        if spawn_worker {
            let worker = FulfillmentWorker::new(
                books.clone(),
                courier.clone(),
                registry.clone(),
                InMemoryDeliveryLedger::new(),
                &config,
            );
            tokio::spawn(async move { worker.run(receiver).await });
        }

        Self {
            coordinator,
            books,
            users,
            billing,
            courier,
            registry,
        }
    }

    async fn stock(&self) -> u32 {
        self.books.quantity_of(&BookId::new("b1")).await.unwrap()
    }

    async fn points(&self) -> u64 {
        self.users
            .get_user(&UserId::new("u1"))
            .await
            .unwrap()
            .unwrap()
            .points
    }
}

fn order(quantity: u32, redeem_points: bool) -> OrderRequest {
    OrderRequest {
        order_id: None,
        book_id: BookId::new("b1"),
        quantity,
        user_id: UserId::new("u1"),
        redeem_points,
        billing: serde_json::json!({ "card": "tok_visa" }),
    }
}

#[tokio::test]
async fn test_check_inventory_and_price() {
    let h = TestHarness::new();
    let steps = InventorySteps::new(h.books.clone(), &SagaConfig::default());

    let book = steps.check_inventory(&BookId::new("b1"), 3).await.unwrap();
    assert_eq!(book.quantity, 5);
    assert_eq!(calculate_total(&book, 3).unwrap().total, Money::from_cents(30));
}

#[tokio::test]
async fn test_exhausting_order_is_out_of_stock() {
    let h = TestHarness::new();
    let steps = InventorySteps::new(h.books.clone(), &SagaConfig::default());

    let err = steps.check_inventory(&BookId::new("b1"), 5).await.unwrap_err();
    assert_eq!(err.error_name(), "BookOutOfStock");
}

#[tokio::test]
async fn test_partial_redemption_and_rejected_redemption() {
    let h = TestHarness::new();
    let loyalty = LoyaltySteps::new(h.users.clone());

    let redemption = loyalty
        .redeem_points(&UserId::new("u1"), Money::from_cents(30))
        .await
        .unwrap();
    assert_eq!(redemption.total, Money::from_cents(10));
    assert_eq!(redemption.points_redeemed, 20);
    assert_eq!(h.points().await, 0);

    h.users.put_user(User::new("u2", 50)).await.unwrap();
    let err = loyalty
        .redeem_points(&UserId::new("u2"), Money::from_cents(30))
        .await
        .unwrap_err();
    assert!(matches!(err, SagaError::InsufficientTotal { .. }));
    let untouched = h.users.get_user(&UserId::new("u2")).await.unwrap().unwrap();
    assert_eq!(untouched.points, 50);
}

#[tokio::test]
async fn test_restore_quantity_round_trips_debit() {
    let h = TestHarness::new();
    let steps = InventorySteps::new(h.books.clone(), &SagaConfig::default());
    let id = BookId::new("b1");

    steps.debit_quantity(&id, 3).await.unwrap();
    assert_eq!(h.stock().await, 2);
    steps.restore_quantity(&id, 3).await.unwrap();
    assert_eq!(h.stock().await, 5);
}

#[tokio::test]
async fn test_duplicate_restore_quantity_is_not_deduplicated() {
    // Callers must invoke restore-quantity at most once per failed fulfillment.
    let h = TestHarness::new();
    let steps = InventorySteps::new(h.books.clone(), &SagaConfig::default());
    let id = BookId::new("b1");

    steps.debit_quantity(&id, 3).await.unwrap();
    steps.restore_quantity(&id, 3).await.unwrap();
    steps.restore_quantity(&id, 3).await.unwrap();
    assert_eq!(h.stock().await, 8);
}

#[tokio::test]
async fn test_worker_resolves_token_and_debits() {
    let h = TestHarness::with_worker(false);
    let token = TaskToken::new("tok1");
    let receiver = h.registry.register(token.clone()).await;
    let worker = FulfillmentWorker::new(
        h.books.clone(),
        h.courier.clone(),
        h.registry.clone(),
        InMemoryDeliveryLedger::new(),
        &SagaConfig::default(),
    );

    worker
        .handle_message(&QueueMessage::new(
            r#"{"Input":{"bookId":"b1","quantity":3},"Token":"tok1"}"#,
        ))
        .await
        .unwrap();

    match receiver.await.unwrap() {
        TaskResolution::Success { output, task_token } => {
            assert_eq!(output.courier, "courier-7");
            assert_eq!(task_token, token);
        }
        other => panic!("unexpected resolution {other:?}"),
    }
    assert_eq!(h.stock().await, 2);
}

#[tokio::test]
async fn test_worker_debit_failure_sends_single_failure() {
    let h = TestHarness::with_worker(false);
    let token = TaskToken::new("tok1");
    let _receiver = h.registry.register(token.clone()).await;
    h.books.set_unavailable(true);
    let worker = FulfillmentWorker::new(
        h.books.clone(),
        h.courier.clone(),
        h.registry.clone(),
        InMemoryDeliveryLedger::new(),
        &SagaConfig::default(),
    );

    let outcome = worker
        .handle_message(&QueueMessage::new(
            r#"{"Input":{"bookId":"b1","quantity":3},"Token":"tok1"}"#,
        ))
        .await
        .unwrap();

    assert!(matches!(outcome, WorkOutcome::Resolved { .. }));
    let resolutions = h.registry.resolutions_for(&token).await;
    assert_eq!(resolutions.len(), 1);
    match &resolutions[0] {
        TaskResolution::Failure { error, cause, .. } => {
            assert_eq!(error, NO_COURIER_AVAILABLE);
            assert!(!cause.is_empty());
        }
        other => panic!("unexpected resolution {other:?}"),
    }
}

#[tokio::test]
async fn test_happy_path_with_redemption() {
    let h = TestHarness::new();

    let saga = h.coordinator.execute_saga(order(3, true)).await.unwrap();

    assert_eq!(saga.state(), SagaState::Completed);
    assert_eq!(saga.courier(), Some("courier-7"));
    assert_eq!(saga.total(), Some(Money::from_cents(10)));
    assert_eq!(saga.points_redeemed(), Some(20));
    assert_eq!(
        saga.completed_steps(),
        [
            order_fulfillment::STEP_CHECK_INVENTORY,
            order_fulfillment::STEP_CALCULATE_TOTAL,
            order_fulfillment::STEP_REDEEM_POINTS,
            order_fulfillment::STEP_BILL_CUSTOMER,
            order_fulfillment::STEP_ASSIGN_COURIER,
        ]
    );
    assert_eq!(h.stock().await, 2);
    assert_eq!(h.points().await, 0);
    assert_eq!(h.billing.charge_count().await, 1);
    assert_eq!(h.billing.charges().await[0]["total"], 10);

    let held = h.users.get_user(&UserId::new("u1")).await.unwrap().unwrap();
    assert_eq!(held.held_points, 0);
}

#[tokio::test]
async fn test_happy_path_without_redemption() {
    let h = TestHarness::new();

    let saga = h.coordinator.execute_saga(order(2, false)).await.unwrap();

    assert_eq!(saga.state(), SagaState::Completed);
    assert!(!saga.has_completed(order_fulfillment::STEP_REDEEM_POINTS));
    assert_eq!(saga.total(), Some(Money::from_cents(20)));
    assert_eq!(h.points().await, 20);
    assert_eq!(h.stock().await, 3);
}

#[tokio::test]
async fn test_billing_failure_restores_points() {
    let h = TestHarness::new();
    h.billing.set_fail_on_charge(true).await;

    let saga = h.coordinator.execute_saga(order(3, true)).await.unwrap();

    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(saga.failed_step(), Some(order_fulfillment::STEP_BILL_CUSTOMER));
    assert_eq!(
        saga.compensated_steps(),
        [order_fulfillment::COMPENSATE_RESTORE_POINTS]
    );
    assert_eq!(h.points().await, 20);
    assert_eq!(h.stock().await, 5);
}

#[tokio::test]
async fn test_courier_failure_restores_points_and_keeps_stock() {
    let h = TestHarness::new();
    h.courier.set_fail_on_assign(true);

    let saga = h.coordinator.execute_saga(order(3, true)).await.unwrap();

    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(saga.failed_step(), Some(order_fulfillment::STEP_ASSIGN_COURIER));
    assert!(saga.failure_reason().unwrap().starts_with("NoCourierAvailable"));
    assert_eq!(h.points().await, 20);
    assert_eq!(h.stock().await, 5);
}

#[tokio::test]
async fn test_insufficient_total_fails_without_compensation() {
    let h = TestHarness::new();
    h.users.put_user(User::new("u1", 50)).await.unwrap();

    let saga = h.coordinator.execute_saga(order(3, true)).await.unwrap();

    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(saga.failed_step(), Some(order_fulfillment::STEP_REDEEM_POINTS));
    assert!(saga.compensated_steps().is_empty());
    assert_eq!(h.points().await, 50);
    assert_eq!(h.billing.charge_count().await, 0);
}

#[tokio::test]
async fn test_unknown_book_fails_first_step() {
    let h = TestHarness::new();
    let mut request = order(1, false);
    request.book_id = BookId::new("missing");

    let saga = h.coordinator.execute_saga(request).await.unwrap();

    assert_eq!(saga.state(), SagaState::Failed);
    assert!(saga.failure_reason().unwrap().starts_with("BookNotFound"));
}

#[tokio::test]
async fn test_saga_is_queryable_by_order() {
    let h = TestHarness::new();
    let saga = h.coordinator.execute_saga(order(1, false)).await.unwrap();
    let order_id = saga.order_id().unwrap();

    let stored = h.coordinator.get_saga(order_id).await.unwrap();
    assert_eq!(stored.state(), SagaState::Completed);
    assert_eq!(stored.history().len(), saga.history().len());
}

#[tokio::test(start_paused = true)]
async fn test_late_resolution_after_timeout_is_undone() {
    let h = TestHarness::with_worker(false);
    let (queue, mut receiver) = ChannelWorkQueue::new(4);
    let config = SagaConfig {
        task_timeout: Duration::from_secs(5),
        ..SagaConfig::default()
    };
    let coordinator = SagaCoordinator::new(
        h.books.clone(),
        h.users.clone(),
        h.billing.clone(),
        queue.clone(),
        h.registry.clone(),
        &config,
    );

    let saga = coordinator.execute_saga(order(3, true)).await.unwrap();
    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(h.points().await, 20);

    // The work item is still queued; a worker picking it up now must not keep the debit.
    let message = receiver.recv().await.unwrap();
    let worker = FulfillmentWorker::new(
        h.books.clone(),
        h.courier.clone(),
        h.registry.clone(),
        InMemoryDeliveryLedger::new(),
        &config,
    );
    let err = worker.handle_message(&message).await.unwrap_err();

    assert!(matches!(err, SagaError::InvalidTaskToken(_)));
    assert_eq!(h.stock().await, 5);
    drop(queue);
}

#[tokio::test(start_paused = true)]
async fn test_resolution_at_the_deadline_keeps_saga_and_stock_in_step() {
    let h = TestHarness::with_worker(false);
    let timeout = Duration::from_secs(5);
    let config = SagaConfig {
        task_timeout: timeout,
        ..SagaConfig::default()
    };
    let (queue, mut receiver) = ChannelWorkQueue::new(4);
    let coordinator = SagaCoordinator::new(
        h.books.clone(),
        h.users.clone(),
        h.billing.clone(),
        queue,
        h.registry.clone(),
        &config,
    );
    let worker = FulfillmentWorker::new(
        h.books.clone(),
        h.courier.clone(),
        h.registry.clone(),
        InMemoryDeliveryLedger::new(),
        &config,
    );
    // The worker resolves on the same tick the coordinator's wait expires.
    let worker_task = tokio::spawn(async move {
        let message = receiver.recv().await.unwrap();
        tokio::time::sleep(timeout).await;
        worker.handle_message(&message).await
    });

    let saga = coordinator.execute_saga(order(3, true)).await.unwrap();
    let _ = worker_task.await.unwrap();

    match saga.state() {
        SagaState::Completed => {
            assert_eq!(h.stock().await, 2);
            assert_eq!(h.points().await, 0);
        }
        SagaState::Failed => {
            assert_eq!(h.stock().await, 5);
            assert_eq!(h.points().await, 20);
        }
        other => panic!("unexpected terminal state {other}"),
    }
}

#[tokio::test]
async fn test_unpriceable_order_fails_at_total() {
    let h = TestHarness::new();
    h.books
        .put_book(Book::new("b1", Money::from_cents(i64::MAX / 2), 5))
        .await
        .unwrap();

    let saga = h.coordinator.execute_saga(order(3, true)).await.unwrap();

    assert_eq!(saga.state(), SagaState::Failed);
    assert_eq!(saga.failed_step(), Some(order_fulfillment::STEP_CALCULATE_TOTAL));
    assert!(saga.failure_reason().unwrap().starts_with("InvalidOrder"));
    assert_eq!(h.points().await, 20);
    assert_eq!(h.billing.charge_count().await, 0);
}

#[tokio::test]
async fn test_redelivered_work_item_debits_once() {
    let h = TestHarness::with_worker(false);
    let _receiver = h.registry.register(TaskToken::new("tok1")).await;
    let worker = FulfillmentWorker::new(
        h.books.clone(),
        h.courier.clone(),
        h.registry.clone(),
        InMemoryDeliveryLedger::new(),
        &SagaConfig::default(),
    );
    let (queue, receiver) = ChannelWorkQueue::new(4);
    let body = r#"{"Input":{"bookId":"b1","quantity":2},"Token":"tok1"}"#;
    queue.send(QueueMessage::new(body)).await.unwrap();
    queue.send(QueueMessage::new(body)).await.unwrap();
    drop(queue);

    worker.run(receiver).await;

    assert_eq!(h.stock().await, 3);
    assert_eq!(h.registry.resolutions().await.len(), 1);
}
