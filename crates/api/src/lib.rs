//! HTTP API for the bookstore order saga.
//!
//! Exposes each saga step and compensation as its own endpoint, an order
//! endpoint that runs the whole saga, record seeding for books and users,
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::steps::{InventorySteps, LoyaltySteps};
use saga::{
    ChannelWorkQueue, FixedCourierService, FulfillmentWorker, InMemoryBillingService,
    InMemoryContinuationRegistry, InMemoryDeliveryLedger, QueueMessage, SagaCoordinator,
};
use store::{InMemoryBookStore, InMemoryUserStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::{AppState, Billing, Books, Users, Worker};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let steps = Router::new()
        .route("/check-inventory", post(routes::steps::check_inventory))
        .route("/calculate-total", post(routes::steps::calculate))
        .route("/redeem-points", post(routes::steps::redeem_points))
        .route("/bill-customer", post(routes::steps::bill))
        .route(
            "/restore-redeem-points",
            post(routes::steps::restore_redeem_points),
        )
        .route(
            "/settle-redeemed-points",
            post(routes::steps::settle_redeemed_points),
        )
        .route("/restore-quantity", post(routes::steps::restore_quantity));

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/steps", steps)
        .route("/books", post(routes::books::put))
        .route("/books/{id}", get(routes::books::get))
        .route("/users", post(routes::users::put))
        .route("/users/{id}", get(routes::users::get))
        .route("/orders", post(routes::orders::create))
        .route("/sagas/{id}", get(routes::orders::saga_status))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the handlers, coordinator and courier worker around the given stores.
///
/// The worker and coordinator share one continuation registry and one
/// queue; the returned receiver is the worker's end of that queue.
pub fn build_state(
    books: Books,
    users: Users,
    billing: Billing,
    config: &Config,
) -> (Arc<AppState>, Worker, mpsc::Receiver<QueueMessage>) {
    let saga_config = config.saga_config();
    let registry = InMemoryContinuationRegistry::new();
    let (queue, receiver) = ChannelWorkQueue::new(config.queue_capacity);

    let coordinator = SagaCoordinator::new(
        books.clone(),
        users.clone(),
        billing.clone(),
        queue,
        registry.clone(),
        &saga_config,
    );
    let worker = FulfillmentWorker::new(
        books.clone(),
        FixedCourierService::new(saga_config.courier.clone()),
        registry,
        InMemoryDeliveryLedger::new(),
        &saga_config,
    );

    let state = Arc::new(AppState {
        inventory: InventorySteps::new(books, &saga_config),
        loyalty: LoyaltySteps::new(users),
        billing,
        coordinator,
    });

    (state, worker, receiver)
}

/// Creates the default application state with in-memory stores and billing.
pub fn create_default_state(config: &Config) -> (Arc<AppState>, Worker, mpsc::Receiver<QueueMessage>) {
    build_state(
        Arc::new(InMemoryBookStore::new()),
        Arc::new(InMemoryUserStore::new()),
        Arc::new(InMemoryBillingService::new()),
        config,
    )
}

/// Runs the courier worker on its own task until the queue closes.
pub fn spawn_worker(worker: Worker, receiver: mpsc::Receiver<QueueMessage>) -> JoinHandle<()> {
    tokio::spawn(async move { worker.run(receiver).await })
}
