//! HTTP route handlers.

pub mod books;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod steps;
pub mod users;

use std::sync::Arc;

use saga::steps::{InventorySteps, LoyaltySteps};
use saga::{
    BillingService, ChannelWorkQueue, FixedCourierService, FulfillmentWorker,
    InMemoryContinuationRegistry, InMemoryDeliveryLedger, SagaCoordinator,
};
use store::{BookStore, UserStore};

/// Book store behind the API, in-memory or Postgres.
pub type Books = Arc<dyn BookStore>;

/// User store behind the API, in-memory or Postgres.
pub type Users = Arc<dyn UserStore>;

pub type Billing = Arc<dyn BillingService>;

pub type Coordinator = SagaCoordinator<Books, Users, Billing, ChannelWorkQueue>;

/// The courier worker the binary runs beside the server.
pub type Worker =
    FulfillmentWorker<Books, FixedCourierService, InMemoryContinuationRegistry, InMemoryDeliveryLedger>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub inventory: InventorySteps<Books>,
    pub loyalty: LoyaltySteps<Users>,
    pub billing: Billing,
    pub coordinator: Coordinator,
}
