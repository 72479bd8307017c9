//! Order fulfillment saga for a bookstore.
//!
//! Step handlers and their compensations live in [`steps`]. The courier
//! step runs asynchronously: the coordinator enqueues a work item and
//! suspends on a continuation token that the [`worker`] resolves exactly once.
//!
//! The order fulfillment saga follows these steps:
//! 1. Check inventory
//! 2. Calculate total
//! 3. Redeem loyalty points (optional)
//! 4. Bill the customer
//! 5. Assign a courier and debit stock
//!
//! If a step fails after points were redeemed, the points are restored.

pub mod aggregate;
pub mod config;
pub mod continuation;
pub mod coordinator;
pub mod dedupe;
pub mod error;
pub mod events;
pub mod order_fulfillment;
pub mod queue;
pub mod services;
pub mod state;
pub mod steps;
pub mod worker;

pub use aggregate::SagaInstance;
pub use config::SagaConfig;
pub use continuation::{
    InMemoryContinuationRegistry, NO_COURIER_AVAILABLE, PendingTask, TaskResolution,
    TaskTokenResolver,
};
pub use coordinator::{OrderRequest, SagaCoordinator};
pub use dedupe::{DeliveryLedger, InMemoryDeliveryLedger};
pub use error::SagaError;
pub use events::{SagaEvent, StepOutput};
pub use queue::{ChannelWorkQueue, FulfillmentInput, QueueMessage, WorkItem, WorkQueue};
pub use services::{
    BILLED, BillingConfirmation, BillingService, CourierAssignment, CourierService,
    FixedCourierService, InMemoryBillingService,
};
pub use state::{SagaState, WorkItemState};
pub use worker::{FulfillmentWorker, WorkOutcome};
