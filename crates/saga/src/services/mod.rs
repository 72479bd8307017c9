//! External collaborators behind the saga steps, with in-memory implementations.

pub mod billing;
pub mod courier;

pub use billing::{BILLED, BillingConfirmation, BillingService, InMemoryBillingService};
pub use courier::{CourierAssignment, CourierService, FixedCourierService};
