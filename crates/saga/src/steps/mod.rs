//! Saga step handlers.
//!
//! Each handler is a stateless request/response unit the orchestrator can
//! invoke on its own. Compensations live beside the step they undo.

pub mod billing;
pub mod inventory;
pub mod loyalty;
pub mod pricing;

pub use billing::bill_customer;
pub use inventory::{InventoryRequest, InventorySteps, QuantityRestored, is_book_available};
pub use loyalty::{LoyaltySteps, PointsAdjustment, PointsRequest, RedeemRequest, Redemption};
pub use pricing::{OrderTotal, PriceRequest, calculate_total};
