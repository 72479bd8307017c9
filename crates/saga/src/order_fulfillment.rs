//! Order fulfillment saga constants.

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "BookOrderFulfillment";

/// Step name: confirm the book exists and has stock.
pub const STEP_CHECK_INVENTORY: &str = "check_inventory";

/// Step name: price the order.
pub const STEP_CALCULATE_TOTAL: &str = "calculate_total";

/// Step name: redeem loyalty points against the total.
pub const STEP_REDEEM_POINTS: &str = "redeem_points";

/// Step name: charge the customer.
pub const STEP_BILL_CUSTOMER: &str = "bill_customer";

/// Step name: hand the order to the courier worker and wait for its token.
pub const STEP_ASSIGN_COURIER: &str = "assign_courier";

/// Compensation name for [`STEP_REDEEM_POINTS`].
pub const COMPENSATE_RESTORE_POINTS: &str = "restore_redeem_points";
