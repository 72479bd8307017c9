//! Customer billing step.

use crate::error::SagaError;
use crate::services::billing::{BillingConfirmation, BillingService};

/// Charges the customer through the billing collaborator.
///
/// Parameters are passed through untouched. There is no compensation for
/// this step.
#[tracing::instrument(skip_all)]
pub async fn bill_customer<P: BillingService + ?Sized>(
    billing: &P,
    params: &serde_json::Value,
) -> Result<BillingConfirmation, SagaError> {
    let confirmation = billing.charge(params).await.inspect_err(|e| {
        tracing::warn!(error = %e, "billing failed");
    })?;
    tracing::info!(charge_id = %confirmation.charge_id, "customer billed");
    Ok(confirmation)
}
