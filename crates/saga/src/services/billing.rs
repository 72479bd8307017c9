//! Billing service trait and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SagaError;

/// Status string returned for a successful charge.
pub const BILLED: &str = "Successfully billed";

/// Confirmation of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingConfirmation {
    /// The charge ID assigned by the billing service.
    pub charge_id: String,
    pub status: String,
}

/// Trait for the external payment collaborator.
///
/// No refund operation: charges are not compensated by this saga.
#[async_trait]
pub trait BillingService: Send + Sync {
    /// Charges the customer using whatever parameters the caller supplies.
    async fn charge(&self, params: &serde_json::Value) -> Result<BillingConfirmation, SagaError>;
}

#[async_trait]
impl<T: BillingService + ?Sized> BillingService for Arc<T> {
    async fn charge(&self, params: &serde_json::Value) -> Result<BillingConfirmation, SagaError> {
        (**self).charge(params).await
    }
}

#[derive(Debug, Default)]
struct InMemoryBillingState {
    charges: Vec<(String, serde_json::Value)>,
    next_id: u32,
    fail_on_charge: bool,
}

/// In-memory billing service that records every charge.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBillingService {
    state: Arc<Mutex<InMemoryBillingState>>,
}

impl InMemoryBillingService {
    /// Creates a new in-memory billing service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail subsequent charges.
    pub async fn set_fail_on_charge(&self, fail: bool) {
        self.state.lock().await.fail_on_charge = fail;
    }

    /// Returns the number of recorded charges.
    pub async fn charge_count(&self) -> usize {
        self.state.lock().await.charges.len()
    }

    /// Returns the parameters of every recorded charge, oldest first.
    pub async fn charges(&self) -> Vec<serde_json::Value> {
        self.state
            .lock()
            .await
            .charges
            .iter()
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl BillingService for InMemoryBillingService {
    async fn charge(&self, params: &serde_json::Value) -> Result<BillingConfirmation, SagaError> {
        let mut state = self.state.lock().await;

        if state.fail_on_charge {
            return Err(SagaError::Billing("Payment declined".to_string()));
        }

        state.next_id += 1;
        let charge_id = format!("CHG-{:04}", state.next_id);
        state.charges.push((charge_id.clone(), params.clone()));

        Ok(BillingConfirmation {
            charge_id,
            status: BILLED.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_charge_records_params() {
        let service = InMemoryBillingService::new();
        let params = serde_json::json!({ "userId": "u1", "total": 30 });

        let confirmation = service.charge(&params).await.unwrap();
        assert_eq!(confirmation.status, BILLED);
        assert_eq!(service.charge_count().await, 1);
        assert_eq!(service.charges().await, vec![params]);
    }

    #[tokio::test]
    async fn test_fail_on_charge() {
        let service = InMemoryBillingService::new();
        service.set_fail_on_charge(true).await;

        let result = service.charge(&serde_json::Value::Null).await;
        assert!(matches!(result, Err(SagaError::Billing(_))));
        assert_eq!(service.charge_count().await, 0);
    }

    #[tokio::test]
    async fn test_sequential_charge_ids() {
        let service = InMemoryBillingService::new();
        let r1 = service.charge(&serde_json::Value::Null).await.unwrap();
        let r2 = service.charge(&serde_json::Value::Null).await.unwrap();

        assert_eq!(r1.charge_id, "CHG-0001");
        assert_eq!(r2.charge_id, "CHG-0002");
    }
}
