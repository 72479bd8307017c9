//! Courier assignment seam.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::queue::FulfillmentInput;

/// The courier attached to an order; the success payload of the courier step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierAssignment {
    pub courier: String,
}

/// Trait for courier matching.
#[async_trait]
pub trait CourierService: Send + Sync {
    /// Finds a courier for the order.
    async fn assign(&self, input: &FulfillmentInput) -> Result<CourierAssignment, SagaError>;
}

#[async_trait]
impl<T: CourierService + ?Sized> CourierService for Arc<T> {
    async fn assign(&self, input: &FulfillmentInput) -> Result<CourierAssignment, SagaError> {
        (**self).assign(input).await
    }
}

/// Courier service that always assigns one configured courier.
///
/// Stands in for a real courier-matching collaborator.
#[derive(Debug, Clone)]
pub struct FixedCourierService {
    courier: String,
    fail_on_assign: Arc<AtomicBool>,
    assignments: Arc<AtomicUsize>,
}

impl FixedCourierService {
    /// Creates a service that assigns `courier` to every order.
    pub fn new(courier: impl Into<String>) -> Self {
        Self {
            courier: courier.into(),
            fail_on_assign: Arc::default(),
            assignments: Arc::default(),
        }
    }

    /// Configures the service to fail subsequent assignments.
    pub fn set_fail_on_assign(&self, fail: bool) {
        self.fail_on_assign.store(fail, Ordering::SeqCst);
    }

    /// Returns how many couriers have been assigned.
    pub fn assignment_count(&self) -> usize {
        self.assignments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CourierService for FixedCourierService {
    async fn assign(&self, input: &FulfillmentInput) -> Result<CourierAssignment, SagaError> {
        if self.fail_on_assign.load(Ordering::SeqCst) {
            return Err(SagaError::NoCourierAvailable(
                "No couriers are available".to_string(),
            ));
        }

        self.assignments.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(book_id = %input.book_id, courier = %self.courier, "courier assigned");
        Ok(CourierAssignment {
            courier: self.courier.clone(),
        })
    }
}
