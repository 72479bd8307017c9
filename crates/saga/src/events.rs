//! Saga events.

use chrono::{DateTime, Utc};
use common::{BookId, Money, OrderId, Points, Quantity, UserId};
use serde::{Deserialize, Serialize};

/// Events recorded while an order's saga runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    SagaStarted(SagaStartedData),
    StepStarted(StepData),
    StepCompleted(StepCompletedData),
    /// An optional step was not requested for this order.
    StepSkipped(StepData),
    StepFailed(StepFailedData),
    CompensationStarted(CompensationData),
    CompensationStepCompleted(StepData),
    /// A compensation failed; the chain continues.
    CompensationStepFailed(StepFailedData),
    SagaCompleted(SagaCompletedData),
    SagaFailed(SagaFailedData),
}

impl SagaEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::StepStarted(_) => "StepStarted",
            SagaEvent::StepCompleted(_) => "StepCompleted",
            SagaEvent::StepSkipped(_) => "StepSkipped",
            SagaEvent::StepFailed(_) => "StepFailed",
            SagaEvent::CompensationStarted(_) => "CompensationStarted",
            SagaEvent::CompensationStepCompleted(_) => "CompensationStepCompleted",
            SagaEvent::CompensationStepFailed(_) => "CompensationStepFailed",
            SagaEvent::SagaCompleted(_) => "SagaCompleted",
            SagaEvent::SagaFailed(_) => "SagaFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStartedData {
    pub order_id: OrderId,
    pub saga_type: String,
    pub book_id: BookId,
    pub quantity: Quantity,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    pub step_name: String,
}

/// What a completed step contributed to the saga's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepOutput {
    #[serde(rename_all = "camelCase")]
    InventoryChecked { unit_price: Money, in_stock: Quantity },
    TotalCalculated { total: Money },
    #[serde(rename_all = "camelCase")]
    PointsRedeemed { total: Money, points_redeemed: Points },
    #[serde(rename_all = "camelCase")]
    Billed { charge_id: String, status: String },
    CourierAssigned { courier: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletedData {
    pub step_name: String,
    pub output: StepOutput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailedData {
    pub step_name: String,
    /// Routing name of the failure, e.g. `BookOutOfStock`.
    pub error: String,
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationData {
    pub from_step: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

impl SagaEvent {
    pub fn saga_started(
        order_id: OrderId,
        saga_type: impl Into<String>,
        book_id: BookId,
        quantity: Quantity,
        user_id: UserId,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            order_id,
            saga_type: saga_type.into(),
            book_id,
            quantity,
            user_id,
            started_at: Utc::now(),
        })
    }

    pub fn step_started(step_name: impl Into<String>) -> Self {
        SagaEvent::StepStarted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn step_completed(step_name: impl Into<String>, output: StepOutput) -> Self {
        SagaEvent::StepCompleted(StepCompletedData {
            step_name: step_name.into(),
            output,
        })
    }

    pub fn step_skipped(step_name: impl Into<String>) -> Self {
        SagaEvent::StepSkipped(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        SagaEvent::StepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
            cause: cause.into(),
        })
    }

    pub fn compensation_started(from_step: impl Into<String>) -> Self {
        SagaEvent::CompensationStarted(CompensationData {
            from_step: from_step.into(),
        })
    }

    pub fn compensation_step_completed(step_name: impl Into<String>) -> Self {
        SagaEvent::CompensationStepCompleted(StepData {
            step_name: step_name.into(),
        })
    }

    pub fn compensation_step_failed(
        step_name: impl Into<String>,
        error: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        SagaEvent::CompensationStepFailed(StepFailedData {
            step_name: step_name.into(),
            error: error.into(),
            cause: cause.into(),
        })
    }

    pub fn saga_completed() -> Self {
        SagaEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}
