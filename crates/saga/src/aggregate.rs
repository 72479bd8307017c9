//! Saga instance built from its events.

use common::{BookId, Money, OrderId, Points, Quantity, UserId};
use serde::{Deserialize, Serialize};

use crate::events::{SagaEvent, StepOutput};
use crate::state::SagaState;

/// One order's saga, folded from the events it has recorded.
///
/// Carries the context accumulated along the way (price, total, redeemed
/// points, charge, courier) so compensations know what to undo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaInstance {
    order_id: Option<OrderId>,
    saga_type: String,
    state: SagaState,
    current_step: usize,
    completed_steps: Vec<String>,
    book_id: Option<BookId>,
    quantity: Quantity,
    user_id: Option<UserId>,
    unit_price: Option<Money>,
    total: Option<Money>,
    points_redeemed: Option<Points>,
    charge_id: Option<String>,
    courier: Option<String>,
    failed_step: Option<String>,
    failure_reason: Option<String>,
    compensated_steps: Vec<String>,
    history: Vec<SagaEvent>,
}

impl SagaInstance {
    /// Rebuilds an instance from recorded events.
    pub fn from_events(events: impl IntoIterator<Item = SagaEvent>) -> Self {
        let mut saga = Self::default();
        for event in events {
            saga.record(event);
        }
        saga
    }

    /// Applies the event and appends it to the history.
    pub fn record(&mut self, event: SagaEvent) {
        self.apply(&event);
        self.history.push(event);
    }

    fn apply(&mut self, event: &SagaEvent) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.order_id = Some(data.order_id);
                self.saga_type = data.saga_type.clone();
                self.book_id = Some(data.book_id.clone());
                self.quantity = data.quantity;
                self.user_id = Some(data.user_id.clone());
                self.state = SagaState::Running;
            }
            SagaEvent::StepStarted(_) => {
                self.current_step += 1;
            }
            SagaEvent::StepCompleted(data) => {
                self.completed_steps.push(data.step_name.clone());
                match &data.output {
                    StepOutput::InventoryChecked { unit_price, .. } => {
                        self.unit_price = Some(*unit_price);
                    }
                    StepOutput::TotalCalculated { total } => {
                        self.total = Some(*total);
                    }
                    StepOutput::PointsRedeemed {
                        total,
                        points_redeemed,
                    } => {
                        self.total = Some(*total);
                        self.points_redeemed = Some(*points_redeemed);
                    }
                    StepOutput::Billed { charge_id, .. } => {
                        self.charge_id = Some(charge_id.clone());
                    }
                    StepOutput::CourierAssigned { courier } => {
                        self.courier = Some(courier.clone());
                    }
                }
            }
            SagaEvent::StepSkipped(_) => {}
            SagaEvent::StepFailed(data) => {
                self.failed_step = Some(data.step_name.clone());
                self.failure_reason = Some(format!("{}: {}", data.error, data.cause));
            }
            SagaEvent::CompensationStarted(_) => {
                self.state = SagaState::Compensating;
            }
            SagaEvent::CompensationStepCompleted(data) => {
                self.compensated_steps.push(data.step_name.clone());
            }
            SagaEvent::CompensationStepFailed(_) => {}
            SagaEvent::SagaCompleted(_) => {
                self.state = SagaState::Completed;
            }
            SagaEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason.clone());
            }
        }
    }
}

// Query methods
impl SagaInstance {
    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns the number of steps started so far.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn completed_steps(&self) -> &[String] {
        &self.completed_steps
    }

    /// Returns true if the named step completed.
    pub fn has_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    pub fn book_id(&self) -> Option<&BookId> {
        self.book_id.as_ref()
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn unit_price(&self) -> Option<Money> {
        self.unit_price
    }

    /// Returns the amount owed after any redemption.
    pub fn total(&self) -> Option<Money> {
        self.total
    }

    pub fn points_redeemed(&self) -> Option<Points> {
        self.points_redeemed
    }

    pub fn charge_id(&self) -> Option<&str> {
        self.charge_id.as_deref()
    }

    pub fn courier(&self) -> Option<&str> {
        self.courier.as_deref()
    }

    pub fn failed_step(&self) -> Option<&str> {
        self.failed_step.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn compensated_steps(&self) -> &[String] {
        &self.compensated_steps
    }

    pub fn history(&self) -> &[SagaEvent] {
        &self.history
    }
}
