//! Points redemption and its compensation.

use common::{Money, Points, UserId};
use serde::{Deserialize, Serialize};
use store::{StoreError, UserStore};

use crate::error::SagaError;
use crate::steps::pricing::OrderTotal;

/// Reads of a balance that keeps changing before a redemption gives up.
const REDEEM_ATTEMPTS: usize = 3;

/// Input to [`LoyaltySteps::redeem_points`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub user_id: UserId,
    pub total: OrderTotal,
}

/// Result of a redemption: the reduced total and the points taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub total: Money,
    pub points_redeemed: Points,
}

/// Input to the restore and settle operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsRequest {
    pub user_id: UserId,
    pub points: Points,
}

/// Acknowledgement of a restore or settle. `applied` is false when there
/// was no matching held balance and nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsAdjustment {
    pub user_id: UserId,
    pub points: Points,
    pub applied: bool,
}

/// Step handlers backed by the loyalty store.
#[derive(Clone)]
pub struct LoyaltySteps<U> {
    users: U,
}

impl<U: UserStore> LoyaltySteps<U> {
    /// Creates the loyalty handlers.
    pub fn new(users: U) -> Self {
        Self { users }
    }

    /// Returns the underlying store.
    pub fn users(&self) -> &U {
        &self.users
    }

    /// Redeems the whole point balance against the order total.
    ///
    /// Permitted only while the balance is strictly below the total; a
    /// balance that would cover the order is rejected with
    /// `InsufficientTotal` and left untouched. On success the balance is
    /// zeroed and the redeemed points are held until the saga settles or
    /// compensates. The hold only applies to the balance that was read, so
    /// concurrent redemptions never hold the same points twice.
    #[tracing::instrument(skip(self), fields(%user_id))]
    pub async fn redeem_points(
        &self,
        user_id: &UserId,
        total: Money,
    ) -> Result<Redemption, SagaError> {
        for _ in 0..REDEEM_ATTEMPTS {
            let user = self
                .users
                .get_user(user_id)
                .await?
                .ok_or_else(|| SagaError::UserNotFound(user_id.clone()))?;

            let points = user.points;
            let insufficient = || SagaError::InsufficientTotal {
                user_id: user_id.clone(),
                total,
                points,
            };
            if !total.exceeds_points(points) {
                return Err(insufficient());
            }
            let remaining = total.checked_sub_points(points).ok_or_else(insufficient)?;

            let held = self
                .users
                .reset_points(user_id, points)
                .await
                .map_err(|e| not_found_on_condition(user_id, e))?;
            if held.is_some() {
                tracing::info!(points, remaining = %remaining, "points redeemed");
                return Ok(Redemption {
                    total: remaining,
                    points_redeemed: points,
                });
            }
            tracing::debug!(points, "balance changed during redemption, rereading");
        }

        Err(SagaError::ConcurrentUpdate(user_id.clone()))
    }

    /// Compensation for [`Self::redeem_points`].
    ///
    /// Returns held points to the balance. Idempotent: a repeat call, or a
    /// call with no prior redemption, finds no matching hold and changes
    /// nothing.
    #[tracing::instrument(skip(self), fields(%user_id))]
    pub async fn restore_redeem_points(
        &self,
        user_id: &UserId,
        points: Points,
    ) -> Result<PointsAdjustment, SagaError> {
        let applied = self
            .users
            .restore_points(user_id, points)
            .await
            .map_err(|e| not_found_on_condition(user_id, e))?;

        if applied {
            tracing::info!(points, "redeemed points restored");
        } else {
            tracing::info!(points, "no held points to restore");
        }
        Ok(PointsAdjustment {
            user_id: user_id.clone(),
            points,
            applied,
        })
    }

    /// Releases held points once the saga has completed.
    #[tracing::instrument(skip(self), fields(%user_id))]
    pub async fn settle_redeemed_points(
        &self,
        user_id: &UserId,
        points: Points,
    ) -> Result<PointsAdjustment, SagaError> {
        let applied = self
            .users
            .settle_points(user_id, points)
            .await
            .map_err(|e| not_found_on_condition(user_id, e))?;

        Ok(PointsAdjustment {
            user_id: user_id.clone(),
            points,
            applied,
        })
    }
}

/// A rejected existence guard on a user record means the user is gone.
fn not_found_on_condition(user_id: &UserId, err: StoreError) -> SagaError {
    match err {
        StoreError::ConditionFailed { .. } => SagaError::UserNotFound(user_id.clone()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use store::{InMemoryUserStore, User};

    /// Yields after every read so concurrent redemptions interleave.
    struct InterleavingUsers(InMemoryUserStore);

    #[async_trait]
    impl UserStore for InterleavingUsers {
        async fn get_user(&self, user_id: &UserId) -> store::Result<Option<User>> {
            let user = self.0.get_user(user_id).await;
            tokio::task::yield_now().await;
            user
        }

        async fn put_user(&self, user: User) -> store::Result<()> {
            self.0.put_user(user).await
        }

        async fn reset_points(
            &self,
            user_id: &UserId,
            expected: Points,
        ) -> store::Result<Option<User>> {
            self.0.reset_points(user_id, expected).await
        }

        async fn restore_points(&self, user_id: &UserId, points: Points) -> store::Result<bool> {
            self.0.restore_points(user_id, points).await
        }

        async fn settle_points(&self, user_id: &UserId, points: Points) -> store::Result<bool> {
            self.0.settle_points(user_id, points).await
        }
    }

    fn steps(points: Points) -> LoyaltySteps<InMemoryUserStore> {
        LoyaltySteps::new(InMemoryUserStore::with_users([User::new("u1", points)]))
    }

    async fn stored_points(steps: &LoyaltySteps<InMemoryUserStore>) -> Points {
        steps
            .users()
            .get_user(&UserId::new("u1"))
            .await
            .unwrap()
            .unwrap()
            .points
    }

    #[tokio::test]
    async fn test_redeem_partial_balance() {
        let steps = steps(20);
        let redemption = steps
            .redeem_points(&UserId::new("u1"), Money::from_cents(30))
            .await
            .unwrap();

        assert_eq!(redemption.total, Money::from_cents(10));
        assert_eq!(redemption.points_redeemed, 20);
        assert_eq!(stored_points(&steps).await, 0);
    }

    #[tokio::test]
    async fn test_redeem_rejects_covering_balance() {
        let steps = steps(50);
        let err = steps
            .redeem_points(&UserId::new("u1"), Money::from_cents(30))
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::InsufficientTotal { points: 50, .. }));
        assert_eq!(stored_points(&steps).await, 50);
    }

    #[tokio::test]
    async fn test_redeem_rejects_exactly_equal_balance() {
        let steps = steps(30);
        let err = steps
            .redeem_points(&UserId::new("u1"), Money::from_cents(30))
            .await
            .unwrap_err();
        assert_eq!(err.error_name(), "InsufficientTotal");
    }

    #[tokio::test]
    async fn test_redeem_unknown_user() {
        let steps = steps(20);
        let err = steps
            .redeem_points(&UserId::new("nobody"), Money::from_cents(30))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_redeem_store_failure_is_tagged() {
        let steps = steps(20);
        steps.users().set_unavailable(true);
        let err = steps
            .redeem_points(&UserId::new("u1"), Money::from_cents(30))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_restore_after_redeem_returns_balance() {
        let steps = steps(20);
        let id = UserId::new("u1");
        let redemption = steps
            .redeem_points(&id, Money::from_cents(30))
            .await
            .unwrap();

        let ack = steps
            .restore_redeem_points(&id, redemption.points_redeemed)
            .await
            .unwrap();
        assert!(ack.applied);
        assert_eq!(stored_points(&steps).await, 20);
    }

    #[tokio::test]
    async fn test_restore_twice_restores_once() {
        let steps = steps(20);
        let id = UserId::new("u1");
        steps.redeem_points(&id, Money::from_cents(30)).await.unwrap();

        steps.restore_redeem_points(&id, 20).await.unwrap();
        let second = steps.restore_redeem_points(&id, 20).await.unwrap();

        assert!(!second.applied);
        assert_eq!(stored_points(&steps).await, 20);
    }

    #[tokio::test]
    async fn test_restore_without_redeem_is_noop() {
        let steps = steps(20);
        let ack = steps
            .restore_redeem_points(&UserId::new("u1"), 20)
            .await
            .unwrap();
        assert!(!ack.applied);
        assert_eq!(stored_points(&steps).await, 20);
    }

    #[tokio::test]
    async fn test_restore_unknown_user() {
        let steps = steps(20);
        let err = steps
            .restore_redeem_points(&UserId::new("nobody"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_settle_then_restore_is_noop() {
        let steps = steps(20);
        let id = UserId::new("u1");
        steps.redeem_points(&id, Money::from_cents(30)).await.unwrap();

        assert!(steps.settle_redeemed_points(&id, 20).await.unwrap().applied);
        assert!(!steps.restore_redeem_points(&id, 20).await.unwrap().applied);
        assert_eq!(stored_points(&steps).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_redemptions_hold_balance_once() {
        let users = InMemoryUserStore::with_users([User::new("u1", 20)]);
        let steps = LoyaltySteps::new(InterleavingUsers(users.clone()));
        let id = UserId::new("u1");

        let (a, b) = tokio::join!(
            steps.redeem_points(&id, Money::from_cents(30)),
            steps.redeem_points(&id, Money::from_cents(30)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.points_redeemed + b.points_redeemed, 20);

        steps.restore_redeem_points(&id, a.points_redeemed).await.unwrap();
        steps.restore_redeem_points(&id, b.points_redeemed).await.unwrap();

        let user = users.get_user(&id).await.unwrap().unwrap();
        assert_eq!(user.points, 20);
        assert_eq!(user.held_points, 0);
    }

    #[tokio::test]
    async fn test_redeem_gives_up_on_a_balance_that_keeps_changing() {
        /// Reports a balance the store never holds.
        struct StaleReads(InMemoryUserStore);

        #[async_trait]
        impl UserStore for StaleReads {
            async fn get_user(&self, user_id: &UserId) -> store::Result<Option<User>> {
                Ok(self.0.get_user(user_id).await?.map(|mut user| {
                    user.points += 1;
                    user
                }))
            }

            async fn put_user(&self, user: User) -> store::Result<()> {
                self.0.put_user(user).await
            }

            async fn reset_points(
                &self,
                user_id: &UserId,
                expected: Points,
            ) -> store::Result<Option<User>> {
                self.0.reset_points(user_id, expected).await
            }

            async fn restore_points(&self, user_id: &UserId, points: Points) -> store::Result<bool> {
                self.0.restore_points(user_id, points).await
            }

            async fn settle_points(&self, user_id: &UserId, points: Points) -> store::Result<bool> {
                self.0.settle_points(user_id, points).await
            }
        }

        let users = InMemoryUserStore::with_users([User::new("u1", 5)]);
        let steps = LoyaltySteps::new(StaleReads(users.clone()));

        let err = steps
            .redeem_points(&UserId::new("u1"), Money::from_cents(30))
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::ConcurrentUpdate(_)));
        assert_eq!(users.get_user(&UserId::new("u1")).await.unwrap().unwrap().points, 5);
    }
}
