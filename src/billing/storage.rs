//! Storage traits for billing data.
//!
//! The reconciler never owns subscription or user records. It reads them
//! through [`BillingStore`] and writes back only the handful of fields it
//! corrects. Every write is keyed by primary id and last-write-wins.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::status::{EntitlementMode, SubscriptionStatus};

/// Persistent-store capabilities needed by the reconciler.
///
/// Implement this trait against your database. An in-memory implementation
/// lives in [`crate::testing`].
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Check that the store is reachable.
    ///
    /// Called once before a run starts; an error here aborts the run.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Subscriptions that are `past_due` with a grace period ending at or before `now`.
    async fn find_expired_grace_periods(&self, now: u64) -> Result<Vec<StoredSubscription>>;

    /// Subscriptions whose local status is one of `statuses`.
    async fn list_subscriptions_by_status(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<Vec<StoredSubscription>>;

    /// Get a subscription by internal id.
    async fn get_subscription(&self, id: &str) -> Result<Option<StoredSubscription>>;

    /// Apply a partial update to a subscription.
    ///
    /// Fields left as `None` in `update` must not be touched.
    async fn update_subscription(&self, id: &str, update: &SubscriptionUpdate) -> Result<()>;

    /// Current entitlement mode of a user, if the user exists.
    async fn get_user_mode(&self, user_id: &str) -> Result<Option<EntitlementMode>>;

    /// Set a user's entitlement mode.
    async fn update_user_mode(&self, user_id: &str, mode: EntitlementMode) -> Result<()>;
}

/// Locally persisted subscription state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSubscription {
    /// Internal primary key.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Stripe subscription ID (immutable once created).
    pub stripe_subscription_id: String,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Whether subscription will cancel at period end.
    pub cancel_at_period_end: bool,
    /// Current billing period start (Unix timestamp).
    pub current_period_start: u64,
    /// Current billing period end (Unix timestamp).
    pub current_period_end: u64,
    /// End of the delinquency grace period (Unix timestamp).
    ///
    /// Only set while the subscription is `past_due`.
    pub grace_period_ends_at: Option<u64>,
    /// Last updated timestamp.
    pub updated_at: u64,
}

impl StoredSubscription {
    /// Check if payment has failed.
    #[must_use]
    pub fn is_past_due(&self) -> bool {
        self.status == SubscriptionStatus::PastDue
    }

    /// Past due and the grace period has run out.
    #[must_use]
    pub fn grace_expired(&self, now: u64) -> bool {
        self.is_past_due() && self.grace_period_ends_at.is_some_and(|ends_at| ends_at <= now)
    }
}

/// Partial update of a stored subscription.
///
/// `grace_period_ends_at` is doubly optional: `None` leaves the column alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub status: Option<SubscriptionStatus>,
    pub cancel_at_period_end: Option<bool>,
    pub grace_period_ends_at: Option<Option<u64>>,
}

impl SubscriptionUpdate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn status(mut self, status: SubscriptionStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn cancel_at_period_end(mut self, cancel: bool) -> Self {
        self.cancel_at_period_end = Some(cancel);
        self
    }

    #[must_use]
    pub fn clear_grace_period(mut self) -> Self {
        self.grace_period_ends_at = Some(None);
        self
    }

    /// True when applying this update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.cancel_at_period_end.is_none()
            && self.grace_period_ends_at.is_none()
    }

    /// Apply to an in-memory record.
    pub fn apply_to(&self, subscription: &mut StoredSubscription) {
        if let Some(status) = self.status {
            subscription.status = status;
        }
        if let Some(cancel) = self.cancel_at_period_end {
            subscription.cancel_at_period_end = cancel;
        }
        if let Some(grace) = self.grace_period_ends_at {
            subscription.grace_period_ends_at = grace;
        }
    }
}
