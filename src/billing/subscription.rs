//! Read-side view of Stripe subscriptions.
//!
//! The reconciler only ever reads from Stripe; cancellations, plan changes
//! and the like happen elsewhere and reach us through webhooks or through
//! the next reconciliation run.

use crate::error::Result;

use super::status::SubscriptionStatus;

/// Stripe subscription data as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSubscriptionData {
    /// Stripe subscription ID.
    pub id: String,
    /// Stripe customer ID.
    pub customer_id: String,
    /// Subscription status string.
    pub status: String,
    /// Whether subscription cancels at period end.
    pub cancel_at_period_end: bool,
    /// Current period start (Unix timestamp).
    pub current_period_start: u64,
    /// Current period end (Unix timestamp).
    pub current_period_end: u64,
}

impl StripeSubscriptionData {
    /// Status mapped onto the local enum.
    #[must_use]
    pub fn mapped_status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_stripe(&self.status)
    }
}

/// Trait for Stripe subscription lookups.
#[allow(async_fn_in_trait)]
pub trait StripeSubscriptionClient: Send + Sync {
    /// Check that the provider is reachable with the configured credentials.
    ///
    /// Called once before a run starts; an error here aborts the run.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Get subscription details from Stripe.
    ///
    /// Returns `Ok(None)` when Stripe reports the subscription does not
    /// exist. Every other failure is an `Err`.
    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<StripeSubscriptionData>>;
}
