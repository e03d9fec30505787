//! Fixture builders for subscription records.

use crate::billing::{StoredSubscription, StripeSubscriptionData, SubscriptionStatus};

/// Billing period used by fixtures: 30 days starting 2023-11-14.
pub const PERIOD_START: u64 = 1_700_000_000;
pub const PERIOD_END: u64 = PERIOD_START + 30 * 86_400;

/// A stored subscription with no grace period and no pending cancellation.
#[must_use]
pub fn stored_subscription(
    id: &str,
    user_id: &str,
    stripe_subscription_id: &str,
    status: SubscriptionStatus,
) -> StoredSubscription {
    StoredSubscription {
        id: id.to_string(),
        user_id: user_id.to_string(),
        stripe_subscription_id: stripe_subscription_id.to_string(),
        status,
        cancel_at_period_end: false,
        current_period_start: PERIOD_START,
        current_period_end: PERIOD_END,
        grace_period_ends_at: None,
        updated_at: PERIOD_START,
    }
}

/// A `past_due` stored subscription whose grace period ends at `grace_period_ends_at`.
#[must_use]
pub fn past_due_subscription(
    id: &str,
    user_id: &str,
    stripe_subscription_id: &str,
    grace_period_ends_at: u64,
) -> StoredSubscription {
    StoredSubscription {
        grace_period_ends_at: Some(grace_period_ends_at),
        ..stored_subscription(id, user_id, stripe_subscription_id, SubscriptionStatus::PastDue)
    }
}

/// Stripe's view of a subscription.
#[must_use]
pub fn stripe_subscription(id: &str, status: &str, cancel_at_period_end: bool) -> StripeSubscriptionData {
    StripeSubscriptionData {
        id: id.to_string(),
        customer_id: format!("cus_{}", id.trim_start_matches("sub_")),
        status: status.to_string(),
        cancel_at_period_end,
        current_period_start: PERIOD_START,
        current_period_end: PERIOD_END,
    }
}
