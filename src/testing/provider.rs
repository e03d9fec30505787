use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::billing::{BillingError, StripeSubscriptionClient, StripeSubscriptionData};
use crate::error::Result;

/// Mock Stripe subscription client.
///
/// Subscriptions that were never added are reported as missing, the same
/// way Stripe answers a lookup for a deleted subscription.
#[derive(Default, Clone)]
pub struct MockStripeSubscriptionClient {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    subscriptions: RwLock<HashMap<String, StripeSubscriptionData>>,
    failing: RwLock<HashSet<String>>,
    delays: RwLock<HashMap<String, Duration>>,
    unreachable: AtomicBool,
    calls: AtomicUsize,
}

impl MockStripeSubscriptionClient {
    /// Create a new mock client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a subscription.
    pub fn add_subscription(&self, data: StripeSubscriptionData) {
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(data.id.clone(), data);
    }

    /// Remove a subscription so lookups report it missing.
    pub fn remove_subscription(&self, subscription_id: &str) {
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subscription_id);
    }

    /// Make lookups of this subscription fail with a 503.
    pub fn fail_lookups_for(&self, subscription_id: &str) {
        self.inner
            .failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription_id.to_string());
    }

    /// Delay lookups of this subscription.
    pub fn delay_lookups_for(&self, subscription_id: &str, delay: Duration) {
        self.inner
            .delays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription_id.to_string(), delay);
    }

    /// Clear all injected failures and delays.
    pub fn clear_failures(&self) {
        self.set_unreachable(false);
        self.inner
            .failing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .delays
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make `ping` fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of `get_subscription` calls made.
    pub fn lookup_count(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }
}

impl StripeSubscriptionClient for MockStripeSubscriptionClient {
    async fn ping(&self) -> Result<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(BillingError::StripeApiError {
                operation: "ping".to_string(),
                message: "Invalid API Key provided".to_string(),
                code: None,
                http_status: Some(401),
            }
            .into());
        }
        Ok(())
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<StripeSubscriptionData>> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .inner
            .delays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subscription_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .inner
            .failing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(subscription_id);
        if failing {
            return Err(BillingError::StripeApiError {
                operation: "get_subscription".to_string(),
                message: "Service unavailable".to_string(),
                code: None,
                http_status: Some(503),
            }
            .into());
        }

        Ok(self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subscription_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_mock_lookup() {
        let client = MockStripeSubscriptionClient::new();
        client.add_subscription(fixtures::stripe_subscription("sub_1", "active", false));

        let found = client.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(found.status, "active");
        assert!(client.get_subscription("sub_missing").await.unwrap().is_none());

        client.remove_subscription("sub_1");
        assert!(client.get_subscription("sub_1").await.unwrap().is_none());
        assert_eq!(client.lookup_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let client = MockStripeSubscriptionClient::new();
        client.add_subscription(fixtures::stripe_subscription("sub_1", "active", false));
        client.fail_lookups_for("sub_1");
        assert!(client.get_subscription("sub_1").await.is_err());

        client.set_unreachable(true);
        assert!(client.ping().await.is_err());
    }
}
