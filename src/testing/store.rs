use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::billing::{
    BillingError, BillingStore, EntitlementMode, StoredSubscription, SubscriptionStatus,
    SubscriptionUpdate,
};
use crate::error::{ReconcileError, Result};
use crate::utils::unix_now;

/// In-memory billing store for testing.
///
/// Wraps data in Arc for cheap cloning; clones share state, so a test can
/// hand one clone to the reconciler and inspect another.
#[derive(Default, Clone)]
pub struct InMemoryBillingStore {
    inner: Arc<InMemoryBillingStoreInner>,
}

#[derive(Default)]
struct InMemoryBillingStoreInner {
    subscriptions: RwLock<HashMap<String, StoredSubscription>>,
    user_modes: RwLock<HashMap<String, EntitlementMode>>,
    unreachable: AtomicBool,
    queries_fail: AtomicBool,
    failing_subscription_writes: RwLock<HashSet<String>>,
    failing_user_writes: RwLock<HashSet<String>>,
    subscription_writes: AtomicUsize,
    user_mode_writes: AtomicUsize,
}

impl InMemoryBillingStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a subscription.
    pub fn insert_subscription(&self, subscription: StoredSubscription) {
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription.id.clone(), subscription);
    }

    /// Seed a user row, or replace its mode, without counting it as a write.
    pub fn set_user_mode(&self, user_id: &str, mode: EntitlementMode) {
        self.inner
            .user_modes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), mode);
    }

    /// Current state of a subscription.
    pub fn subscription(&self, id: &str) -> Option<StoredSubscription> {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Current mode of a user.
    pub fn user_mode(&self, user_id: &str) -> Option<EntitlementMode> {
        self.inner
            .user_modes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .copied()
    }

    /// Make `ping` fail, simulating an unreachable database.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make the listing queries fail.
    pub fn set_queries_fail(&self, fail: bool) {
        self.inner.queries_fail.store(fail, Ordering::SeqCst);
    }

    /// Make every `update_subscription` for this subscription id fail.
    pub fn fail_subscription_writes_for(&self, id: &str) {
        self.inner
            .failing_subscription_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    /// Make every `update_user_mode` for this user fail.
    pub fn fail_user_writes_for(&self, user_id: &str) {
        self.inner
            .failing_user_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string());
    }

    /// Clear all injected failures.
    pub fn clear_failures(&self) {
        self.set_unreachable(false);
        self.set_queries_fail(false);
        self.inner
            .failing_subscription_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .failing_user_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of successful `update_subscription` calls.
    pub fn subscription_write_count(&self) -> usize {
        self.inner.subscription_writes.load(Ordering::SeqCst)
    }

    /// Number of successful `update_user_mode` calls.
    pub fn user_mode_write_count(&self) -> usize {
        self.inner.user_mode_writes.load(Ordering::SeqCst)
    }

    fn check_queries(&self, operation: &str) -> Result<()> {
        if self.inner.queries_fail.load(Ordering::SeqCst) {
            return Err(BillingError::StoreError {
                operation: operation.to_string(),
                message: "injected query failure".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn sorted(mut subscriptions: Vec<StoredSubscription>) -> Vec<StoredSubscription> {
        subscriptions.sort_by(|a, b| a.id.cmp(&b.id));
        subscriptions
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn ping(&self) -> Result<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(ReconcileError::database("in-memory store marked unreachable"));
        }
        Ok(())
    }

    async fn find_expired_grace_periods(&self, now: u64) -> Result<Vec<StoredSubscription>> {
        self.check_queries("find_expired_grace_periods")?;
        let subs = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Self::sorted(
            subs.values().filter(|s| s.grace_expired(now)).cloned().collect(),
        ))
    }

    async fn list_subscriptions_by_status(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<Vec<StoredSubscription>> {
        self.check_queries("list_subscriptions_by_status")?;
        let subs = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Self::sorted(
            subs.values()
                .filter(|s| statuses.contains(&s.status))
                .cloned()
                .collect(),
        ))
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<StoredSubscription>> {
        Ok(self.subscription(id))
    }

    async fn update_subscription(&self, id: &str, update: &SubscriptionUpdate) -> Result<()> {
        let failing = self
            .inner
            .failing_subscription_writes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id);
        if failing {
            return Err(BillingError::StoreError {
                operation: "update_subscription".to_string(),
                message: format!("injected write failure for {id}"),
            }
            .into());
        }

        let mut subs = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let sub = subs.get_mut(id).ok_or_else(|| BillingError::NoSubscription {
            subscription_id: id.to_string(),
        })?;
        update.apply_to(sub);
        sub.updated_at = unix_now();
        self.inner.subscription_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_user_mode(&self, user_id: &str) -> Result<Option<EntitlementMode>> {
        Ok(self.user_mode(user_id))
    }

    async fn update_user_mode(&self, user_id: &str, mode: EntitlementMode) -> Result<()> {
        let failing = self
            .inner
            .failing_user_writes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user_id);
        if failing {
            return Err(BillingError::StoreError {
                operation: "update_user_mode".to_string(),
                message: format!("injected write failure for {user_id}"),
            }
            .into());
        }

        let mut modes = self
            .inner
            .user_modes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let current = modes.get_mut(user_id).ok_or_else(|| BillingError::NoUser {
            user_id: user_id.to_string(),
        })?;
        *current = mode;
        self.inner.user_mode_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
