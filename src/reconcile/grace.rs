//! Grace period sweeper.
//!
//! A `past_due` subscription keeps its grace marker until the sweeper sees
//! it lapse. The downgrade is two writes: user mode first, then the marker.
//! If the second write fails the row is still due, and the next sweep
//! re-applies the same downgrade.

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::billing::{
    BillingAuditEvent, BillingAuditLogger, BillingStore, EntitlementMode, StoredSubscription,
    SubscriptionUpdate,
};
use crate::error::Result;

use super::summary::{ItemOutcome, PassTally};
use super::{settle, DEFAULT_CONCURRENCY, LOG_TARGET};

/// Downgrades users whose grace period has run out.
pub struct GraceSweeper<'a, S, A> {
    store: &'a S,
    audit: &'a A,
    concurrency: usize,
    dry_run: bool,
}

impl<'a, S: BillingStore, A: BillingAuditLogger> GraceSweeper<'a, S, A> {
    #[must_use]
    pub fn new(store: &'a S, audit: &'a A) -> Self {
        Self {
            store,
            audit,
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
        }
    }

    /// Maximum number of subscriptions handled at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Count due subscriptions without writing anything.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Expire every grace period ending at or before `now`.
    ///
    /// `applied` in the returned tally is the number of expired grace periods.
    pub async fn sweep(&self, now: u64, deadline: Instant) -> PassTally {
        let due = match tokio::time::timeout_at(deadline, self.store.find_expired_grace_periods(now)).await {
            Ok(Ok(due)) => due,
            Ok(Err(e)) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "Failed to query expired grace periods");
                return PassTally::failed();
            }
            Err(_) => {
                tracing::warn!(target: LOG_TARGET, "Run deadline passed while querying expired grace periods");
                return PassTally::failed();
            }
        };

        tracing::debug!(target: LOG_TARGET, count = due.len(), "Found expired grace periods");

        stream::iter(due.into_iter().filter(|sub| sub.grace_expired(now)))
            .map(|sub| async move { settle("grace", &sub.id, deadline, self.expire(&sub)).await })
            .buffer_unordered(self.concurrency)
            .fold(PassTally::default(), |mut tally, outcome| async move {
                tally.record(outcome);
                tally
            })
            .await
    }

    async fn expire(&self, sub: &StoredSubscription) -> Result<ItemOutcome> {
        let ended_at = sub.grace_period_ends_at.unwrap_or_default();

        if self.dry_run {
            tracing::info!(
                target: LOG_TARGET,
                subscription_id = %sub.id,
                user_id = %sub.user_id,
                grace_period_ended_at = ended_at,
                "Dry run: would expire grace period"
            );
            return Ok(ItemOutcome::Applied);
        }

        if self.store.get_user_mode(&sub.user_id).await?.is_some() {
            self.store
                .update_user_mode(&sub.user_id, EntitlementMode::Restricted)
                .await?;
        } else {
            tracing::warn!(
                target: LOG_TARGET,
                subscription_id = %sub.id,
                user_id = %sub.user_id,
                "User not found, entitlement mode not written"
            );
        }
        self.store
            .update_subscription(&sub.id, &SubscriptionUpdate::new().clear_grace_period())
            .await?;

        tracing::info!(
            target: LOG_TARGET,
            subscription_id = %sub.id,
            user_id = %sub.user_id,
            grace_period_ended_at = ended_at,
            "Grace period expired, user restricted"
        );
        self.audit
            .log(BillingAuditEvent::GracePeriodExpired {
                subscription_id: sub.id.clone(),
                user_id: sub.user_id.clone(),
                grace_period_ended_at: ended_at,
            })
            .await;

        Ok(ItemOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::SubscriptionStatus;
    use crate::testing::{fixtures, InMemoryBillingStore, RecordingAuditLogger};
    use std::time::Duration;

    const NOW: u64 = 1_700_100_000;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    fn seeded() -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        store.insert_subscription(fixtures::past_due_subscription("local_1", "user_1", "sub_1", NOW - 60));
        store.insert_subscription(fixtures::past_due_subscription("local_2", "user_2", "sub_2", NOW));
        store.insert_subscription(fixtures::past_due_subscription("local_3", "user_3", "sub_3", NOW + 60));
        for user in ["user_1", "user_2", "user_3"] {
            store.set_user_mode(user, EntitlementMode::Full);
        }
        store
    }

    #[tokio::test]
    async fn test_sweep_expires_lapsed_grace_periods() {
        let store = seeded();
        let audit = RecordingAuditLogger::new();

        let tally = GraceSweeper::new(&store, &audit).sweep(NOW, deadline()).await;

        assert_eq!(tally.applied, 2);
        assert_eq!(tally.errors, 0);
        for (id, user) in [("local_1", "user_1"), ("local_2", "user_2")] {
            let sub = store.subscription(id).unwrap();
            assert_eq!(sub.grace_period_ends_at, None);
            assert_eq!(sub.status, SubscriptionStatus::PastDue);
            assert_eq!(store.user_mode(user), Some(EntitlementMode::Restricted));
        }
        assert_eq!(audit.events().len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_leaves_active_grace_alone() {
        let store = seeded();
        let before = store.subscription("local_3").unwrap();

        GraceSweeper::new(&store, &RecordingAuditLogger::new())
            .sweep(NOW, deadline())
            .await;

        assert_eq!(store.subscription("local_3").unwrap(), before);
        assert_eq!(store.user_mode("user_3"), Some(EntitlementMode::Full));
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures_and_recovers() {
        let store = seeded();
        store.fail_subscription_writes_for("local_1");
        let audit = RecordingAuditLogger::new();

        let tally = GraceSweeper::new(&store, &audit).sweep(NOW, deadline()).await;
        assert_eq!(tally.applied, 1);
        assert_eq!(tally.errors, 1);

        // Mode write landed, marker did not: still due.
        assert_eq!(store.user_mode("user_1"), Some(EntitlementMode::Restricted));
        assert_eq!(store.subscription("local_1").unwrap().grace_period_ends_at, Some(NOW - 60));

        store.clear_failures();
        let tally = GraceSweeper::new(&store, &audit).sweep(NOW, deadline()).await;
        assert_eq!(tally.applied, 1);
        assert_eq!(tally.errors, 0);
        assert_eq!(store.user_mode("user_1"), Some(EntitlementMode::Restricted));
        assert_eq!(store.subscription("local_1").unwrap().grace_period_ends_at, None);
    }

    #[tokio::test]
    async fn test_sweep_missing_user_still_clears_marker() {
        let store = InMemoryBillingStore::new();
        store.insert_subscription(fixtures::past_due_subscription("local_1", "user_gone", "sub_1", NOW - 60));
        let audit = RecordingAuditLogger::new();

        let tally = GraceSweeper::new(&store, &audit).sweep(NOW, deadline()).await;

        assert_eq!(tally.applied, 1);
        assert_eq!(tally.errors, 0);
        assert_eq!(store.subscription("local_1").unwrap().grace_period_ends_at, None);
        assert_eq!(store.user_mode("user_gone"), None);
        assert_eq!(store.user_mode_write_count(), 0);

        let tally = GraceSweeper::new(&store, &audit).sweep(NOW, deadline()).await;
        assert_eq!(tally.total(), 0);
    }

    #[tokio::test]
    async fn test_sweep_query_failure_counts_once() {
        let store = seeded();
        store.set_queries_fail(true);

        let tally = GraceSweeper::new(&store, &RecordingAuditLogger::new())
            .sweep(NOW, deadline())
            .await;

        assert_eq!(tally, PassTally::failed());
        assert_eq!(store.user_mode("user_1"), Some(EntitlementMode::Full));
    }

    #[tokio::test]
    async fn test_sweep_dry_run_writes_nothing() {
        let store = seeded();
        let audit = RecordingAuditLogger::new();

        let tally = GraceSweeper::new(&store, &audit)
            .with_dry_run(true)
            .with_concurrency(1)
            .sweep(NOW, deadline())
            .await;

        assert_eq!(tally.applied, 2);
        assert_eq!(store.subscription_write_count(), 0);
        assert_eq!(store.user_mode_write_count(), 0);
        assert!(audit.events().is_empty());
    }
}
