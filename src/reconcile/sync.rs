//! Provider sync pass.
//!
//! Stripe is authoritative. Every subscription the store still considers
//! live is looked up, and any drift in status or the cancel-at-period-end
//! flag is written back along with the entitlement mode it implies.

use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::billing::{
    entitlement_with_grace, BillingAuditEvent, BillingAuditLogger, BillingStore, EntitlementMode,
    GraceEntitlement, StoredSubscription, StripeSubscriptionClient, SubscriptionStatus,
    SubscriptionUpdate,
};
use crate::error::Result;

use super::summary::{ItemOutcome, PassTally};
use super::{settle, DEFAULT_CONCURRENCY, LOG_TARGET};

/// Re-synchronizes non-terminal subscriptions against Stripe.
pub struct SyncPass<'a, S, C, A> {
    store: &'a S,
    client: &'a C,
    audit: &'a A,
    concurrency: usize,
    grace_entitlement: GraceEntitlement,
    dry_run: bool,
}

/// Target state for one subscription, derived from Stripe's record.
struct Correction {
    status: SubscriptionStatus,
    cancel_at_period_end: bool,
    missing_at_provider: bool,
}

impl<'a, S, C, A> SyncPass<'a, S, C, A>
where
    S: BillingStore,
    C: StripeSubscriptionClient,
    A: BillingAuditLogger,
{
    #[must_use]
    pub fn new(store: &'a S, client: &'a C, audit: &'a A) -> Self {
        Self {
            store,
            client,
            audit,
            concurrency: DEFAULT_CONCURRENCY,
            grace_entitlement: GraceEntitlement::default(),
            dry_run: false,
        }
    }

    /// Maximum number of Stripe lookups in flight.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Entitlement for a `past_due` subscription still inside its grace period.
    #[must_use]
    pub fn with_grace_entitlement(mut self, policy: GraceEntitlement) -> Self {
        self.grace_entitlement = policy;
        self
    }

    /// Detect drift without writing anything.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sync every subscription whose local status is non-terminal.
    ///
    /// `applied` in the returned tally is the number of synced subscriptions.
    pub async fn sync(&self, now: u64, deadline: Instant) -> PassTally {
        let listed = tokio::time::timeout_at(
            deadline,
            self.store
                .list_subscriptions_by_status(&SubscriptionStatus::NON_TERMINAL),
        )
        .await;
        let subscriptions = match listed {
            Ok(Ok(subscriptions)) => subscriptions,
            Ok(Err(e)) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "Failed to list subscriptions for sync");
                return PassTally::failed();
            }
            Err(_) => {
                tracing::warn!(target: LOG_TARGET, "Run deadline passed while listing subscriptions for sync");
                return PassTally::failed();
            }
        };

        tracing::debug!(target: LOG_TARGET, count = subscriptions.len(), "Syncing subscriptions with Stripe");

        stream::iter(subscriptions)
            .map(|sub| async move { settle("sync", &sub.id, deadline, self.sync_one(&sub, now)).await })
            .buffer_unordered(self.concurrency)
            .fold(PassTally::default(), |mut tally, outcome| async move {
                tally.record(outcome);
                tally
            })
            .await
    }

    async fn sync_one(&self, sub: &StoredSubscription, now: u64) -> Result<ItemOutcome> {
        let remote = self
            .client
            .get_subscription(&sub.stripe_subscription_id)
            .await?;

        let correction = match remote {
            Some(data) => {
                let status = data.mapped_status();
                if status == sub.status && data.cancel_at_period_end == sub.cancel_at_period_end {
                    return Ok(ItemOutcome::Unchanged);
                }
                Correction {
                    status,
                    cancel_at_period_end: data.cancel_at_period_end,
                    missing_at_provider: false,
                }
            }
            // Stripe no longer knows the subscription: it was canceled.
            None => Correction {
                status: SubscriptionStatus::Canceled,
                cancel_at_period_end: sub.cancel_at_period_end,
                missing_at_provider: true,
            },
        };

        let grace_period_ends_at = if correction.status == SubscriptionStatus::PastDue {
            sub.grace_period_ends_at
        } else {
            None
        };
        let mode = if correction.missing_at_provider {
            EntitlementMode::Restricted
        } else {
            entitlement_with_grace(correction.status, grace_period_ends_at, now, self.grace_entitlement)
        };

        if self.dry_run {
            tracing::info!(
                target: LOG_TARGET,
                subscription_id = %sub.id,
                stripe_subscription_id = %sub.stripe_subscription_id,
                from = %sub.status,
                to = %correction.status,
                cancel_at_period_end = correction.cancel_at_period_end,
                mode = %mode,
                missing_at_provider = correction.missing_at_provider,
                "Dry run: would resync subscription"
            );
            return Ok(ItemOutcome::Applied);
        }

        // Mode first: if the status write then fails, the record is still
        // dirty and the next run repeats both writes.
        let previous = self.store.get_user_mode(&sub.user_id).await?;
        let mode_changed = match previous {
            Some(current) => current != mode,
            None => {
                tracing::warn!(
                    target: LOG_TARGET,
                    subscription_id = %sub.id,
                    user_id = %sub.user_id,
                    "User not found, entitlement mode not written"
                );
                false
            }
        };
        if mode_changed {
            self.store.update_user_mode(&sub.user_id, mode).await?;
        }

        let mut update = SubscriptionUpdate::new()
            .status(correction.status)
            .cancel_at_period_end(correction.cancel_at_period_end);
        if grace_period_ends_at.is_none() && sub.grace_period_ends_at.is_some() {
            update = update.clear_grace_period();
        }
        self.store.update_subscription(&sub.id, &update).await?;

        if mode_changed {
            self.audit
                .log(BillingAuditEvent::EntitlementChanged {
                    user_id: sub.user_id.clone(),
                    previous,
                    mode,
                })
                .await;
        }

        if correction.missing_at_provider {
            tracing::info!(
                target: LOG_TARGET,
                subscription_id = %sub.id,
                stripe_subscription_id = %sub.stripe_subscription_id,
                "Subscription missing at Stripe, marked canceled"
            );
            self.audit
                .log(BillingAuditEvent::SubscriptionMissingAtProvider {
                    subscription_id: sub.id.clone(),
                    stripe_subscription_id: sub.stripe_subscription_id.clone(),
                })
                .await;
        } else {
            tracing::info!(
                target: LOG_TARGET,
                subscription_id = %sub.id,
                stripe_subscription_id = %sub.stripe_subscription_id,
                from = %sub.status,
                to = %correction.status,
                cancel_at_period_end = correction.cancel_at_period_end,
                "Subscription resynced from Stripe"
            );
            self.audit
                .log(BillingAuditEvent::SubscriptionResynced {
                    subscription_id: sub.id.clone(),
                    stripe_subscription_id: sub.stripe_subscription_id.clone(),
                    previous_status: sub.status,
                    status: correction.status,
                    cancel_at_period_end: correction.cancel_at_period_end,
                })
                .await;
        }

        Ok(ItemOutcome::Applied)
    }
}
