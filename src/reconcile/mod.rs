//! The reconciliation engine.
//!
//! A run is two independent passes over the billing store:
//!
//! 1. [`GraceSweeper`] downgrades users whose `past_due` grace period has lapsed.
//! 2. [`SyncPass`] re-reads every non-terminal subscription from Stripe and
//!    corrects local status, the cancel-at-period-end flag and the user's
//!    entitlement mode.
//!
//! [`Reconciler`] runs both and folds their counts into a [`ReconcileSummary`].
//! Nothing is cached between runs, so overlapping or repeated runs converge
//! on the same provider-derived state.

mod driver;
mod grace;
mod summary;
mod sync;

pub use driver::{Reconciler, ReconcilerConfig, DEFAULT_CONCURRENCY, DEFAULT_RUN_TIMEOUT};
pub use grace::GraceSweeper;
pub use summary::{ItemOutcome, PassTally, ReconcileSummary};
pub use sync::SyncPass;

use std::future::Future;
use tokio::time::Instant;

use crate::error::Result;

pub(crate) const LOG_TARGET: &str = "tideway::reconcile";

/// Drive one item to completion or to the run deadline.
///
/// Errors and deadline expiry are logged with the subscription id and
/// folded into [`ItemOutcome::Failed`].
pub(crate) async fn settle<F>(pass: &'static str, subscription_id: &str, deadline: Instant, work: F) -> ItemOutcome
where
    F: Future<Output = Result<ItemOutcome>>,
{
    if Instant::now() >= deadline {
        tracing::warn!(
            target: LOG_TARGET,
            pass,
            subscription_id = %subscription_id,
            "Run deadline passed before subscription was started"
        );
        return ItemOutcome::Failed;
    }

    match tokio::time::timeout_at(deadline, work).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::warn!(
                target: LOG_TARGET,
                pass,
                subscription_id = %subscription_id,
                error = %e,
                error_kind = e.kind(),
                "Failed to reconcile subscription"
            );
            ItemOutcome::Failed
        }
        Err(_) => {
            tracing::warn!(
                target: LOG_TARGET,
                pass,
                subscription_id = %subscription_id,
                "Run deadline passed before subscription was reconciled"
            );
            ItemOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_passes_outcome_through() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcome = settle("test", "local_1", deadline, async { Ok(ItemOutcome::Unchanged) }).await;
        assert_eq!(outcome, ItemOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_settle_counts_error() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcome = settle("test", "local_1", deadline, async {
            Err(ReconcileError::provider("boom"))
        })
        .await;
        assert_eq!(outcome, ItemOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_counts_deadline() {
        let deadline = Instant::now() + Duration::from_secs(1);
        let outcome = settle("test", "local_1", deadline, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ItemOutcome::Applied)
        })
        .await;
        assert_eq!(outcome, ItemOutcome::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_skips_work_after_deadline() {
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_secs(1)).await;
        let started = std::sync::atomic::AtomicBool::new(false);

        let outcome = settle("test", "local_1", deadline, async {
            started.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(ItemOutcome::Applied)
        })
        .await;

        assert_eq!(outcome, ItemOutcome::Failed);
        assert!(!started.load(std::sync::atomic::Ordering::SeqCst));
    }
}
