//! Reconciliation driver.

use std::time::Duration;
use tokio::time::Instant;

use crate::billing::{
    BillingAuditEvent, BillingAuditLogger, BillingStore, GraceEntitlement, StripeSubscriptionClient,
    TracingAuditLogger,
};
use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::utils::unix_now;

use super::grace::GraceSweeper;
use super::summary::ReconcileSummary;
use super::sync::SyncPass;
use super::LOG_TARGET;

/// Default number of subscriptions handled at once within a pass.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default budget for a whole run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Maximum number of subscriptions handled at once within a pass.
    pub concurrency: usize,
    /// Budget for a whole run; work still in flight afterwards is abandoned.
    pub run_timeout: Duration,
    /// Entitlement while a `past_due` subscription is inside its grace period.
    pub grace_entitlement: GraceEntitlement,
    /// Detect and count drift without writing anything.
    pub dry_run: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            grace_entitlement: GraceEntitlement::default(),
            dry_run: false,
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    #[must_use]
    pub fn grace_entitlement(mut self, policy: GraceEntitlement) -> Self {
        self.grace_entitlement = policy;
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl From<&ReconcileConfig> for ReconcilerConfig {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            run_timeout: Duration::from_secs(config.timeout_seconds),
            grace_entitlement: config.grace_entitlement,
            dry_run: config.dry_run,
        }
    }
}

/// Runs the grace sweep and the Stripe sync pass.
///
/// Holds no state between runs. Each run re-reads everything from the store,
/// so calling [`run`](Self::run) repeatedly, or from overlapping schedules,
/// is safe.
pub struct Reconciler<S, C, A = TracingAuditLogger> {
    store: S,
    client: C,
    audit: A,
    config: ReconcilerConfig,
}

impl<S: BillingStore, C: StripeSubscriptionClient> Reconciler<S, C> {
    /// Create a reconciler that audits through `tracing`.
    #[must_use]
    pub fn new(store: S, client: C, config: ReconcilerConfig) -> Self {
        Self {
            store,
            client,
            audit: TracingAuditLogger,
            config,
        }
    }
}

impl<S, C, A> Reconciler<S, C, A>
where
    S: BillingStore,
    C: StripeSubscriptionClient,
    A: BillingAuditLogger,
{
    /// Replace the audit logger.
    #[must_use]
    pub fn with_audit_logger<L: BillingAuditLogger>(self, audit: L) -> Reconciler<S, C, L> {
        Reconciler {
            store: self.store,
            client: self.client,
            audit,
            config: self.config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run once, giving up on in-flight work after the configured timeout.
    ///
    /// # Errors
    ///
    /// Fails only when the run cannot start: the store or Stripe is
    /// unreachable. Per-subscription failures are counted in the summary.
    pub async fn run(&self) -> Result<ReconcileSummary> {
        self.run_until(Instant::now() + self.config.run_timeout).await
    }

    /// Run once with an explicit deadline.
    pub async fn run_until(&self, deadline: Instant) -> Result<ReconcileSummary> {
        self.run_at(unix_now(), deadline).await
    }

    /// Run once as if the wall clock read `now`.
    pub async fn run_at(&self, now: u64, deadline: Instant) -> Result<ReconcileSummary> {
        let started = std::time::Instant::now();

        self.preflight(deadline).await.map_err(|e| {
            tracing::error!(target: LOG_TARGET, error = %e, error_kind = e.kind(), "Reconciliation could not start");
            e
        })?;

        tracing::info!(
            target: LOG_TARGET,
            now,
            concurrency = self.config.concurrency,
            dry_run = self.config.dry_run,
            grace_entitlement = %self.config.grace_entitlement,
            "Starting reconciliation run"
        );

        let grace = GraceSweeper::new(&self.store, &self.audit)
            .with_concurrency(self.config.concurrency)
            .with_dry_run(self.config.dry_run)
            .sweep(now, deadline)
            .await;

        let sync = SyncPass::new(&self.store, &self.client, &self.audit)
            .with_concurrency(self.config.concurrency)
            .with_grace_entitlement(self.config.grace_entitlement)
            .with_dry_run(self.config.dry_run)
            .sync(now, deadline)
            .await;

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = ReconcileSummary::from_passes(grace, sync, self.config.dry_run, duration_ms);

        tracing::info!(
            target: LOG_TARGET,
            expired_grace_periods = summary.expired_grace_periods,
            synced_subscriptions = summary.synced_subscriptions,
            unchanged_subscriptions = sync.unchanged,
            errors = summary.errors,
            dry_run = summary.dry_run,
            duration_ms = summary.duration_ms,
            "Reconciliation run completed"
        );
        self.audit
            .log(BillingAuditEvent::RunCompleted {
                expired_grace_periods: summary.expired_grace_periods,
                synced_subscriptions: summary.synced_subscriptions,
                errors: summary.errors,
                dry_run: summary.dry_run,
            })
            .await;

        Ok(summary)
    }

    async fn preflight(&self, deadline: Instant) -> Result<()> {
        let checks = async {
            self.store.ping().await?;
            self.client.ping().await
        };
        tokio::time::timeout_at(deadline, checks)
            .await
            .map_err(|_| ReconcileError::timeout("store and Stripe health checks did not finish before the run deadline"))?
    }
}
