//! Audit logging for reconciliation.
//!
//! Every change the reconciler applies to a subscription or a user's
//! entitlement is reported through a [`BillingAuditLogger`], so drift that
//! the webhook path missed leaves a trail.

use std::fmt;

use super::status::{EntitlementMode, SubscriptionStatus};

/// Audit event types for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAuditEvent {
    /// Grace period lapsed; user downgraded and grace marker cleared.
    GracePeriodExpired {
        subscription_id: String,
        user_id: String,
        grace_period_ended_at: u64,
    },
    /// Local subscription corrected to match Stripe.
    SubscriptionResynced {
        subscription_id: String,
        stripe_subscription_id: String,
        previous_status: SubscriptionStatus,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    },
    /// Stripe no longer knows the subscription; marked canceled locally.
    SubscriptionMissingAtProvider {
        subscription_id: String,
        stripe_subscription_id: String,
    },
    /// User's entitlement mode changed.
    EntitlementChanged {
        user_id: String,
        previous: Option<EntitlementMode>,
        mode: EntitlementMode,
    },
    /// A full run finished.
    RunCompleted {
        expired_grace_periods: u32,
        synced_subscriptions: u32,
        errors: u32,
        dry_run: bool,
    },
}

impl fmt::Display for BillingAuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GracePeriodExpired { subscription_id, user_id, grace_period_ended_at } => {
                write!(f, "Grace period expired: sub={}, user={}, ended_at={}", subscription_id, user_id, grace_period_ended_at)
            }
            Self::SubscriptionResynced { subscription_id, stripe_subscription_id, previous_status, status, cancel_at_period_end } => {
                write!(f, "Subscription resynced: sub={}, stripe_sub={}, status={}->{}, cancel_at_period_end={}", subscription_id, stripe_subscription_id, previous_status, status, cancel_at_period_end)
            }
            Self::SubscriptionMissingAtProvider { subscription_id, stripe_subscription_id } => {
                write!(f, "Subscription missing at provider: sub={}, stripe_sub={}", subscription_id, stripe_subscription_id)
            }
            Self::EntitlementChanged { user_id, previous, mode } => {
                let previous = previous.map_or("none", |m| m.as_str());
                write!(f, "Entitlement changed: user={}, mode={}->{}", user_id, previous, mode)
            }
            Self::RunCompleted { expired_grace_periods, synced_subscriptions, errors, dry_run } => {
                write!(f, "Reconciliation run completed: expired={}, synced={}, errors={}, dry_run={}", expired_grace_periods, synced_subscriptions, errors, dry_run)
            }
        }
    }
}

/// Trait for audit logging backends.
#[allow(async_fn_in_trait)]
pub trait BillingAuditLogger: Send + Sync {
    /// Log a billing audit event.
    ///
    /// Implementations must not fail; a broken audit sink should never stop
    /// a reconciliation run.
    async fn log(&self, event: BillingAuditEvent);
}

/// No-op audit logger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditLogger;

impl BillingAuditLogger for NoOpAuditLogger {
    async fn log(&self, _event: BillingAuditEvent) {}
}

/// Tracing-based audit logger.
///
/// Logs audit events using the `tracing` crate at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl BillingAuditLogger for TracingAuditLogger {
    async fn log(&self, event: BillingAuditEvent) {
        tracing::info!(
            target: "billing::audit",
            event_type = %event_kind(&event),
            "{}", event
        );
    }
}

/// Get the event kind as a string for structured logging.
fn event_kind(event: &BillingAuditEvent) -> &'static str {
    match event {
        BillingAuditEvent::GracePeriodExpired { .. } => "grace_period_expired",
        BillingAuditEvent::SubscriptionResynced { .. } => "subscription_resynced",
        BillingAuditEvent::SubscriptionMissingAtProvider { .. } => "subscription_missing_at_provider",
        BillingAuditEvent::EntitlementChanged { .. } => "entitlement_changed",
        BillingAuditEvent::RunCompleted { .. } => "run_completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingAuditLogger;

    #[tokio::test]
    async fn test_noop_logger() {
        NoOpAuditLogger
            .log(BillingAuditEvent::RunCompleted {
                expired_grace_periods: 0,
                synced_subscriptions: 0,
                errors: 0,
                dry_run: false,
            })
            .await;
    }

    #[tokio::test]
    async fn test_recording_logger() {
        let logger = RecordingAuditLogger::new();

        logger
            .log(BillingAuditEvent::SubscriptionMissingAtProvider {
                subscription_id: "sub_local_1".to_string(),
                stripe_subscription_id: "sub_123".to_string(),
            })
            .await;
        logger
            .log(BillingAuditEvent::EntitlementChanged {
                user_id: "user_1".to_string(),
                previous: Some(EntitlementMode::Full),
                mode: EntitlementMode::Restricted,
            })
            .await;

        let events = logger.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], BillingAuditEvent::SubscriptionMissingAtProvider { .. }));
        assert!(matches!(events[1], BillingAuditEvent::EntitlementChanged { .. }));
    }

    #[test]
    fn test_event_display() {
        let event = BillingAuditEvent::SubscriptionResynced {
            subscription_id: "sub_local_1".to_string(),
            stripe_subscription_id: "sub_123".to_string(),
            previous_status: SubscriptionStatus::Active,
            status: SubscriptionStatus::PastDue,
            cancel_at_period_end: false,
        };
        let display = event.to_string();
        assert!(display.contains("sub_local_1"));
        assert!(display.contains("active->past_due"));

        let event = BillingAuditEvent::EntitlementChanged {
            user_id: "user_1".to_string(),
            previous: None,
            mode: EntitlementMode::Full,
        };
        assert_eq!(event.to_string(), "Entitlement changed: user=user_1, mode=none->FULL");
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(
            event_kind(&BillingAuditEvent::GracePeriodExpired {
                subscription_id: String::new(),
                user_id: String::new(),
                grace_period_ended_at: 0,
            }),
            "grace_period_expired"
        );
        assert_eq!(
            event_kind(&BillingAuditEvent::RunCompleted {
                expired_grace_periods: 0,
                synced_subscriptions: 0,
                errors: 0,
                dry_run: true,
            }),
            "run_completed"
        );
    }
}
