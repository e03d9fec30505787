//! Subscription status and entitlement mapping.
//!
//! Pure functions translating Stripe's subscription status strings into the
//! local status enum, and local status into the user's entitlement mode.
//! Nothing in here performs I/O.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Local subscription status, mirroring Stripe with some lag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and paid.
    Active,
    /// Subscription is in trial period.
    Trialing,
    /// Payment failed; the subscription may be inside a grace period.
    PastDue,
    /// Subscription has been canceled.
    Canceled,
    /// Stripe gave up collecting payment.
    Unpaid,
}

impl SubscriptionStatus {
    /// Statuses the sync pass re-checks against Stripe on every run.
    pub const NON_TERMINAL: [SubscriptionStatus; 3] =
        [Self::Active, Self::Trialing, Self::PastDue];

    /// Parse from Stripe subscription status string.
    ///
    /// Unrecognized statuses (including Stripe's `incomplete`,
    /// `incomplete_expired` and `paused`) map to [`Canceled`](Self::Canceled)
    /// so an unknown state never grants access.
    #[must_use]
    pub fn from_stripe(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "unpaid" => Self::Unpaid,
            _ => Self::Canceled,
        }
    }

    /// Convert to the Stripe status string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
        }
    }

    /// Terminal statuses are never re-checked by the sync pass.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Unpaid)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Feature-access level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementMode {
    /// Everything the plan includes.
    Full,
    /// Degraded access after billing trouble.
    Restricted,
}

impl EntitlementMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Restricted => "RESTRICTED",
        }
    }
}

impl fmt::Display for EntitlementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntitlementMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FULL" => Ok(Self::Full),
            "RESTRICTED" => Ok(Self::Restricted),
            other => Err(format!("unknown entitlement mode: {other}")),
        }
    }
}

/// Entitlement granted to a `past_due` subscription while its grace period
/// has not yet elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraceEntitlement {
    /// Keep full access until the grace period ends.
    #[default]
    Full,
    /// Restrict as soon as the subscription becomes past due.
    Restricted,
}

impl GraceEntitlement {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Restricted => "restricted",
        }
    }
}

impl fmt::Display for GraceEntitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GraceEntitlement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "restricted" => Ok(Self::Restricted),
            other => Err(format!(
                "grace entitlement must be 'full' or 'restricted', got: {other}"
            )),
        }
    }
}

/// Entitlement derived from status alone.
#[must_use]
pub fn entitlement_for(status: SubscriptionStatus) -> EntitlementMode {
    match status {
        SubscriptionStatus::Active | SubscriptionStatus::Trialing => EntitlementMode::Full,
        SubscriptionStatus::PastDue | SubscriptionStatus::Canceled | SubscriptionStatus::Unpaid => {
            EntitlementMode::Restricted
        }
    }
}

/// Entitlement derived from status, taking an unexpired grace period into account.
#[must_use]
pub fn entitlement_with_grace(
    status: SubscriptionStatus,
    grace_period_ends_at: Option<u64>,
    now: u64,
    policy: GraceEntitlement,
) -> EntitlementMode {
    let in_grace = status == SubscriptionStatus::PastDue
        && grace_period_ends_at.is_some_and(|ends_at| ends_at > now);

    if in_grace && policy == GraceEntitlement::Full {
        EntitlementMode::Full
    } else {
        entitlement_for(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_stripe() {
        let table = [
            ("active", SubscriptionStatus::Active, EntitlementMode::Full),
            ("trialing", SubscriptionStatus::Trialing, EntitlementMode::Full),
            ("past_due", SubscriptionStatus::PastDue, EntitlementMode::Restricted),
            ("canceled", SubscriptionStatus::Canceled, EntitlementMode::Restricted),
            ("unpaid", SubscriptionStatus::Unpaid, EntitlementMode::Restricted),
        ];

        for (raw, status, mode) in table {
            let mapped = SubscriptionStatus::from_stripe(raw);
            assert_eq!(mapped, status, "status for {raw}");
            assert_eq!(entitlement_for(mapped), mode, "mode for {raw}");
            assert_eq!(mapped.as_str(), raw);
        }
    }

    #[test]
    fn test_unknown_status_fails_safe() {
        for raw in ["incomplete", "incomplete_expired", "paused", "ACTIVE", "", "bogus"] {
            let mapped = SubscriptionStatus::from_stripe(raw);
            assert_eq!(mapped, SubscriptionStatus::Canceled, "status for {raw:?}");
            assert_eq!(entitlement_for(mapped), EntitlementMode::Restricted);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::Unpaid.is_terminal());
        for status in SubscriptionStatus::NON_TERMINAL {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn test_grace_policy_full() {
        let now = 1_700_000_000;
        let mode = entitlement_with_grace(
            SubscriptionStatus::PastDue,
            Some(now + 3600),
            now,
            GraceEntitlement::Full,
        );
        assert_eq!(mode, EntitlementMode::Full);

        // Grace period ending exactly now has lapsed
        let mode = entitlement_with_grace(
            SubscriptionStatus::PastDue,
            Some(now),
            now,
            GraceEntitlement::Full,
        );
        assert_eq!(mode, EntitlementMode::Restricted);

        let mode = entitlement_with_grace(SubscriptionStatus::PastDue, None, now, GraceEntitlement::Full);
        assert_eq!(mode, EntitlementMode::Restricted);
    }

    #[test]
    fn test_grace_policy_restricted() {
        let now = 1_700_000_000;
        let mode = entitlement_with_grace(
            SubscriptionStatus::PastDue,
            Some(now + 3600),
            now,
            GraceEntitlement::Restricted,
        );
        assert_eq!(mode, EntitlementMode::Restricted);
    }

    #[test]
    fn test_grace_ignored_for_other_statuses() {
        let now = 1_700_000_000;
        let mode = entitlement_with_grace(
            SubscriptionStatus::Canceled,
            Some(now + 3600),
            now,
            GraceEntitlement::Full,
        );
        assert_eq!(mode, EntitlementMode::Restricted);

        let mode = entitlement_with_grace(SubscriptionStatus::Active, None, now, GraceEntitlement::Restricted);
        assert_eq!(mode, EntitlementMode::Full);
    }

    #[test]
    fn test_mode_parsing_and_serde() {
        assert_eq!("full".parse::<EntitlementMode>(), Ok(EntitlementMode::Full));
        assert_eq!("RESTRICTED".parse::<EntitlementMode>(), Ok(EntitlementMode::Restricted));
        assert!("partial".parse::<EntitlementMode>().is_err());

        assert_eq!(
            serde_json::to_string(&EntitlementMode::Restricted).unwrap(),
            "\"RESTRICTED\""
        );
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::PastDue).unwrap(),
            "\"past_due\""
        );
        assert_eq!("Restricted".parse::<GraceEntitlement>(), Ok(GraceEntitlement::Restricted));
        assert_eq!(GraceEntitlement::default(), GraceEntitlement::Full);
    }
}
