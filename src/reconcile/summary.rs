//! Run statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a single subscription during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A correction was applied (or would have been, in dry-run).
    Applied,
    /// Local state already matched; nothing written.
    Unchanged,
    /// A read or write failed, or the deadline passed.
    Failed,
}

/// Counts accumulated by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassTally {
    pub applied: u32,
    pub unchanged: u32,
    pub errors: u32,
}

impl PassTally {
    /// Tally for a pass that could not list its work at all.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Applied => self.applied += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Failed => self.errors += 1,
        }
    }

    /// Number of items seen.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.applied + self.unchanged + self.errors
    }
}

/// Result of one reconciliation run.
///
/// Serializes as `{"expiredGracePeriods": .., "syncedSubscriptions": .., "errors": .., ..}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    /// Grace periods found expired and downgraded.
    pub expired_grace_periods: u32,
    /// Subscriptions corrected to match Stripe, including ones Stripe no longer knows.
    pub synced_subscriptions: u32,
    /// Per-item and per-pass failures. Non-zero does not mean the run failed.
    pub errors: u32,
    /// Whether writes were suppressed.
    #[serde(default)]
    pub dry_run: bool,
    /// Wall-clock duration of the run.
    #[serde(default)]
    pub duration_ms: u64,
}

impl ReconcileSummary {
    #[must_use]
    pub fn from_passes(grace: PassTally, sync: PassTally, dry_run: bool, duration_ms: u64) -> Self {
        Self {
            expired_grace_periods: grace.applied,
            synced_subscriptions: sync.applied,
            errors: grace.errors + sync.errors,
            dry_run,
            duration_ms,
        }
    }

    /// True when the run hit no errors.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }

    /// True when the run found nothing to correct.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.expired_grace_periods == 0 && self.synced_subscriptions == 0
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expired {} grace period(s), synced {} subscription(s), {} error(s) in {}ms",
            self.expired_grace_periods, self.synced_subscriptions, self.errors, self.duration_ms
        )?;
        if self.dry_run {
            write!(f, " (dry run)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let mut tally = PassTally::default();
        tally.record(ItemOutcome::Applied);
        tally.record(ItemOutcome::Unchanged);
        tally.record(ItemOutcome::Unchanged);
        tally.record(ItemOutcome::Failed);

        assert_eq!(tally.applied, 1);
        assert_eq!(tally.unchanged, 2);
        assert_eq!(tally.errors, 1);
        assert_eq!(tally.total(), 4);
        assert_eq!(PassTally::failed().errors, 1);
    }

    #[test]
    fn test_summary_wire_shape() {
        let grace = PassTally { applied: 2, unchanged: 0, errors: 1 };
        let sync = PassTally { applied: 3, unchanged: 7, errors: 0 };
        let summary = ReconcileSummary::from_passes(grace, sync, false, 42);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["expiredGracePeriods"], 2);
        assert_eq!(json["syncedSubscriptions"], 3);
        assert_eq!(json["errors"], 1);
        assert_eq!(json["dryRun"], false);
        assert_eq!(json["durationMs"], 42);
        assert!(!summary.is_clean());
        assert!(!summary.is_noop());
    }

    #[test]
    fn test_summary_display() {
        let summary = ReconcileSummary {
            expired_grace_periods: 1,
            synced_subscriptions: 0,
            errors: 0,
            dry_run: true,
            duration_ms: 5,
        };
        assert_eq!(
            summary.to_string(),
            "expired 1 grace period(s), synced 0 subscription(s), 0 error(s) in 5ms (dry run)"
        );
        assert!(summary.is_clean());
    }
}
