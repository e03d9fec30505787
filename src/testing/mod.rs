//! Testing utilities for reconciliation
//!
//! In-memory fakes for the two capability traits the reconciler depends on,
//! with failure injection, plus fixture builders.
//!
//! # Example
//!
//! ```rust
//! use tideway_reconcile::testing::{fixtures, InMemoryBillingStore, MockStripeSubscriptionClient};
//! use tideway_reconcile::{EntitlementMode, Reconciler, ReconcilerConfig, SubscriptionStatus};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryBillingStore::new();
//! store.insert_subscription(fixtures::stored_subscription("local_1", "user_1", "sub_1", SubscriptionStatus::Active));
//! store.set_user_mode("user_1", EntitlementMode::Full);
//!
//! let client = MockStripeSubscriptionClient::new();
//! client.add_subscription(fixtures::stripe_subscription("sub_1", "past_due", false));
//!
//! let reconciler = Reconciler::new(store.clone(), client, ReconcilerConfig::default());
//! let summary = reconciler.run().await.unwrap();
//!
//! assert_eq!(summary.synced_subscriptions, 1);
//! assert_eq!(store.user_mode("user_1"), Some(EntitlementMode::Restricted));
//! # }
//! ```

mod audit;
pub mod fixtures;
mod provider;
mod store;

pub use audit::RecordingAuditLogger;
pub use provider::MockStripeSubscriptionClient;
pub use store::InMemoryBillingStore;
