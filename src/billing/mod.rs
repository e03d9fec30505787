//! Billing state the reconciler reads and corrects.
//!
//! Capability traits for the persistent store ([`BillingStore`]) and for
//! Stripe ([`StripeSubscriptionClient`]), the records they exchange, the
//! status mapping table, and the audit trail. Concrete backends live behind
//! features:
//!
//! - `stripe` - [`LiveStripeClient`] on `async-stripe`
//! - `seaorm` - [`SeaOrmBillingStore`] on SeaORM

pub mod audit;
pub mod error;
#[cfg(feature = "stripe")]
pub mod live_client;
#[cfg(feature = "seaorm")]
pub mod sea_orm_store;
pub mod status;
pub mod storage;
pub mod subscription;

// Status exports
pub use status::{
    entitlement_for, entitlement_with_grace, EntitlementMode, GraceEntitlement, SubscriptionStatus,
};

// Storage exports
pub use storage::{BillingStore, StoredSubscription, SubscriptionUpdate};

// Provider exports
pub use subscription::{StripeSubscriptionClient, StripeSubscriptionData};

// Audit exports
pub use audit::{BillingAuditEvent, BillingAuditLogger, NoOpAuditLogger, TracingAuditLogger};

// Error exports
pub use error::BillingError;

#[cfg(feature = "stripe")]
pub use live_client::{InvalidApiKeyError, LiveStripeClient, LiveStripeClientConfig};

#[cfg(feature = "seaorm")]
pub use sea_orm_store::SeaOrmBillingStore;
