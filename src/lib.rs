//! Tideway Reconcile - pull-based billing reconciliation
//!
//! Stripe is the source of truth for subscription state, and webhooks are the
//! fast path for keeping a local copy in step with it. Webhooks get lost.
//! This crate is the slow path: a stateless, idempotent run an external
//! scheduler invokes periodically, which
//!
//! - expires lapsed grace periods and restricts the affected users, and
//! - re-reads every non-terminal subscription from Stripe, corrects status
//!   and cancel-at-period-end drift, and recomputes the user's entitlement.
//!
//! Per-subscription failures are counted, never raised. Only a run that
//! cannot start at all returns an error.
//!
//! # Features
//!
//! - `stripe` (default): [`billing::LiveStripeClient`] on `async-stripe`
//! - `seaorm` (default): [`billing::SeaOrmBillingStore`] on SeaORM
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tideway_reconcile::billing::{LiveStripeClient, LiveStripeClientConfig, SeaOrmBillingStore};
//! use tideway_reconcile::{ConfigBuilder, Reconciler, ReconcilerConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tideway_reconcile::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let store = SeaOrmBillingStore::connect(&config.database).await?;
//!     let client = LiveStripeClient::new(stripe_key, LiveStripeClientConfig::default())?;
//!
//!     let summary = Reconciler::new(store, client, ReconcilerConfig::from(&config.reconcile))
//!         .run()
//!         .await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod billing;
pub mod config;
mod error;
pub mod reconcile;
pub mod testing;
mod utils;

// Re-exports for public API
pub use billing::{
    BillingAuditEvent, BillingAuditLogger, BillingStore, EntitlementMode, GraceEntitlement,
    StoredSubscription, StripeSubscriptionClient, StripeSubscriptionData, SubscriptionStatus,
    SubscriptionUpdate,
};
pub use config::{Config, ConfigBuilder, DatabaseConfig, LoggingConfig, ReconcileConfig, StripeConfig};
pub use error::{ReconcileError, Result};
pub use reconcile::{GraceSweeper, PassTally, ReconcileSummary, Reconciler, ReconcilerConfig, SyncPass};
pub use utils::unix_now;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "tideway::reconcile=debug")
/// - `TIDEWAY_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("TIDEWAY_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from a [`Config`]
///
/// `RUST_LOG` still wins over `config.logging.level` when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
