//! SeaORM-backed billing storage.
//!
//! Reads and corrects the `billing_subscriptions` table and the `mode`
//! column of `users`. Timestamps are stored as Unix seconds in `BIGINT`
//! columns.
//!
//! # Example
//!
//! ```rust,ignore
//! use tideway_reconcile::billing::SeaOrmBillingStore;
//!
//! let store = SeaOrmBillingStore::connect(&config.database).await?;
//! let reconciler = Reconciler::new(store, stripe_client, ReconcilerConfig::default());
//! ```

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use std::time::Duration;

use super::status::{EntitlementMode, SubscriptionStatus};
use super::storage::{BillingStore, StoredSubscription, SubscriptionUpdate};
use crate::config::DatabaseConfig;
use crate::error::{ReconcileError, Result};

// =============================================================================
// SeaORM Entities
// =============================================================================

mod entity {
    // -------------------------------------------------------------------------
    // Billing Subscription Entity
    // -------------------------------------------------------------------------
    pub mod billing_subscription {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "billing_subscriptions")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub user_id: String,
            #[sea_orm(unique)]
            pub stripe_subscription_id: String,
            pub status: String,
            pub cancel_at_period_end: bool,
            pub current_period_start: i64,
            pub current_period_end: i64,
            pub grace_period_ends_at: Option<i64>,
            pub updated_at: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    // -------------------------------------------------------------------------
    // User Entity (entitlement projection only)
    // -------------------------------------------------------------------------
    pub mod user {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "users")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub mode: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{billing_subscription, user};

// =============================================================================
// Helper Functions
// =============================================================================

/// Convert i64 to u64 safely (negative values become 0).
#[inline]
fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Convert u64 to i64 safely (values > i64::MAX become i64::MAX).
#[inline]
fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn db_error(operation: &str, e: sea_orm::DbErr) -> ReconcileError {
    ReconcileError::database(format!("{operation}: {e}"))
}

/// Convert a database model to a StoredSubscription.
///
/// An unrecognized status string reads as `canceled`, the same fallback
/// used for Stripe statuses.
fn model_to_stored_subscription(model: billing_subscription::Model) -> StoredSubscription {
    StoredSubscription {
        id: model.id,
        user_id: model.user_id,
        stripe_subscription_id: model.stripe_subscription_id,
        status: SubscriptionStatus::from_stripe(&model.status),
        cancel_at_period_end: model.cancel_at_period_end,
        current_period_start: i64_to_u64(model.current_period_start),
        current_period_end: i64_to_u64(model.current_period_end),
        grace_period_ends_at: model.grace_period_ends_at.map(i64_to_u64),
        updated_at: i64_to_u64(model.updated_at),
    }
}

/// Build an UPDATE touching only the fields set in `update`.
fn build_subscription_update(
    id: &str,
    update: &SubscriptionUpdate,
    updated_at: i64,
) -> sea_orm::UpdateMany<billing_subscription::Entity> {
    let mut query = billing_subscription::Entity::update_many()
        .col_expr(billing_subscription::Column::UpdatedAt, Expr::value(updated_at));

    if let Some(status) = update.status {
        query = query.col_expr(billing_subscription::Column::Status, Expr::value(status.as_str()));
    }
    if let Some(cancel) = update.cancel_at_period_end {
        query = query.col_expr(billing_subscription::Column::CancelAtPeriodEnd, Expr::value(cancel));
    }
    if let Some(grace) = update.grace_period_ends_at {
        query = query.col_expr(
            billing_subscription::Column::GracePeriodEndsAt,
            Expr::value(grace.map(u64_to_i64)),
        );
    }

    query.filter(billing_subscription::Column::Id.eq(id))
}

// =============================================================================
// SeaOrmBillingStore
// =============================================================================

/// SeaORM-backed billing store implementing the BillingStore trait.
///
/// Every write is a single keyed UPDATE, so concurrent runs race to the
/// same provider-derived values.
#[derive(Clone, Debug)]
pub struct SeaOrmBillingStore {
    db: DatabaseConnection,
}

impl SeaOrmBillingStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open a connection pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no URL is set, or a database error if
    /// the pool cannot be created.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(ReconcileError::config("DATABASE_URL is not set"));
        }

        let mut options = ConnectOptions::new(config.url.clone());
        options
            .max_connections(config.max_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .sqlx_logging(false);

        let db = Database::connect(options)
            .await
            .map_err(|e| db_error("connect", e))?;

        tracing::debug!(
            max_connections = config.max_connections,
            "connected billing store"
        );

        Ok(Self::new(db))
    }
}

#[async_trait]
impl BillingStore for SeaOrmBillingStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await.map_err(|e| db_error("ping", e))
    }

    async fn find_expired_grace_periods(&self, now: u64) -> Result<Vec<StoredSubscription>> {
        tracing::debug!(now, "querying expired grace periods");

        let rows = billing_subscription::Entity::find()
            .filter(billing_subscription::Column::Status.eq(SubscriptionStatus::PastDue.as_str()))
            .filter(billing_subscription::Column::GracePeriodEndsAt.is_not_null())
            .filter(billing_subscription::Column::GracePeriodEndsAt.lte(u64_to_i64(now)))
            .order_by_asc(billing_subscription::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| db_error("find_expired_grace_periods", e))?;

        Ok(rows.into_iter().map(model_to_stored_subscription).collect())
    }

    async fn list_subscriptions_by_status(
        &self,
        statuses: &[SubscriptionStatus],
    ) -> Result<Vec<StoredSubscription>> {
        let rows = billing_subscription::Entity::find()
            .filter(billing_subscription::Column::Status.is_in(statuses.iter().map(|s| s.as_str())))
            .order_by_asc(billing_subscription::Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| db_error("list_subscriptions_by_status", e))?;

        Ok(rows.into_iter().map(model_to_stored_subscription).collect())
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<StoredSubscription>> {
        let row = billing_subscription::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("get_subscription", e))?;

        Ok(row.map(model_to_stored_subscription))
    }

    async fn update_subscription(&self, id: &str, update: &SubscriptionUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        tracing::debug!(subscription_id = %id, ?update, "updating subscription");

        let updated_at = chrono::Utc::now().timestamp();
        let result = build_subscription_update(id, update, updated_at)
            .exec(&self.db)
            .await
            .map_err(|e| db_error("update_subscription", e))?;

        if result.rows_affected == 0 {
            return Err(super::error::BillingError::NoSubscription {
                subscription_id: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn get_user_mode(&self, user_id: &str) -> Result<Option<EntitlementMode>> {
        let row = user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await
            .map_err(|e| db_error("get_user_mode", e))?;

        row.map(|u| {
            u.mode
                .parse()
                .map_err(|e: String| ReconcileError::database(format!("user {user_id}: {e}")))
        })
        .transpose()
    }

    async fn update_user_mode(&self, user_id: &str, mode: EntitlementMode) -> Result<()> {
        tracing::debug!(user_id = %user_id, mode = %mode, "updating user mode");

        let result = user::Entity::update_many()
            .col_expr(user::Column::Mode, Expr::value(mode.as_str()))
            .filter(user::Column::Id.eq(user_id))
            .exec(&self.db)
            .await
            .map_err(|e| db_error("update_user_mode", e))?;

        if result.rows_affected == 0 {
            return Err(super::error::BillingError::NoUser {
                user_id: user_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    fn model() -> billing_subscription::Model {
        billing_subscription::Model {
            id: "local_1".to_string(),
            user_id: "user_1".to_string(),
            stripe_subscription_id: "sub_abc".to_string(),
            status: "past_due".to_string(),
            cancel_at_period_end: true,
            current_period_start: 1700000000,
            current_period_end: 1702592000,
            grace_period_ends_at: Some(1700500000),
            updated_at: 1700000000,
        }
    }

    #[test]
    fn test_model_to_stored_subscription() {
        let stored = model_to_stored_subscription(model());

        assert_eq!(stored.id, "local_1");
        assert_eq!(stored.user_id, "user_1");
        assert_eq!(stored.stripe_subscription_id, "sub_abc");
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        assert!(stored.cancel_at_period_end);
        assert_eq!(stored.current_period_end, 1702592000);
        assert_eq!(stored.grace_period_ends_at, Some(1700500000));
    }

    #[test]
    fn test_unknown_status_reads_as_canceled() {
        let mut m = model();
        m.status = "archived".to_string();
        assert_eq!(model_to_stored_subscription(m).status, SubscriptionStatus::Canceled);
    }

    #[test]
    fn test_update_touches_only_set_fields() {
        let update = SubscriptionUpdate::new().clear_grace_period();
        let sql = build_subscription_update("local_1", &update, 1700000000)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("grace_period_ends_at"));
        assert!(sql.contains("NULL"));
        assert!(sql.contains("updated_at"));
        assert!(!sql.contains("status"));
        assert!(!sql.contains("cancel_at_period_end"));
        assert!(sql.contains("'local_1'"));

        let update = SubscriptionUpdate::new()
            .status(SubscriptionStatus::Canceled)
            .cancel_at_period_end(false);
        let sql = build_subscription_update("local_1", &update, 1700000000)
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains("'canceled'"));
        assert!(sql.contains("cancel_at_period_end"));
        assert!(!sql.contains("grace_period_ends_at"));
    }

    #[test]
    fn test_safe_integer_conversions() {
        assert_eq!(i64_to_u64(-1), 0);
        assert_eq!(i64_to_u64(42), 42);
        assert_eq!(u64_to_i64(u64::MAX), i64::MAX);
        assert_eq!(u64_to_i64(42), 42);
    }
}
