//! Billing-specific error types.
//!
//! Carries the operation, message and HTTP status of a failed Stripe or
//! store call. Converts into [`ReconcileError`](crate::error::ReconcileError)
//! at the crate boundary.

use std::fmt;

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// The subscription ID could not be parsed as a Stripe ID.
    InvalidSubscriptionId { subscription_id: String },

    /// Stripe API returned an error.
    StripeApiError {
        operation: String,
        message: String,
        code: Option<String>,
        http_status: Option<u16>,
    },

    /// No subscription row found for the given internal id.
    NoSubscription { subscription_id: String },
    /// No user row found for the given id.
    NoUser { user_id: String },
    /// The persistent store rejected or failed an operation.
    StoreError { operation: String, message: String },

    /// An unexpected internal error occurred.
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSubscriptionId { subscription_id } => {
                write!(f, "Invalid Stripe subscription ID: {}", subscription_id)
            }
            Self::StripeApiError { operation, message, code, http_status } => {
                write!(f, "Stripe API error during '{}': {}", operation, message)?;
                if let Some(code) = code {
                    write!(f, " (code: {})", code)?;
                }
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::NoSubscription { subscription_id } => {
                write!(f, "No subscription found with id '{}'", subscription_id)
            }
            Self::NoUser { user_id } => {
                write!(f, "No user found with id '{}'", user_id)
            }
            Self::StoreError { operation, message } => {
                write!(f, "Billing store error during '{}': {}", operation, message)
            }
            Self::Internal { message } => {
                write!(f, "Internal billing error: {}", message)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::ReconcileError {
    fn from(err: BillingError) -> Self {
        match &err {
            BillingError::NoSubscription { .. } | BillingError::NoUser { .. } => {
                crate::error::ReconcileError::NotFound(err.to_string())
            }

            BillingError::InvalidSubscriptionId { .. } => {
                crate::error::ReconcileError::BadRequest(err.to_string())
            }

            BillingError::StripeApiError { http_status: Some(408), .. } => {
                crate::error::ReconcileError::Timeout(err.to_string())
            }
            BillingError::StripeApiError { .. } => {
                crate::error::ReconcileError::Provider(err.to_string())
            }

            BillingError::StoreError { .. } => crate::error::ReconcileError::Database(err.to_string()),

            BillingError::Internal { .. } => crate::error::ReconcileError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;

    #[test]
    fn test_error_display() {
        let err = BillingError::StripeApiError {
            operation: "get_subscription".to_string(),
            message: "Rate limited".to_string(),
            code: Some("rate_limit".to_string()),
            http_status: Some(429),
        };
        assert_eq!(
            err.to_string(),
            "Stripe API error during 'get_subscription': Rate limited (code: rate_limit) [HTTP 429]"
        );

        let err = BillingError::NoUser {
            user_id: "user_1".to_string(),
        };
        assert_eq!(err.to_string(), "No user found with id 'user_1'");
    }

    #[test]
    fn test_convert_to_reconcile_error() {
        let err: ReconcileError = BillingError::NoSubscription {
            subscription_id: "sub_local_1".to_string(),
        }
        .into();
        assert!(matches!(err, ReconcileError::NotFound(_)));

        let err: ReconcileError = BillingError::StripeApiError {
            operation: "get_subscription".to_string(),
            message: "Request timed out".to_string(),
            code: None,
            http_status: Some(408),
        }
        .into();
        assert!(matches!(err, ReconcileError::Timeout(_)));

        let err: ReconcileError = BillingError::StripeApiError {
            operation: "get_subscription".to_string(),
            message: "oops".to_string(),
            code: None,
            http_status: Some(500),
        }
        .into();
        assert!(matches!(err, ReconcileError::Provider(_)));

        let err: ReconcileError = BillingError::StoreError {
            operation: "ping".to_string(),
            message: "refused".to_string(),
        }
        .into();
        assert!(matches!(err, ReconcileError::Database(_)));
    }
}
