//! Live Stripe client implementation.
//!
//! Read-only Stripe access for the sync pass, with secure API key handling,
//! a per-request timeout and error mapping onto [`BillingError`].
//! Nothing is retried here; the next reconciliation run is the retry.

use crate::error::Result;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::error::BillingError;
use super::subscription::{StripeSubscriptionClient, StripeSubscriptionData};

const LOG_TARGET: &str = "tideway::billing::stripe";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the live Stripe client.
#[derive(Debug, Clone)]
pub struct LiveStripeClientConfig {
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LiveStripeClientConfig {
    fn default() -> Self {
        Self { timeout_seconds: 30 }
    }
}

impl LiveStripeClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set request timeout.
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

// ============================================================================
// API Key Validation
// ============================================================================

/// Error returned when API key validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidApiKeyError {
    /// Description of why the key is invalid.
    pub reason: String,
}

impl std::fmt::Display for InvalidApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid Stripe API key: {}", self.reason)
    }
}

impl std::error::Error for InvalidApiKeyError {}

impl From<InvalidApiKeyError> for crate::error::ReconcileError {
    fn from(err: InvalidApiKeyError) -> Self {
        crate::error::ReconcileError::Config(err.to_string())
    }
}

/// Validate a Stripe API key format.
///
/// Secret (`sk_`) and restricted (`rk_`) keys are accepted in test and live
/// mode. Publishable keys cannot read subscriptions and are rejected.
fn validate_api_key(key: &str) -> std::result::Result<(), InvalidApiKeyError> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(InvalidApiKeyError {
            reason: "API key cannot be empty".to_string(),
        });
    }

    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidApiKeyError {
            reason: format!("API key too short (minimum {} characters)", MIN_KEY_LENGTH),
        });
    }

    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(InvalidApiKeyError {
            reason: "API key must start with sk_test_, sk_live_, rk_test_, or rk_live_"
                .to_string(),
        });
    }

    Ok(())
}

// ============================================================================
// Live Stripe Client
// ============================================================================

/// Live Stripe client for the sync pass.
///
/// # Example
///
/// ```rust,ignore
/// use tideway_reconcile::billing::{LiveStripeClient, LiveStripeClientConfig};
///
/// let client = LiveStripeClient::new(
///     "sk_live_xxx".to_string(),
///     LiveStripeClientConfig::default(),
/// )?;
/// let reconciler = Reconciler::new(store, client, ReconcilerConfig::default());
/// ```
#[derive(Clone)]
pub struct LiveStripeClient {
    client: stripe::Client,
    config: LiveStripeClientConfig,
    api_key: SecretString,
}

impl LiveStripeClient {
    /// Create a new live Stripe client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key format is invalid.
    pub fn new(
        api_key: impl Into<SecretString>,
        config: LiveStripeClientConfig,
    ) -> std::result::Result<Self, InvalidApiKeyError> {
        let api_key: SecretString = api_key.into();

        validate_api_key(api_key.expose_secret())?;

        let client = stripe::Client::new(api_key.expose_secret()).with_app_info(
            env!("CARGO_PKG_NAME").to_string(),
            Some(env!("CARGO_PKG_VERSION").to_string()),
            None,
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Check if the client is using a test mode API key.
    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    /// Get the configured timeout duration.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    /// Run a Stripe call under the request timeout.
    async fn call<T, Fut>(&self, operation: &str, request: Fut) -> std::result::Result<T, BillingError>
    where
        Fut: std::future::Future<Output = std::result::Result<T, stripe::StripeError>>,
    {
        match tokio::time::timeout(self.timeout(), request).await {
            Ok(result) => result.map_err(|e| map_stripe_error(e, operation)),
            Err(_) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    operation = operation,
                    timeout_seconds = self.config.timeout_seconds,
                    "Stripe API request timed out"
                );
                Err(BillingError::StripeApiError {
                    operation: operation.to_string(),
                    message: format!("Request timed out after {} seconds", self.config.timeout_seconds),
                    code: None,
                    http_status: Some(408),
                })
            }
        }
    }
}

// Debug implementation that doesn't expose the API key
impl std::fmt::Debug for LiveStripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStripeClient")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Map Stripe errors to `BillingError`.
fn map_stripe_error(error: stripe::StripeError, operation: &str) -> BillingError {
    match error {
        stripe::StripeError::Stripe(request_error) => {
            let message = request_error
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            let code = request_error.code.as_ref().map(|c| format!("{c:?}"));

            BillingError::StripeApiError {
                operation: operation.to_string(),
                message,
                code,
                http_status: Some(request_error.http_status),
            }
        }
        stripe::StripeError::QueryStringSerialize(e) => BillingError::Internal {
            message: format!("Failed to serialize request: {e}"),
        },
        stripe::StripeError::JSONSerialize(e) => BillingError::Internal {
            message: format!("Failed to serialize JSON: {e}"),
        },
        stripe::StripeError::UnsupportedVersion => BillingError::Internal {
            message: "Unsupported Stripe API version".to_string(),
        },
        stripe::StripeError::ClientError(msg) => BillingError::StripeApiError {
            operation: operation.to_string(),
            message: format!("HTTP client error: {msg}"),
            code: None,
            http_status: None,
        },
        stripe::StripeError::Timeout => BillingError::StripeApiError {
            operation: operation.to_string(),
            message: "Request timed out".to_string(),
            code: None,
            http_status: Some(408),
        },
    }
}

/// Stripe's status enum as the string the status table understands.
fn status_str(status: &stripe::SubscriptionStatus) -> &'static str {
    match status {
        stripe::SubscriptionStatus::Active => "active",
        stripe::SubscriptionStatus::Canceled => "canceled",
        stripe::SubscriptionStatus::Incomplete => "incomplete",
        stripe::SubscriptionStatus::IncompleteExpired => "incomplete_expired",
        stripe::SubscriptionStatus::PastDue => "past_due",
        stripe::SubscriptionStatus::Trialing => "trialing",
        stripe::SubscriptionStatus::Unpaid => "unpaid",
        stripe::SubscriptionStatus::Paused => "paused",
    }
}

fn map_subscription_to_data(sub: stripe::Subscription) -> StripeSubscriptionData {
    let customer_id = match &sub.customer {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(c) => c.id.to_string(),
    };

    StripeSubscriptionData {
        id: sub.id.to_string(),
        customer_id,
        status: status_str(&sub.status).to_string(),
        cancel_at_period_end: sub.cancel_at_period_end,
        current_period_start: u64::try_from(sub.current_period_start).unwrap_or_default(),
        current_period_end: u64::try_from(sub.current_period_end).unwrap_or_default(),
    }
}

// ============================================================================
// StripeSubscriptionClient Implementation
// ============================================================================

impl StripeSubscriptionClient for LiveStripeClient {
    async fn ping(&self) -> Result<()> {
        let mut params = stripe::ListSubscriptions::new();
        params.limit = Some(1);

        self.call("ping", stripe::Subscription::list(&self.client, &params))
            .await?;
        Ok(())
    }

    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<StripeSubscriptionData>> {
        let sub_id: stripe::SubscriptionId = subscription_id.parse().map_err(|_| {
            BillingError::InvalidSubscriptionId {
                subscription_id: subscription_id.to_string(),
            }
        })?;

        let retrieved = self
            .call(
                "get_subscription",
                stripe::Subscription::retrieve(&self.client, &sub_id, &[]),
            )
            .await;

        match retrieved {
            Ok(subscription) => Ok(Some(map_subscription_to_data(subscription))),
            Err(BillingError::StripeApiError { http_status: Some(404), .. }) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    stripe_subscription_id = %subscription_id,
                    "Subscription not found at Stripe"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
