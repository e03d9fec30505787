use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::billing::GraceEntitlement;
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Main configuration for a reconciliation run
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Settings for the reconciliation engine itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconcileConfig {
    /// Subscriptions handled at once within a pass (default: 8)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Budget for a whole run in seconds (default: 300)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Entitlement during an unexpired grace period (default: full)
    #[serde(default)]
    pub grace_entitlement: GraceEntitlement,
    /// Detect drift without writing (default: false)
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeConfig {
    /// Never serialized; only read from the environment.
    #[serde(skip)]
    pub secret_key: Option<SecretString>,
    #[serde(default = "default_stripe_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_seconds: default_timeout_seconds(),
            grace_entitlement: GraceEntitlement::default(),
            dry_run: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            timeout_seconds: default_stripe_timeout(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_concurrency() -> usize {
    crate::reconcile::DEFAULT_CONCURRENCY
}

fn default_timeout_seconds() -> u64 {
    crate::reconcile::DEFAULT_RUN_TIMEOUT.as_secs()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_stripe_timeout() -> u64 {
    30
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.reconcile.concurrency = concurrency;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.reconcile.timeout_seconds = seconds;
        self
    }

    pub fn with_grace_entitlement(mut self, policy: GraceEntitlement) -> Self {
        self.config.reconcile.grace_entitlement = policy;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.config.reconcile.dry_run = dry_run;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database.url = url.into();
        self
    }

    pub fn with_stripe_secret_key(mut self, key: impl Into<String>) -> Self {
        self.config.stripe.secret_key = Some(SecretString::from(key.into()));
        self
    }

    /// Load configuration from environment variables with TIDEWAY_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        if let Some(concurrency) = parse_env_with_prefix("RECONCILE_CONCURRENCY") {
            self.config.reconcile.concurrency = concurrency;
        }
        if let Some(timeout) = parse_env_with_prefix("RECONCILE_TIMEOUT_SECONDS") {
            self.config.reconcile.timeout_seconds = timeout;
        }
        if let Some(policy) = parse_env_with_prefix("RECONCILE_GRACE_ENTITLEMENT") {
            self.config.reconcile.grace_entitlement = policy;
        }
        if let Some(dry_run) = get_env_with_prefix("RECONCILE_DRY_RUN") {
            self.config.reconcile.dry_run = dry_run.parse().unwrap_or(false);
        }

        // Check TIDEWAY_DATABASE_URL first, fall back to DATABASE_URL
        if let Some(url) = get_env_with_prefix("DATABASE_URL") {
            self.config.database.url = url;
        }
        if let Some(max) = parse_env_with_prefix("DATABASE_MAX_CONNECTIONS") {
            self.config.database.max_connections = max;
        }
        if let Some(timeout) = parse_env_with_prefix("DATABASE_CONNECT_TIMEOUT") {
            self.config.database.connect_timeout = timeout;
        }

        if let Some(key) = get_env_with_prefix("STRIPE_SECRET_KEY") {
            self.config.stripe.secret_key = Some(SecretString::from(key));
        }
        if let Some(timeout) = parse_env_with_prefix("STRIPE_TIMEOUT_SECONDS") {
            self.config.stripe.timeout_seconds = timeout;
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// The database URL and Stripe key are not required here; the binary
    /// checks them when it connects.
    ///
    /// # Errors
    ///
    /// Returns an error if the log level is unknown or any count or timeout is zero.
    pub fn build(self) -> crate::error::Result<Config> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging.level.to_lowercase().as_str()) {
            return Err(crate::error::ReconcileError::config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.config.reconcile.concurrency == 0 {
            return Err(crate::error::ReconcileError::config(
                "Reconcile concurrency must be greater than 0",
            ));
        }

        if self.config.reconcile.timeout_seconds == 0 {
            return Err(crate::error::ReconcileError::config(
                "Reconcile timeout must be greater than 0",
            ));
        }

        if self.config.database.max_connections == 0 {
            return Err(crate::error::ReconcileError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        if self.config.stripe.timeout_seconds == 0 {
            return Err(crate::error::ReconcileError::config(
                "Stripe request timeout must be greater than 0",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.reconcile.concurrency, 8);
        assert_eq!(config.reconcile.timeout_seconds, 300);
        assert_eq!(config.reconcile.grace_entitlement, GraceEntitlement::Full);
        assert!(!config.reconcile.dry_run);
        assert!(config.stripe.secret_key.is_none());
    }

    #[test]
    fn test_validation() {
        assert!(ConfigBuilder::new().with_log_level("verbose").build().is_err());
        assert!(ConfigBuilder::new().with_concurrency(0).build().is_err());
        assert!(ConfigBuilder::new().with_timeout_seconds(0).build().is_err());
        assert!(ConfigBuilder::new().with_log_level("DEBUG").build().is_ok());
    }

    #[test]
    fn test_from_env() {
        unsafe {
            std::env::set_var("TIDEWAY_RECONCILE_CONCURRENCY", "3");
            std::env::set_var("TIDEWAY_RECONCILE_GRACE_ENTITLEMENT", "restricted");
            std::env::set_var("TIDEWAY_RECONCILE_DRY_RUN", "true");
            std::env::set_var("TIDEWAY_STRIPE_SECRET_KEY", "sk_test_12345678901234567890");
        }

        let config = ConfigBuilder::new().from_env().build().unwrap();
        assert_eq!(config.reconcile.concurrency, 3);
        assert_eq!(config.reconcile.grace_entitlement, GraceEntitlement::Restricted);
        assert!(config.reconcile.dry_run);
        assert_eq!(
            config.stripe.secret_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("sk_test_12345678901234567890".to_string())
        );

        unsafe {
            std::env::remove_var("TIDEWAY_RECONCILE_CONCURRENCY");
            std::env::remove_var("TIDEWAY_RECONCILE_GRACE_ENTITLEMENT");
            std::env::remove_var("TIDEWAY_RECONCILE_DRY_RUN");
            std::env::remove_var("TIDEWAY_STRIPE_SECRET_KEY");
        }
    }

    #[test]
    fn test_secret_key_not_serialized() {
        let config = ConfigBuilder::new()
            .with_stripe_secret_key("sk_test_12345678901234567890")
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk_test_"));
        assert!(!format!("{config:?}").contains("sk_test_"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config = serde_json::from_str(r#"{"reconcile": {"grace_entitlement": "restricted"}}"#).unwrap();
        assert_eq!(config.reconcile.grace_entitlement, GraceEntitlement::Restricted);
        assert_eq!(config.reconcile.concurrency, 8);
        assert_eq!(config.database.max_connections, 5);
    }
}
