/// The main error type for reconciliation runs
///
/// Only fatal conditions surface through this type from
/// [`Reconciler::run`](crate::Reconciler::run). Failures that affect a single
/// subscription are counted in the run summary instead.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Billing provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ReconcileError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Short machine-readable kind, used as a structured log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Database(_) => "database",
            Self::Provider(_) => "provider",
            Self::Config(_) => "config",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) | Self::Anyhow(_) => "internal",
        }
    }
}

/// Result type alias using [`ReconcileError`]
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReconcileError::database("connection refused");
        assert_eq!(err.to_string(), "Database error: connection refused");

        let err = ReconcileError::timeout("sync pass");
        assert_eq!(err.to_string(), "Operation timed out: sync pass");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ReconcileError::provider("x").kind(), "provider");
        assert_eq!(ReconcileError::config("x").kind(), "config");
        let err: ReconcileError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), "internal");
    }
}
