use std::str::FromStr;

/// Get environment variable with TIDEWAY_ prefix, falling back to unprefixed version
///
/// `get_env_with_prefix("DATABASE_URL")` checks `TIDEWAY_DATABASE_URL` first,
/// then `DATABASE_URL`, so the reconciler can share a `.env` with the app.
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("TIDEWAY_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Read and parse an environment variable via [`get_env_with_prefix`].
///
/// Values that fail to parse are ignored with a warning so a typo in the
/// scheduler's environment degrades to the default instead of aborting.
pub fn parse_env_with_prefix<T: FromStr>(key: &str) -> Option<T> {
    let raw = get_env_with_prefix(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                target: "tideway::reconcile::config",
                key = key,
                value = %raw,
                "Ignoring unparseable environment variable"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        unsafe {
            std::env::set_var("TIDEWAY_RECONCILE_TEST_VAR", "prefixed_value");
            std::env::set_var("RECONCILE_TEST_VAR", "bare_value");
        }
        assert_eq!(
            get_env_with_prefix("RECONCILE_TEST_VAR"),
            Some("prefixed_value".to_string())
        );
        unsafe {
            std::env::remove_var("TIDEWAY_RECONCILE_TEST_VAR");
        }
        assert_eq!(
            get_env_with_prefix("RECONCILE_TEST_VAR"),
            Some("bare_value".to_string())
        );
        unsafe {
            std::env::remove_var("RECONCILE_TEST_VAR");
        }

        assert_eq!(get_env_with_prefix("RECONCILE_NON_EXISTENT_VAR"), None);
    }

    #[test]
    fn test_parse_env_with_prefix() {
        unsafe {
            std::env::set_var("TIDEWAY_RECONCILE_PARSE_OK", " 12 ");
            std::env::set_var("TIDEWAY_RECONCILE_PARSE_BAD", "twelve");
        }
        assert_eq!(parse_env_with_prefix::<usize>("RECONCILE_PARSE_OK"), Some(12));
        assert_eq!(parse_env_with_prefix::<usize>("RECONCILE_PARSE_BAD"), None);
        unsafe {
            std::env::remove_var("TIDEWAY_RECONCILE_PARSE_OK");
            std::env::remove_var("TIDEWAY_RECONCILE_PARSE_BAD");
        }
    }
}
