/// Current Unix time in seconds.
///
/// A clock before the epoch yields 0 rather than panicking.
#[must_use]
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_now_is_after_2024() {
        assert!(unix_now() > 1_704_067_200);
    }
}
