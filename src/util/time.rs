use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in whole seconds since the Unix epoch.
pub fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or_default()
}

/// Absolute expiry for a relative `expires_in`. Negative lifetimes and
/// lifetimes that do not fit an `i64` timestamp yield `None`.
pub fn expires_at_from_now(expires_in: i64) -> Option<i64> {
    if expires_in < 0 {
        return None;
    }
    epoch_seconds().checked_add(expires_in)
}

/// Seconds left until `expires_at`; negative once it has passed.
pub fn seconds_until(expires_at: i64) -> i64 {
    expires_at.saturating_sub(epoch_seconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_lifetimes_are_dropped() {
        assert_eq!(expires_at_from_now(i64::MAX), None);
        assert_eq!(expires_at_from_now(-5), None);
        let expires_at = expires_at_from_now(30).unwrap();
        assert!((29..=30).contains(&seconds_until(expires_at)));
    }

    #[test]
    fn seconds_until_saturates() {
        assert!(seconds_until(i64::MIN) < 0);
        assert!(seconds_until(i64::MAX) > 0);
    }
}
