use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::time::Duration;

pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Rate-limit metadata of a single search response.
///
/// Built fresh from every response, successful or not, and never stored
/// between calls. Missing `remaining`/`reset` headers read as zero, so a
/// response without quota information is treated as exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitState {
    pub limit: Option<u64>,
    pub remaining: u64,
    /// Unix timestamp (seconds) at which the quota window resets.
    pub reset: i64,
}

impl RateLimitState {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_value(headers, LIMIT_HEADER),
            remaining: header_value(headers, REMAINING_HEADER).unwrap_or(0),
            reset: header_value(headers, RESET_HEADER).unwrap_or(0),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// `reset - now + buffer`, clamped at zero.
    pub fn backoff_wait(&self, now: DateTime<Utc>, buffer: Duration) -> Duration {
        let buffer_ms = i64::try_from(buffer.as_millis()).unwrap_or(i64::MAX);
        let wait_ms = self
            .reset
            .saturating_mul(1000)
            .saturating_sub(now.timestamp_millis())
            .saturating_add(buffer_ms);

        Duration::from_millis(u64::try_from(wait_ms).unwrap_or(0))
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.reset, 0)
    }
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_parse_headers() {
        let state = RateLimitState::from_headers(&headers(&[
            (LIMIT_HEADER, "450"),
            (REMAINING_HEADER, "449"),
            (RESET_HEADER, "1700000900"),
        ]));

        assert_eq!(state.limit, Some(450));
        assert_eq!(state.remaining, 449);
        assert_eq!(state.reset, 1_700_000_900);
        assert!(!state.is_exhausted());
    }

    #[test]
    fn test_missing_headers_read_as_exhausted() {
        let state = RateLimitState::from_headers(&HeaderMap::new());
        assert_eq!(state.limit, None);
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_garbage_header_is_ignored() {
        let state = RateLimitState::from_headers(&headers(&[(REMAINING_HEADER, "lots")]));
        assert_eq!(state.remaining, 0);
    }

    #[test]
    fn test_backoff_adds_buffer_to_reset_distance() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let state = RateLimitState {
            limit: Some(450),
            remaining: 0,
            reset: 1_700_000_120,
        };

        assert_eq!(
            state.backoff_wait(now, Duration::from_secs(10)),
            Duration::from_secs(130)
        );
    }

    #[test]
    fn test_backoff_never_negative() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let state = RateLimitState {
            limit: None,
            remaining: 0,
            reset: 1_699_999_000,
        };

        assert_eq!(state.backoff_wait(now, Duration::from_secs(10)), Duration::ZERO);
    }

    #[test]
    fn test_backoff_with_missing_reset() {
        let now = Utc::now();
        let state = RateLimitState::default();
        assert_eq!(state.backoff_wait(now, Duration::from_secs(10)), Duration::ZERO);
    }
}
