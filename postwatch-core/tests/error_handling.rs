use postwatch_core::{
    ConfigError, CoreError, ErrorExt, ErrorReporter, ScrapeError, SearchApiError, StorageError,
};
use std::time::Duration;

#[test]
fn test_error_codes() {
    let search_error = CoreError::SearchApi(SearchApiError::InvalidToken);
    assert_eq!(search_error.error_code(), "SEARCH_API");

    let scrape_error = CoreError::Scrape(ScrapeError::HttpStatus {
        account: "alice".to_string(),
        status_code: 503,
    });
    assert_eq!(scrape_error.error_code(), "SCRAPE");

    let storage_error = CoreError::Storage(StorageError::CorruptCache {
        path: "cached_tweets.json".to_string(),
        details: "expected value".to_string(),
    });
    assert_eq!(storage_error.error_code(), "STORAGE");

    let config_error = CoreError::Config(ConfigError::FileNotFound {
        path: "accounts.txt".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG");
}

#[test]
fn test_retryable_errors() {
    let retryable_error =
        CoreError::SearchApi(SearchApiError::RateLimitExceeded { retry_after: 130 });
    assert!(retryable_error.is_retryable());

    let anomalous = CoreError::SearchApi(SearchApiError::AnomalousRateLimit { remaining: 12 });
    assert!(anomalous.is_retryable());

    let non_retryable_error = CoreError::Config(ConfigError::FileNotFound {
        path: "accounts.txt".to_string(),
    });
    assert!(!non_retryable_error.is_retryable());

    let corrupt = CoreError::Storage(StorageError::CorruptCache {
        path: "cached_tweets.json".to_string(),
        details: "trailing characters".to_string(),
    });
    assert!(!corrupt.is_retryable());
}

#[test]
fn test_retry_after() {
    let rate_limit_error =
        CoreError::SearchApi(SearchApiError::RateLimitExceeded { retry_after: 130 });
    assert_eq!(
        rate_limit_error.retry_after(),
        Some(Duration::from_secs(130))
    );

    let anomalous = CoreError::SearchApi(SearchApiError::AnomalousRateLimit { remaining: 3 });
    assert_eq!(anomalous.retry_after(), None);
}

#[test]
fn test_user_friendly_messages() {
    let search_error = CoreError::SearchApi(SearchApiError::InvalidToken);
    let message = search_error.user_friendly_message();
    assert!(message.contains("bearer token is invalid"));

    let config_error = CoreError::Config(ConfigError::FileNotFound {
        path: "accounts.txt".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("accounts.txt"));
}

#[test]
fn test_error_reporter() {
    let reporter = ErrorReporter::new()
        .with_error_reporting(true)
        .with_warning_reporting(true);
    let error = CoreError::SearchApi(SearchApiError::ServerError { status_code: 503 });

    // This test just ensures the methods don't panic
    reporter.report_error(&error);
    reporter.report_warning(&error);
    reporter.report_recoverable(&error);
}
