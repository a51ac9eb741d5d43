use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::SearchApi(e) => {
                error!("Search API error details: {:?}", e);
            }
            CoreError::Scrape(e) => {
                error!("Scrape error details: {:?}", e);
            }
            CoreError::Storage(e) => {
                error!("Storage error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::SearchApi(e) => e.is_retryable(),
            CoreError::Scrape(e) => e.is_retryable(),
            CoreError::Storage(e) => e.is_retryable(),
            CoreError::Config(_) => false,
            CoreError::Network(_) => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::SearchApi(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::SearchApi(e) => e.user_friendly_message(),
            CoreError::Scrape(e) => e.user_friendly_message(),
            CoreError::Storage(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::SearchApi(_) => "SEARCH_API".to_string(),
            CoreError::Scrape(_) => "SCRAPE".to_string(),
            CoreError::Storage(_) => "STORAGE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
        }
    }
}

impl ErrorExt for SearchApiError {
    fn log_error(&self) -> &Self {
        error!("SearchApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("SearchApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            SearchApiError::RateLimitExceeded { .. } => true,
            SearchApiError::AnomalousRateLimit { .. } => true,
            SearchApiError::RequestTimeout => true,
            SearchApiError::ServerError { .. } => true,
            SearchApiError::InvalidResponse { .. } => true,
            SearchApiError::Rejected { .. } => false,
            SearchApiError::InvalidToken => false,
            SearchApiError::Forbidden { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SearchApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            SearchApiError::RateLimitExceeded { retry_after } => format!(
                "Search API quota exhausted. Waiting {} seconds before the next request.",
                retry_after
            ),
            SearchApiError::AnomalousRateLimit { .. } => {
                "Search API rejected the request despite remaining quota. Skipping this cycle."
                    .to_string()
            }
            SearchApiError::InvalidToken => {
                "Your search API bearer token is invalid. Please check the configured token."
                    .to_string()
            }
            SearchApiError::Forbidden { .. } => {
                "The search API denied access. Check your API access level.".to_string()
            }
            SearchApiError::RequestTimeout => {
                "The search API took too long to respond. Will retry next cycle.".to_string()
            }
            SearchApiError::ServerError { .. } => {
                "The search API is having problems. Will retry next cycle.".to_string()
            }
            _ => "Search API error occurred. Will retry next cycle.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            SearchApiError::RateLimitExceeded { .. } => "SEARCH_RATE_LIMIT".to_string(),
            SearchApiError::AnomalousRateLimit { .. } => "SEARCH_ANOMALOUS_RATE_LIMIT".to_string(),
            SearchApiError::InvalidToken => "SEARCH_INVALID_TOKEN".to_string(),
            SearchApiError::Forbidden { .. } => "SEARCH_FORBIDDEN".to_string(),
            SearchApiError::RequestTimeout => "SEARCH_TIMEOUT".to_string(),
            SearchApiError::InvalidResponse { .. } => "SEARCH_INVALID_RESPONSE".to_string(),
            SearchApiError::Rejected { .. } => "SEARCH_REJECTED".to_string(),
            SearchApiError::ServerError { .. } => "SEARCH_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ScrapeError {
    fn log_error(&self) -> &Self {
        error!("ScrapeError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ScrapeError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::HttpStatus { .. } | ScrapeError::RequestFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ScrapeError::HttpStatus { account, .. } | ScrapeError::RequestFailed { account, .. } => {
                format!("Could not scrape the timeline of {}. Skipping it.", account)
            }
            _ => "The scraper is misconfigured. Please check scraper_base_url.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ScrapeError::HttpStatus { .. } => "SCRAPE_HTTP_STATUS".to_string(),
            ScrapeError::RequestFailed { .. } => "SCRAPE_REQUEST_FAILED".to_string(),
            ScrapeError::InvalidSelector { .. } => "SCRAPE_INVALID_SELECTOR".to_string(),
            ScrapeError::InvalidUrl { .. } => "SCRAPE_INVALID_URL".to_string(),
        }
    }
}

impl ErrorExt for StorageError {
    fn log_error(&self) -> &Self {
        error!("StorageError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StorageError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            StorageError::WriteFailed { .. } => true,
            StorageError::ReadFailed { .. } => true,
            StorageError::CorruptCache { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StorageError::CorruptCache { path, .. } => format!(
                "The dedup cache at {} cannot be read. Fix or remove it to resume.",
                path
            ),
            StorageError::WriteFailed { path, .. } => {
                format!("Could not write {}. Check disk space and permissions.", path)
            }
            StorageError::ReadFailed { path, .. } => {
                format!("Could not read {}. Check file permissions.", path)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            StorageError::CorruptCache { .. } => "STORAGE_CORRUPT_CACHE".to_string(),
            StorageError::WriteFailed { .. } => "STORAGE_WRITE_FAILED".to_string(),
            StorageError::ReadFailed { .. } => "STORAGE_READ_FAILED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors are fatal at startup
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Required file '{}' not found.", path)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is not usable: {}", reason)
            }
            ConfigError::PermissionDenied { .. } => {
                "Permission denied accessing configuration. Please check file permissions."
                    .to_string()
            }
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::PermissionDenied { .. } => "CONFIG_PERMISSION_DENIED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
        }
    }

    /// Reports a recoverable error; retryable ones only warn.
    pub fn report_recoverable(&self, error: &CoreError) {
        if error.is_retryable() {
            self.report_warning(error);
        } else {
            self.report_error(error);
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
            if let Some(retry_after) = error.retry_after() {
                info!("Error is retryable. Retry after: {:?}", retry_after);
            }
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
