use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Search API error: {0}")]
    SearchApi(#[from] SearchApiError),

    #[error("Scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Error, Debug, Clone)]
pub enum SearchApiError {
    #[error("Rate limit exhausted. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Rate limit rejection with {remaining} calls still remaining")]
    AnomalousRateLimit { remaining: u64 },

    #[error("Invalid bearer token")]
    InvalidToken,

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Request rejected with status {status_code}: {message}")]
    Rejected { status_code: u16, message: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug, Clone)]
pub enum ScrapeError {
    #[error("Timeline for {account} returned status {status_code}")]
    HttpStatus { account: String, status_code: u16 },

    #[error("Timeline request for {account} failed: {reason}")]
    RequestFailed { account: String, reason: String },

    #[error("Invalid selector {selector}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid scraper URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Dedup cache at {path} is corrupt: {details}")]
    CorruptCache { path: String, details: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Permission denied accessing config: {path}")]
    PermissionDenied { path: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
