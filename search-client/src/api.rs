use crate::rate_limit::RateLimitState;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use postwatch_core::{
    Account, AppConfig, CoreError, FetchOutcome, Post, PrimaryFetcher, SearchApiError,
    UNKNOWN_AUTHOR,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const SEARCH_RECENT_ENDPOINT: &str = "/tweets/search/recent";
const TWEET_FIELDS: &str = "attachments,author_id";
const EXPANSIONS: &str = "author_id,attachments.media_keys";
const MEDIA_FIELDS: &str = "url,type";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<TweetData>,
    #[serde(default)]
    pub includes: Includes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetData {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub attachments: Option<TweetAttachments>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TweetAttachments {
    #[serde(default)]
    pub media_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<UserData>,
    #[serde(default)]
    pub media: Vec<MediaData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaData {
    pub media_key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub max_results: u32,
    pub rate_limit_buffer: Duration,
    pub timeout: Duration,
    pub user_agent: String,
}

impl SearchConfig {
    pub fn from_app_config(config: &AppConfig, bearer_token: String) -> Self {
        Self {
            base_url: config.search_api_base.trim_end_matches('/').to_string(),
            bearer_token,
            max_results: config.max_results,
            rate_limit_buffer: config.rate_limit_buffer(),
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SearchApiClient {
    http_client: Client,
    config: SearchConfig,
}

impl SearchApiClient {
    pub fn new(config: SearchConfig) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Disjunctive author filter covering every tracked account.
    pub fn build_query(accounts: &[Account]) -> String {
        accounts
            .iter()
            .map(|account| format!("from:{}", account))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Runs one recent search. An exhausted quota, whether reported by a
    /// 429 or by a successful response, comes back as
    /// `SearchApiError::RateLimitExceeded` carrying the backoff to apply.
    pub async fn search_recent(
        &self,
        accounts: &[Account],
        start_time: DateTime<Utc>,
    ) -> Result<SearchResponse, CoreError> {
        let url = format!("{}{}", self.config.base_url, SEARCH_RECENT_ENDPOINT);
        let query = Self::build_query(accounts);
        let start = start_time.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = self.config.max_results.to_string();
        let started = Instant::now();

        info!(
            "Searching recent posts for {} accounts since {}",
            accounts.len(),
            start
        );
        debug!("Search query: {}", query);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.bearer_token)
            .query(&[
                ("query", query.as_str()),
                ("max_results", max_results.as_str()),
                ("tweet.fields", TWEET_FIELDS),
                ("expansions", EXPANSIONS),
                ("media.fields", MEDIA_FIELDS),
                ("start_time", start.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", SEARCH_RECENT_ENDPOINT, e);
                if e.is_timeout() {
                    CoreError::SearchApi(SearchApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        let rate_limit = RateLimitState::from_headers(response.headers());
        info!(
            "Rate limit: limit={:?} remaining={} reset={:?} ({} in {:?})",
            rate_limit.limit,
            rate_limit.remaining,
            rate_limit.reset_at(),
            status,
            started.elapsed()
        );

        let now = Utc::now();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(check_status(
                status,
                &rate_limit,
                now,
                self.config.rate_limit_buffer,
                &body,
            )
            .into());
        }

        // Quota comes first: an exhausted window means backing off whatever
        // the body holds.
        if rate_limit.is_exhausted() {
            let wait = rate_limit.backoff_wait(now, self.config.rate_limit_buffer);
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<SearchResponse>(&body) {
                Ok(discarded) => warn!(
                    "Rate limit exhausted; discarding {} posts from this response",
                    discarded.data.len()
                ),
                Err(_) => warn!("Rate limit exhausted; discarding unparseable response"),
            }
            return Err(SearchApiError::RateLimitExceeded {
                retry_after: whole_seconds(wait),
            }
            .into());
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            error!("Failed to parse search response: {}", e);
            CoreError::SearchApi(SearchApiError::InvalidResponse {
                details: format!("Failed to parse search response: {}", e),
            })
        })?;

        debug!("Search returned {} posts", body.data.len());
        Ok(body)
    }
}

#[async_trait]
impl PrimaryFetcher for SearchApiClient {
    async fn fetch_recent(&self, accounts: &[Account], lookback: Duration) -> FetchOutcome {
        let lookback = chrono::Duration::from_std(lookback).unwrap_or(chrono::Duration::zero());
        let start_time = Utc::now() - lookback;

        match self.search_recent(accounts, start_time).await {
            Ok(response) => FetchOutcome::Success(extract_posts(&response)),
            Err(e) => outcome_from_error(e),
        }
    }
}

/// Maps a failed search onto the outcome the poll loop acts on.
pub fn outcome_from_error(error: CoreError) -> FetchOutcome {
    match error {
        CoreError::SearchApi(SearchApiError::RateLimitExceeded { retry_after }) => {
            FetchOutcome::RateLimited(Duration::from_secs(retry_after))
        }
        other => {
            warn!("Search failed, no primary results this cycle: {}", other);
            FetchOutcome::TransientError(other.to_string())
        }
    }
}

/// Classifies a non-success search response.
pub(crate) fn check_status(
    status: StatusCode,
    rate_limit: &RateLimitState,
    now: DateTime<Utc>,
    buffer: Duration,
    body: &str,
) -> SearchApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS if rate_limit.remaining > 0 => {
            warn!(
                "Unexpected rate-limit rejection with {} calls remaining",
                rate_limit.remaining
            );
            SearchApiError::AnomalousRateLimit {
                remaining: rate_limit.remaining,
            }
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let wait = rate_limit.backoff_wait(now, buffer);
            warn!(
                "Rate limit exceeded, waiting until {:?} ({} seconds)",
                rate_limit.reset_at(),
                wait.as_secs()
            );
            SearchApiError::RateLimitExceeded {
                retry_after: whole_seconds(wait),
            }
        }
        StatusCode::UNAUTHORIZED => SearchApiError::InvalidToken,
        StatusCode::FORBIDDEN => SearchApiError::Forbidden {
            resource: SEARCH_RECENT_ENDPOINT.to_string(),
        },
        s if s.is_server_error() => SearchApiError::ServerError {
            status_code: s.as_u16(),
        },
        s => SearchApiError::Rejected {
            status_code: s.as_u16(),
            message: body.chars().take(200).collect(),
        },
    }
}

fn whole_seconds(wait: Duration) -> u64 {
    wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
}

/// Resolves authors and the first photo attachment of every post.
pub fn extract_posts(response: &SearchResponse) -> Vec<Post> {
    let users: HashMap<&str, &str> = response
        .includes
        .users
        .iter()
        .map(|user| (user.id.as_str(), user.username.as_str()))
        .collect();
    let media: HashMap<&str, &MediaData> = response
        .includes
        .media
        .iter()
        .map(|item| (item.media_key.as_str(), item))
        .collect();

    response
        .data
        .iter()
        .map(|tweet| {
            let author = tweet
                .author_id
                .as_deref()
                .and_then(|id| users.get(id).copied())
                .unwrap_or(UNKNOWN_AUTHOR);

            // Only the first photo is kept; videos and later photos are ignored.
            let media_url = tweet
                .attachments
                .iter()
                .flat_map(|attachments| attachments.media_keys.iter())
                .filter_map(|key| media.get(key.as_str()))
                .find(|item| item.kind == "photo")
                .and_then(|item| item.url.clone());

            Post::new(
                tweet.id.clone(),
                author.to_string(),
                tweet.text.clone(),
                media_url,
            )
        })
        .collect()
}
