//! Seams between the poll loop and the network.
//!
//! The search client, the timeline scraper and the image downloader all sit
//! behind these traits so the loop can be driven by in-memory fakes.

use crate::error::CoreError;
use crate::types::{Account, Post};
use async_trait::async_trait;
use std::time::Duration;

/// Result of one primary fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success(Vec<Post>),
    /// Quota exhausted; the loop must block for the given wait before
    /// the next search request.
    RateLimited(Duration),
    TransientError(String),
}

impl FetchOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, FetchOutcome::Success(_))
    }

    pub fn post_count(&self) -> usize {
        match self {
            FetchOutcome::Success(posts) => posts.len(),
            _ => 0,
        }
    }
}

#[async_trait]
pub trait PrimaryFetcher: Send + Sync {
    /// Issues one search for posts by any of `accounts` within `lookback`.
    async fn fetch_recent(&self, accounts: &[Account], lookback: Duration) -> FetchOutcome;
}

#[async_trait]
pub trait FallbackFetcher: Send + Sync {
    /// Returns at most `cap` recent posts of one account.
    async fn fetch_account(&self, account: &Account, cap: usize) -> Result<Vec<Post>, CoreError>;
}

/// Raw image response; `bytes` is only populated for status 200.
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Result<ImageResponse, CoreError>;
}
