//! Client for the recent-search endpoint, the primary source of posts.

pub mod api;
pub mod rate_limit;


pub use api::{extract_posts, SearchApiClient, SearchConfig, SearchResponse};
pub use rate_limit::RateLimitState;
