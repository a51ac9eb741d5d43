use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Author name used when the search expansion does not resolve an author id.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// A tracked account handle, normalized on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    /// Normalizes one raw line of the account list. Commas are removed
    /// anywhere, then surrounding whitespace and punctuation are trimmed.
    /// `_` is a valid handle character and survives trimming.
    pub fn parse(raw: &str) -> Option<Self> {
        let without_commas = raw.trim().replace(',', "");
        let handle = without_commas
            .trim_matches(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '_'));

        if handle.is_empty() {
            None
        } else {
            Some(Self(handle.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub url: String,
    pub text: String,
    pub image_path: Option<PathBuf>,
    /// Remote location of the first photo attachment, if any.
    pub media_url: Option<String>,
}

impl Post {
    pub fn new(id: String, author: String, text: String, media_url: Option<String>) -> Self {
        let url = canonical_post_url(&author, &id);
        Self {
            id,
            author,
            url,
            text,
            image_path: None,
            media_url,
        }
    }
}

pub fn canonical_post_url(handle: &str, post_id: &str) -> String {
    format!("https://twitter.com/{}/status/{}", handle, post_id)
}

/// The new posts of one poll cycle.
#[derive(Debug, Clone)]
pub struct Batch {
    pub started_at: DateTime<Utc>,
    pub posts: Vec<Post>,
}

impl Batch {
    pub fn new(started_at: DateTime<Utc>, posts: Vec<Post>) -> Self {
        Self { started_at, posts }
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }
}
