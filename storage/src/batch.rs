use crate::fs::write_atomic;
use chrono::{DateTime, Utc};
use postwatch_core::{Batch, Post, StorageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// One post as it appears in a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub tweet_url: String,
    pub text: String,
    pub image_path: Option<String>,
}

impl From<&Post> for BatchRecord {
    fn from(post: &Post) -> Self {
        Self {
            account_id: post.author.clone(),
            tweet_url: post.url.clone(),
            text: post.text.clone(),
            image_path: post
                .image_path
                .as_ref()
                .map(|path| path.to_string_lossy().into_owned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFile {
    pub tweets: Vec<BatchRecord>,
}

#[derive(Debug, Clone)]
pub struct BatchWriter {
    output_dir: PathBuf,
}

impl BatchWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn batch_path(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.output_dir.join(format!(
            "{}_all_tweets.json",
            started_at.format("%y%m%d_%H%M%S")
        ))
    }

    /// Writes a non-empty batch and returns its path. Empty batches write
    /// nothing.
    pub async fn write(&self, batch: &Batch) -> Result<Option<PathBuf>, StorageError> {
        if batch.is_empty() {
            info!("No new posts found this cycle");
            return Ok(None);
        }

        let path = self.batch_path(batch.started_at);
        let file = BatchFile {
            tweets: batch.posts.iter().map(BatchRecord::from).collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| StorageError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        write_atomic(&path, &bytes).await?;
        info!("Saved {} posts to {}", batch.len(), path.display());
        Ok(Some(path))
    }
}
