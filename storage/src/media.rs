use crate::fs::write_atomic;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use postwatch_core::{CoreError, ImageFetcher, ImageResponse, Post};
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Result<ImageResponse, CoreError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status != StatusCode::OK {
            return Ok(ImageResponse {
                status: status.as_u16(),
                bytes: Vec::new(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(ImageResponse {
            status: status.as_u16(),
            bytes: bytes.to_vec(),
        })
    }
}

/// Stores the photo attachment of each post as `{image_dir}/{post id}.jpg`.
pub struct MediaDownloader {
    fetcher: Arc<dyn ImageFetcher>,
    image_dir: PathBuf,
    concurrency: usize,
}

impl MediaDownloader {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        image_dir: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            image_dir: image_dir.into(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn image_path(&self, post_id: &str) -> PathBuf {
        self.image_dir.join(format!("{}.jpg", post_id))
    }

    /// Downloads every attached photo with bounded fan-out and records the
    /// resulting paths. Returns once all downloads have settled.
    pub async fn download_all(&self, posts: &mut [Post]) -> usize {
        let jobs: Vec<(usize, String, String)> = posts
            .iter()
            .enumerate()
            .filter_map(|(index, post)| {
                post.media_url
                    .clone()
                    .map(|url| (index, post.id.clone(), url))
            })
            .collect();

        if jobs.is_empty() {
            return 0;
        }

        let results: Vec<(usize, Option<PathBuf>)> = stream::iter(jobs)
            .map(|(index, id, url)| async move { (index, self.download_one(&id, &url).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut saved = 0;
        for (index, path) in results {
            if path.is_some() {
                saved += 1;
            }
            posts[index].image_path = path;
        }

        info!("{} images available for this cycle", saved);
        saved
    }

    /// Returns the local path of the post's image, or `None` when it could
    /// not be fetched. An existing file is reused without a request.
    pub async fn download_one(&self, post_id: &str, url: &str) -> Option<PathBuf> {
        // Post ids become file names; anything but digits could escape the
        // image directory.
        if post_id.is_empty() || !post_id.bytes().all(|b| b.is_ascii_digit()) {
            warn!("Not storing image for post with unexpected id {:?}", post_id);
            return None;
        }
        let path = self.image_path(post_id);

        if matches!(tokio::fs::try_exists(&path).await, Ok(true)) {
            debug!("Image for {} already at {}", post_id, path.display());
            return Some(path);
        }

        let response = match self.fetcher.fetch_image(url).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Image fetch for post {} from {} failed: {}", post_id, url, e);
                return None;
            }
        };

        if response.status != 200 {
            warn!(
                "Image fetch for post {} from {} returned status {}",
                post_id, url, response.status
            );
            return None;
        }

        match write_atomic(&path, &response.bytes).await {
            Ok(()) => {
                info!("Saved image: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not store image for post {}: {}", post_id, e);
                None
            }
        }
    }
}
