//! The poll loop: fetch, dedupe, download, persist, sleep.

use chrono::{DateTime, Utc};
use postwatch_core::{
    Account, AppConfig, Batch, CoreError, ErrorReporter, FallbackFetcher, FallbackPolicy,
    FetchOutcome, Post, PrimaryFetcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storage::{BatchWriter, DedupCache, MediaDownloader};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub lookback: Duration,
    pub fallback_cap: usize,
    pub fallback_policy: FallbackPolicy,
    pub cache_path: PathBuf,
}

impl PollSettings {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            lookback: config.lookback(),
            fallback_cap: config.fallback_cap,
            fallback_policy: config.fallback_policy,
            cache_path: config.cache_file.clone(),
        }
    }

    /// Whether the scrape fallback runs after `outcome`.
    pub fn wants_fallback(&self, outcome: &FetchOutcome) -> bool {
        match self.fallback_policy {
            FallbackPolicy::OnEmpty => outcome.post_count() == 0,
            FallbackPolicy::OnFailure => outcome.is_failure(),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    pub new_posts: usize,
    pub batch_path: Option<PathBuf>,
    pub used_fallback: bool,
}

struct CycleFetch {
    posts: Vec<Post>,
    used_fallback: bool,
}

pub struct PollService {
    settings: PollSettings,
    accounts: Vec<Account>,
    primary: Arc<dyn PrimaryFetcher>,
    fallback: Arc<dyn FallbackFetcher>,
    downloader: MediaDownloader,
    batch_writer: BatchWriter,
    reporter: ErrorReporter,
}

impl PollService {
    pub fn new(
        settings: PollSettings,
        accounts: Vec<Account>,
        primary: Arc<dyn PrimaryFetcher>,
        fallback: Arc<dyn FallbackFetcher>,
        downloader: MediaDownloader,
        batch_writer: BatchWriter,
    ) -> Self {
        Self {
            settings,
            accounts,
            primary,
            fallback,
            downloader,
            batch_writer,
            reporter: ErrorReporter::new(),
        }
    }

    /// Runs cycles until `shutdown` flips to true. A cycle in progress is
    /// always completed; only waits are cut short.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ServiceState {
        let mut state = ServiceState::Running;
        let mut cycle = 0u64;

        info!(
            "Poll loop started for {} accounts, every {:?}",
            self.accounts.len(),
            self.settings.poll_interval
        );

        while state == ServiceState::Running {
            if *shutdown.borrow() {
                state = ServiceState::Stopped;
                break;
            }

            cycle += 1;
            match self.run_cycle(&mut shutdown).await {
                Ok(report) => info!(
                    "Cycle {} done: {} fetched, {} new, fallback={}, batch={:?}",
                    cycle, report.fetched, report.new_posts, report.used_fallback, report.batch_path
                ),
                Err(e) => {
                    warn!("Cycle {} failed", cycle);
                    self.reporter.report_recoverable(&e);
                }
            }

            info!("Waiting {:?} for the next request", self.settings.poll_interval);
            if sleep_or_shutdown(self.settings.poll_interval, &mut shutdown).await {
                state = ServiceState::Stopped;
            }
        }

        info!("Poll loop stopped after {} cycles", cycle);
        state
    }

    /// One fetch → dedupe → download → write → persist pass.
    pub async fn run_cycle(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleReport, CoreError> {
        let started_at = Utc::now();
        let mut cache = DedupCache::load(&self.settings.cache_path).await?;

        let fetch = self.fetch_posts(shutdown).await;
        let fetched = fetch.posts.len();

        // `insert` also drops ids repeated within this cycle.
        let mut new_posts: Vec<Post> = fetch
            .posts
            .into_iter()
            .filter(|post| cache.insert(&post.id))
            .collect();
        debug!("{} of {} fetched posts are new", new_posts.len(), fetched);

        // Every download settles before the batch records image paths.
        self.downloader.download_all(&mut new_posts).await;

        let batch = Batch::new(started_at, new_posts);
        let batch_path = self.batch_writer.write(&batch).await?;
        cache.persist().await?;

        Ok(CycleReport {
            started_at,
            fetched,
            new_posts: batch.len(),
            batch_path,
            used_fallback: fetch.used_fallback,
        })
    }

    async fn fetch_posts(&self, shutdown: &mut watch::Receiver<bool>) -> CycleFetch {
        let outcome = self
            .primary
            .fetch_recent(&self.accounts, self.settings.lookback)
            .await;
        let wants_fallback = self.settings.wants_fallback(&outcome);

        let posts = match outcome {
            FetchOutcome::Success(posts) => {
                info!("Primary fetch returned {} posts", posts.len());
                posts
            }
            FetchOutcome::RateLimited(wait) => {
                warn!("Rate limit exceeded. Waiting {} seconds", wait.as_secs());
                if sleep_or_shutdown(wait, shutdown).await {
                    info!("Shutdown requested during rate-limit backoff");
                    return CycleFetch {
                        posts: Vec::new(),
                        used_fallback: false,
                    };
                }
                Vec::new()
            }
            FetchOutcome::TransientError(detail) => {
                warn!("Primary fetch failed: {}", detail);
                Vec::new()
            }
        };

        if !posts.is_empty() || !wants_fallback {
            return CycleFetch {
                posts,
                used_fallback: false,
            };
        }

        CycleFetch {
            posts: self.fetch_fallback().await,
            used_fallback: true,
        }
    }

    async fn fetch_fallback(&self) -> Vec<Post> {
        let cap = self.settings.fallback_cap;
        info!(
            "Primary fetch yielded nothing, scraping {} accounts (cap {})",
            self.accounts.len(),
            cap
        );

        let mut posts = Vec::new();
        for account in &self.accounts {
            match self.fallback.fetch_account(account, cap).await {
                Ok(found) => {
                    debug!("Fallback found {} posts for {}", found.len(), account);
                    posts.extend(found.into_iter().take(cap));
                }
                Err(e) => {
                    warn!("Fallback fetch for {} failed, skipping: {}", account, e);
                }
            }
        }
        posts
    }
}

/// Sleeps for `duration` unless shutdown is requested first. Returns true
/// when shutdown was requested.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        if *shutdown.borrow_and_update() {
            return true;
        }

        let changed = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            changed = shutdown.changed() => changed,
        };

        if changed.is_err() {
            // Sender gone; no shutdown can arrive any more.
            tokio::time::sleep_until(deadline).await;
            return *shutdown.borrow();
        }
    }
}
