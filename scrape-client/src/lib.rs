//! Credential-free timeline scraper used when the search API yields nothing.
//!
//! Pages through an account's timeline on a Nitter-compatible front end:
//! - plain `GET {base}/{handle}` with `?cursor=` pagination
//! - HTML parsed with CSS selectors, no JavaScript rendering
//! - retweets (items authored by someone else) are skipped

use async_trait::async_trait;
use postwatch_core::{Account, AppConfig, CoreError, FallbackFetcher, Post, ScrapeError};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ScrapeConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.scraper_base_url.clone(),
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// One parsed timeline page.
#[derive(Debug, Default)]
pub struct TimelinePage {
    pub posts: Vec<Post>,
    /// Timeline entries on the page, including ones skipped as retweets.
    pub items: usize,
    pub next_page: Option<Url>,
}

pub struct TimelineScraper {
    client: Client,
    base_url: Url,
}

impl TimelineScraper {
    pub fn new(config: ScrapeConfig) -> Result<Self, CoreError> {
        // Joining onto a base without a trailing slash drops its last segment.
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| ScrapeError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client, base_url })
    }

    fn timeline_url(&self, account: &Account) -> Result<Url, ScrapeError> {
        self.base_url
            .join(&format!("./{}", account))
            .map_err(|e| ScrapeError::InvalidUrl {
                url: format!("{}{}", self.base_url, account),
                reason: e.to_string(),
            })
    }

    async fn fetch_html(&self, account: &Account, url: &Url) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ScrapeError::RequestFailed {
                account: account.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus {
                account: account.to_string(),
                status_code: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| ScrapeError::RequestFailed {
            account: account.to_string(),
            reason: format!("failed to read body: {}", e),
        })
    }

    /// Collects up to `cap` posts from the account's timeline, newest first.
    pub async fn scrape_timeline(
        &self,
        account: &Account,
        cap: usize,
    ) -> Result<Vec<Post>, ScrapeError> {
        let mut posts: Vec<Post> = Vec::new();
        let mut page_url = self.timeline_url(account)?;
        let mut pages = 0usize;

        while posts.len() < cap {
            let html = self.fetch_html(account, &page_url).await?;
            let page = parse_timeline(&html, account, &page_url)?;
            pages += 1;

            if page.items == 0 {
                break;
            }

            for post in page.posts {
                if posts.len() >= cap {
                    break;
                }
                if !posts.iter().any(|seen| seen.id == post.id) {
                    posts.push(post);
                }
            }

            match page.next_page {
                Some(next) if next != page_url => page_url = next,
                _ => break,
            }
        }

        info!(
            "Scraped {} posts for {} across {} pages",
            posts.len(),
            account,
            pages
        );
        Ok(posts)
    }
}

#[async_trait]
impl FallbackFetcher for TimelineScraper {
    async fn fetch_account(&self, account: &Account, cap: usize) -> Result<Vec<Post>, CoreError> {
        Ok(self.scrape_timeline(account, cap).await?)
    }
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Parses one timeline page. Relative links resolve against `page_url`.
pub fn parse_timeline(
    html: &str,
    account: &Account,
    page_url: &Url,
) -> Result<TimelinePage, ScrapeError> {
    let item_selector = selector(".timeline-item")?;
    let link_selector = selector("a.tweet-link")?;
    let username_selector = selector("a.username")?;
    let content_selector = selector(".tweet-content")?;
    let image_selector = selector(".attachments a.still-image")?;
    let more_selector = selector(".show-more a")?;

    let document = Html::parse_document(html);
    let mut posts = Vec::new();
    let mut items = 0;

    for item in document.select(&item_selector) {
        items += 1;
        let Some(id) = item
            .select(&link_selector)
            .next()
            .and_then(|link| link.value().attr("href"))
            .and_then(post_id_from_href)
        else {
            continue;
        };

        let author = item
            .select(&username_selector)
            .next()
            .map(element_text)
            .map(|name| name.trim_start_matches('@').to_string())
            .unwrap_or_else(|| account.to_string());

        if !author.eq_ignore_ascii_case(account.as_str()) {
            debug!("Skipping {} by {} on {}'s timeline", id, author, account);
            continue;
        }

        let text = item
            .select(&content_selector)
            .next()
            .map(element_text)
            .unwrap_or_default();

        // First still image only.
        let media_url = item
            .select(&image_selector)
            .next()
            .and_then(|image| image.value().attr("href"))
            .and_then(|href| page_url.join(href).ok())
            .map(String::from);

        posts.push(Post::new(id, author, text, media_url));
    }

    // Newer instances render a "load newest" link first; the cursor for older
    // posts is the last one.
    let next_page = document
        .select(&more_selector)
        .filter_map(|link| link.value().attr("href"))
        .filter(|href| href.starts_with("?cursor="))
        .last()
        .and_then(|href| page_url.join(href).ok());

    Ok(TimelinePage {
        posts,
        items,
        next_page,
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn post_id_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("/status/")?;
    let id: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const TIMELINE_FIXTURE: &str = r##"
<html><body>
<div class="timeline">
  <div class="show-more"><a href="/alice">Load newest</a></div>
  <div class="timeline-item" data-username="alice">
    <a class="tweet-link" href="/alice/status/1780000000000000005#m"></a>
    <div class="tweet-body">
      <div class="tweet-header"><a class="username" href="/alice" title="@alice">@alice</a></div>
      <div class="tweet-content media-body" dir="auto">Fresh post with a picture</div>
      <div class="attachments">
        <div class="gallery-row">
          <div class="attachment image"><a class="still-image" href="/pic/orig/media%2Ffirst.jpg"><img src="/pic/media%2Ffirst.jpg"></a></div>
          <div class="attachment image"><a class="still-image" href="/pic/orig/media%2Fsecond.jpg"><img src="/pic/media%2Fsecond.jpg"></a></div>
        </div>
      </div>
    </div>
  </div>
  <div class="timeline-item" data-username="bob">
    <a class="tweet-link" href="/bob/status/1780000000000000004#m"></a>
    <div class="tweet-body">
      <div class="retweet-header">alice retweeted</div>
      <div class="tweet-header"><a class="username" href="/bob" title="@bob">@bob</a></div>
      <div class="tweet-content media-body">Someone else's post</div>
    </div>
  </div>
  <div class="timeline-item" data-username="alice">
    <a class="tweet-link" href="/Alice/status/1780000000000000003#m"></a>
    <div class="tweet-body">
      <div class="tweet-header"><a class="username" href="/Alice" title="@Alice">@Alice</a></div>
      <div class="tweet-content media-body">  Plain text  </div>
    </div>
  </div>
  <div class="timeline-item unavailable"><div class="unavailable-box">This post is unavailable</div></div>
  <div class="show-more"><a href="?cursor=DAABCgABGQ">Load more</a></div>
</div>
</body></html>
"##;

    fn alice() -> Account {
        Account::parse("alice").unwrap()
    }

    fn page_url() -> Url {
        Url::parse("https://nitter.example/alice").unwrap()
    }

    #[test]
    fn test_parse_timeline_page() {
        let page = parse_timeline(TIMELINE_FIXTURE, &alice(), &page_url()).unwrap();

        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.items, 4);

        let first = &page.posts[0];
        assert_eq!(first.id, "1780000000000000005");
        assert_eq!(first.author, "alice");
        assert_eq!(
            first.url,
            "https://twitter.com/alice/status/1780000000000000005"
        );
        assert_eq!(first.text, "Fresh post with a picture");
        assert_eq!(
            first.media_url.as_deref(),
            Some("https://nitter.example/pic/orig/media%2Ffirst.jpg")
        );

        let second = &page.posts[1];
        assert_eq!(second.id, "1780000000000000003");
        assert_eq!(second.author, "Alice");
        assert_eq!(second.text, "Plain text");
        assert!(second.media_url.is_none());
    }

    #[test]
    fn test_next_page_uses_older_cursor() {
        let page = parse_timeline(TIMELINE_FIXTURE, &alice(), &page_url()).unwrap();
        assert_eq!(
            page.next_page.map(String::from).as_deref(),
            Some("https://nitter.example/alice?cursor=DAABCgABGQ")
        );
    }

    #[test]
    fn test_empty_timeline() {
        let page = parse_timeline("<html><body></body></html>", &alice(), &page_url()).unwrap();
        assert!(page.posts.is_empty());
        assert!(page.next_page.is_none());
    }

    #[test]
    fn test_post_id_from_href() {
        assert_eq!(
            post_id_from_href("/alice/status/123456#m").as_deref(),
            Some("123456")
        );
        assert_eq!(post_id_from_href("/alice"), None);
        assert_eq!(post_id_from_href("/alice/status/#m"), None);
    }

    #[test]
    fn test_invalid_base_url() {
        let result = TimelineScraper::new(ScrapeConfig {
            base_url: "not a url".to_string(),
            timeout: Duration::from_secs(1),
            user_agent: "postwatch-test".to_string(),
        });
        assert!(matches!(
            result,
            Err(CoreError::Scrape(ScrapeError::InvalidUrl { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_instance_fails_per_account() {
        let scraper = TimelineScraper::new(ScrapeConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            user_agent: "postwatch-test".to_string(),
        })
        .unwrap();

        let result = scraper.fetch_account(&alice(), 100).await;
        assert!(matches!(
            result,
            Err(CoreError::Scrape(ScrapeError::RequestFailed { ref account, .. })) if account == "alice"
        ));
    }

    /// Serves canned pages keyed by request target (path plus query) and
    /// records every target requested. Unknown targets get a 404.
    async fn serve_pages(pages: HashMap<String, String>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requested = Arc::new(Mutex::new(Vec::new()));
        let log = requested.clone();
        let pages = Arc::new(pages);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let pages = pages.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 4096];
                    while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = String::from_utf8_lossy(&request);
                    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    log.lock().unwrap().push(target.clone());

                    let (status, body) = match pages.get(&target) {
                        Some(body) => ("200 OK", body.clone()),
                        None => ("404 Not Found", String::new()),
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}/nitter", addr), requested)
    }

    fn timeline_html(items: &[(&str, &str)], cursor: Option<&str>) -> String {
        let mut html = String::from("<html><body><div class=\"timeline\">");
        for (author, id) in items {
            html.push_str(&format!(
                r#"<div class="timeline-item"><a class="tweet-link" href="/{author}/status/{id}#m"></a><div class="tweet-header"><a class="username" href="/{author}">@{author}</a></div><div class="tweet-content">post {id}</div></div>"#
            ));
        }
        if let Some(cursor) = cursor {
            html.push_str(&format!(
                r#"<div class="show-more"><a href="?cursor={cursor}">Load more</a></div>"#
            ));
        }
        html.push_str("</div></body></html>");
        html
    }

    fn scraper_for(base_url: &str) -> TimelineScraper {
        TimelineScraper::new(ScrapeConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            user_agent: "postwatch-test".to_string(),
        })
        .unwrap()
    }

    fn ids(posts: &[Post]) -> Vec<&str> {
        posts.iter().map(|post| post.id.as_str()).collect()
    }

    #[test]
    fn test_timeline_url_keeps_base_path() {
        let scraper = scraper_for("https://mirror.example/nitter");
        assert_eq!(
            scraper.timeline_url(&alice()).unwrap().as_str(),
            "https://mirror.example/nitter/alice"
        );

        let scraper = scraper_for("https://nitter.example/");
        assert_eq!(
            scraper.timeline_url(&alice()).unwrap().as_str(),
            "https://nitter.example/alice"
        );
    }

    #[tokio::test]
    async fn test_follows_cursor_until_cap() {
        let mut pages = HashMap::new();
        pages.insert(
            "/nitter/alice".to_string(),
            timeline_html(
                &[("alice", "15"), ("bob", "14"), ("alice", "13"), ("alice", "12")],
                Some("P2"),
            ),
        );
        pages.insert(
            "/nitter/alice?cursor=P2".to_string(),
            timeline_html(
                &[("alice", "12"), ("alice", "11"), ("alice", "10"), ("alice", "9")],
                Some("P3"),
            ),
        );
        let (base, requested) = serve_pages(pages).await;

        let posts = scraper_for(&base)
            .scrape_timeline(&alice(), 4)
            .await
            .unwrap();

        // "12" repeats across pages and is kept once; the cap lands mid-page.
        assert_eq!(ids(&posts), vec!["15", "13", "12", "11"]);
        assert_eq!(
            *requested.lock().unwrap(),
            vec!["/nitter/alice".to_string(), "/nitter/alice?cursor=P2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stops_on_repeated_cursor() {
        let mut pages = HashMap::new();
        pages.insert(
            "/nitter/alice".to_string(),
            timeline_html(&[("alice", "5")], Some("SAME")),
        );
        pages.insert(
            "/nitter/alice?cursor=SAME".to_string(),
            timeline_html(&[("alice", "4")], Some("SAME")),
        );
        let (base, requested) = serve_pages(pages).await;

        let posts = scraper_for(&base)
            .scrape_timeline(&alice(), 100)
            .await
            .unwrap();

        assert_eq!(ids(&posts), vec!["5", "4"]);
        assert_eq!(requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stops_on_empty_page() {
        let mut pages = HashMap::new();
        pages.insert(
            "/nitter/alice".to_string(),
            timeline_html(&[("alice", "5")], Some("P2")),
        );
        pages.insert(
            "/nitter/alice?cursor=P2".to_string(),
            timeline_html(&[], Some("P3")),
        );
        let (base, requested) = serve_pages(pages).await;

        let posts = scraper_for(&base)
            .scrape_timeline(&alice(), 100)
            .await
            .unwrap();

        assert_eq!(ids(&posts), vec!["5"]);
        assert_eq!(requested.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_page_of_retweets_does_not_end_paging() {
        let mut pages = HashMap::new();
        pages.insert(
            "/nitter/alice".to_string(),
            timeline_html(&[("bob", "9"), ("carol", "8")], Some("P2")),
        );
        pages.insert(
            "/nitter/alice?cursor=P2".to_string(),
            timeline_html(&[("alice", "7")], None),
        );
        let (base, _) = serve_pages(pages).await;

        let posts = scraper_for(&base)
            .scrape_timeline(&alice(), 100)
            .await
            .unwrap();

        assert_eq!(ids(&posts), vec!["7"]);
    }

    #[tokio::test]
    async fn test_missing_timeline_is_http_status_error() {
        let (base, _) = serve_pages(HashMap::new()).await;

        let result = scraper_for(&base).fetch_account(&alice(), 100).await;

        assert!(matches!(
            result,
            Err(CoreError::Scrape(ScrapeError::HttpStatus { status_code: 404, .. }))
        ));
    }
}
