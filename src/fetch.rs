use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use rusqlite::Connection;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Settings;
use crate::db::{self, PageKind, PageRow};
use crate::parser;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
}

impl FetchError {
    /// Rate limiting, server errors and timeouts are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(s) => *s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error(),
            FetchError::Transport(e) => e.is_timeout() || e.is_connect(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status(s) => Some(s.as_u16()),
            FetchError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Crawl outcome counts.
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

impl CrawlStats {
    fn record(&mut self, row: &PageRow) {
        self.total += 1;
        if row.error.is_some() {
            self.errors += 1;
        } else {
            self.ok += 1;
        }
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    backoff_ms: u64,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .build()
            .context("failed to create HTTP client")?;
        Ok(Fetcher {
            client,
            max_retries: settings.max_retries,
            backoff_ms: settings.backoff_ms,
        })
    }

    /// Fetch with retries. Never fails: the last error is kept in the row.
    pub async fn fetch(&self, url: &str, kind: PageKind) -> PageRow {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let result = self.get_once(url).await;
            let latency_ms = Some(start.elapsed().as_millis() as i64);

            match result {
                Ok((status, html)) => {
                    return PageRow {
                        url: url.to_string(),
                        kind,
                        html: Some(html),
                        status: Some(status),
                        error: None,
                        latency_ms,
                    }
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        "{} on {} (attempt {}/{}), backing off {:.1}s",
                        e,
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    return PageRow {
                        url: url.to_string(),
                        kind,
                        html: None,
                        status: e.status(),
                        error: Some(e.to_string()),
                        latency_ms,
                    }
                }
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<(u16, String), FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok((status.as_u16(), response.text().await?))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }
}

/// Walk directory pages 1, 2, … until a page is empty, has no more-link,
/// fails, or `max_pages` is reached.
pub async fn crawl_directory(
    conn: &Connection,
    fetcher: &Fetcher,
    settings: &Settings,
    max_pages: Option<usize>,
) -> Result<CrawlStats> {
    let mut stats = CrawlStats::default();
    let pb = spinner("directory")?;

    for page in 1.. {
        if max_pages.is_some_and(|max| page > max) {
            info!("Reached page limit ({})", page - 1);
            break;
        }
        if page > 1 {
            tokio::time::sleep(settings.delay()).await;
        }

        let url = settings.directory_page_url(page);
        let row = fetcher.fetch(&url, PageKind::Directory).await;
        db::upsert_page(conn, &row)?;
        stats.record(&row);
        pb.set_message(format!("page {}", page));
        pb.inc(1);

        let Some(html) = &row.html else {
            warn!("Stopping directory crawl at page {}: {}", page, row.error.as_deref().unwrap_or("no content"));
            break;
        };
        let (cards, has_more) = parser::directory_pagination(html);
        if cards == 0 {
            info!("Page {} has no cards, stopping", page);
            break;
        }
        if !has_more {
            info!("Page {} is the last page", page);
            break;
        }
    }

    pb.finish_and_clear();
    info!("Directory: {} pages ({} ok, {} errors)", stats.total, stats.ok, stats.errors);
    Ok(stats)
}

/// Fetch the list page, then every article it links that is not stored yet.
/// A failed list fetch is stored and logged; the crawl just ends there.
pub async fn crawl_wiki(
    conn: &Connection,
    fetcher: &Fetcher,
    settings: &Settings,
) -> Result<CrawlStats> {
    let mut stats = CrawlStats::default();

    let list = fetcher.fetch(&settings.wiki_list_url, PageKind::WikiList).await;
    db::upsert_page(conn, &list)?;
    stats.record(&list);
    let Some(list_html) = &list.html else {
        warn!(
            "Failed {}: {}, skipping detail pages",
            settings.wiki_list_url,
            list.error.as_deref().unwrap_or("no content")
        );
        return Ok(stats);
    };

    let known = db::known_urls(conn, PageKind::WikiDetail)?;
    let urls: Vec<String> = parser::detail_urls(list_html, &settings.wiki_base_url)
        .into_iter()
        .filter(|u| !known.contains(u))
        .collect();
    info!(
        "{} detail pages to fetch ({} already stored)",
        urls.len(),
        known.len()
    );
    if urls.is_empty() {
        return Ok(stats);
    }

    let detail = fetch_streaming(conn, fetcher, urls, settings).await?;
    stats.total += detail.total;
    stats.ok += detail.ok;
    stats.errors += detail.errors;
    Ok(stats)
}

/// Fetch detail pages concurrently, saving each result as it arrives.
async fn fetch_streaming(
    conn: &Connection,
    fetcher: &Fetcher,
    urls: Vec<String>,
    settings: &Settings,
) -> Result<CrawlStats> {
    let concurrency = settings.concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let fetcher = Arc::new(fetcher.clone());
    let delay = settings.delay();

    let pb = ProgressBar::new(urls.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // workers send rows, this task is the only writer
    let (tx, mut rx) = tokio::sync::mpsc::channel::<PageRow>(concurrency * 2);

    for url in urls {
        let fetcher = Arc::clone(&fetcher);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetcher.fetch(&url, PageKind::WikiDetail).await;
            let _ = tx.send(row).await;
            // hold the permit through the pause so each slot is rate limited
            tokio::time::sleep(delay).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut stats = CrawlStats::default();
    while let Some(row) = rx.recv().await {
        if let Some(e) = &row.error {
            warn!("Failed {}: {}", row.url, e);
        }
        db::upsert_page(conn, &row)?;
        stats.record(&row);
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Wiki: {} detail pages ({} ok, {} errors)", stats.total, stats.ok, stats.errors);
    Ok(stats)
}

fn spinner(label: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")?);
    pb.set_prefix(label.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(backoff_ms: u64) -> Fetcher {
        Fetcher {
            client: Client::new(),
            max_retries: 3,
            backoff_ms,
        }
    }

    #[test]
    fn backoff_doubles() {
        let f = fetcher(2000);
        assert_eq!(f.backoff(0), Duration::from_millis(2000));
        assert_eq!(f.backoff(1), Duration::from_millis(4000));
        assert_eq!(f.backoff(3), Duration::from_millis(16000));
    }

    #[test]
    fn retry_on_rate_limit_and_server_errors() {
        assert!(FetchError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(FetchError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(!FetchError::Status(StatusCode::NOT_FOUND).is_retryable());
        assert_eq!(FetchError::Status(StatusCode::NOT_FOUND).status(), Some(404));
    }

    #[test]
    fn stats_split_ok_and_errors() {
        let mut stats = CrawlStats::default();
        let mut row = PageRow {
            url: "https://example.com".into(),
            kind: PageKind::Directory,
            html: Some(String::new()),
            status: Some(200),
            error: None,
            latency_ms: None,
        };
        stats.record(&row);
        row.error = Some("HTTP 503 Service Unavailable".into());
        stats.record(&row);
        assert_eq!((stats.total, stats.ok, stats.errors), (2, 1, 1));
    }

    #[tokio::test]
    async fn unreachable_list_page_ends_crawl_quietly() {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let settings = Settings {
            db_path: ":memory:".into(),
            directory_url: "http://127.0.0.1:1/?page={page}".into(),
            wiki_base_url: "http://127.0.0.1:1".into(),
            wiki_list_url: "http://127.0.0.1:1/wiki/List".into(),
            user_agent: "test".into(),
            delay_ms: 0,
            max_retries: 0,
            backoff_ms: 0,
            concurrency: 1,
            timeout_secs: 5,
            max_pages: None,
        };

        let stats = crawl_wiki(&conn, &fetcher(0), &settings).await.unwrap();
        assert_eq!((stats.total, stats.ok, stats.errors), (1, 0, 1));
        let s = db::get_stats(&conn).unwrap();
        assert_eq!((s.wiki_pages, s.fetch_errors), (1, 1));
    }
}
