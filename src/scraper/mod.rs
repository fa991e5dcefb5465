//! Scrape phase: fetch search pages, extract candidates and shortlist them

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use rand::Rng;
use rand::seq::SliceRandom;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, warn};

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::matcher;
use crate::models::{InputItem, RawCandidate, ScrapedItem};
use crate::traits::{CandidateExtractor, Fetcher, SearchConfig, build_search_url};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
];

/// HTTP search page fetcher with bounded retries
pub struct HttpFetcher {
    client: Client,
    search: SearchConfig,
    attempts: u32,
    min_body_len: usize,
}

impl HttpFetcher {
    pub fn new(search: SearchConfig, config: &ScrapeConfig) -> Result<Self, ScrapeError> {
        let mut builder = Client::builder().timeout(config.fetch_timeout);
        if let Some(proxy) = &config.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            search,
            attempts: config.fetch_attempts.max(1),
            min_body_len: config.min_body_len,
        })
    }

    fn user_agent() -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }

    async fn fetch_once(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, Self::user_agent())
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK || body.len() <= self.min_body_len {
            return Err(ScrapeError::Implausible {
                url: url.to_string(),
                status: status.as_u16(),
                len: body.len(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, query: &str, page: u32) -> Option<String> {
        let url = build_search_url(&self.search, query, page);

        for attempt in 1..=self.attempts {
            let started = Instant::now();
            match self.fetch_once(&url).await {
                Ok(body) => {
                    info!(
                        "Page {page} for '{query}' fetched: {} bytes in {:.2}s",
                        body.len(),
                        started.elapsed().as_secs_f64()
                    );
                    return Some(body);
                }
                Err(e) => {
                    warn!(attempt, attempts = self.attempts, "Page {page} for '{query}' failed: {e}");
                }
            }
        }

        error!("Giving up on page {page} for '{query}' after {} attempts", self.attempts);
        None
    }
}

/// Drives the scrape phase over a list of input items
pub struct Scraper {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn CandidateExtractor>,
    pages_per_query: u32,
    batch_size: usize,
    batch_pause_ms: std::ops::RangeInclusive<u64>,
}

impl Scraper {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn CandidateExtractor>,
        config: &ScrapeConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            pages_per_query: config.pages_per_query.max(1),
            batch_size: config.batch_size.max(1),
            batch_pause_ms: config.batch_pause_ms.clone(),
        }
    }

    /// Fetches every page for `query` concurrently and merges their
    /// candidates in page order, dropping repeated URLs.
    pub async fn scrape_query(&self, query: &str) -> Vec<RawCandidate> {
        let pages = join_all((1..=self.pages_per_query).map(|page| self.fetcher.fetch(query, page))).await;

        let bodies: Vec<String> = pages.into_iter().flatten().collect();
        if bodies.is_empty() {
            error!("No usable pages for query: '{query}'");
            return Vec::new();
        }

        let mut seen = std::collections::HashSet::new();
        let candidates: Vec<RawCandidate> = bodies
            .iter()
            .flat_map(|body| self.extractor.extract(body))
            .filter(|candidate| seen.insert(candidate.url.clone()))
            .collect();

        info!("Found {} products for query: '{query}'", candidates.len());
        candidates
    }

    /// Shortlists candidates for one item
    pub fn shortlist(item: &InputItem, candidates: &[RawCandidate]) -> ScrapedItem {
        let eligible = matcher::select(candidates, item.min_price, item.max_price);
        if eligible.is_empty() {
            warn!("No eligible products found for '{}'", item.name);
        } else {
            debug!("{} eligible products for '{}'", eligible.len(), item.name);
        }

        ScrapedItem {
            item: item.clone(),
            eligible_products: eligible,
        }
    }

    /// Runs every item through search and shortlisting, batch by batch.
    ///
    /// Results come back in input order.
    pub async fn scrape_items(&self, items: &[InputItem]) -> Vec<ScrapedItem> {
        let mut results = Vec::with_capacity(items.len());
        let batches = items.len().div_ceil(self.batch_size);

        for (index, batch) in items.chunks(self.batch_size).enumerate() {
            info!("Processing batch {}/{batches} ({} items)", index + 1, batch.len());

            let scraped = join_all(batch.iter().map(|item| self.scrape_query(&item.name))).await;

            results.extend(
                batch
                    .iter()
                    .zip(scraped)
                    .map(|(item, candidates)| Self::shortlist(item, &candidates)),
            );

            if index + 1 < batches {
                let pause = rand::thread_rng().gen_range(self.batch_pause_ms.clone());
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
        }

        info!("Scraped {} items", results.len());
        results
    }
}
