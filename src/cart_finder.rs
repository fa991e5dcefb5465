use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser::WebDriverBrowser;
use crate::cart::{CartOrchestrator, RunSummary};
use crate::config::AppConfig;
use crate::credentials::{CookieFile, NoCredentials};
use crate::input::load_input_items;
use crate::models::{ItemOutcome, ScrapedItem};
use crate::scraper::{HttpFetcher, Scraper};
use crate::scrapers::WalmartExtractor;
use crate::store::{JsonStore, OutcomeStores, save_scraped};
use crate::traits::CredentialProvider;

/// Counts for one cart phase, including items skipped as already done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CartReport {
    pub summary: RunSummary,
    pub skipped: usize,
    pub persisted: usize,
}

/// Wires the scrape and cart phases to their files
pub struct CartFinder {
    config: AppConfig,
    scraper: Scraper,
    orchestrator: Arc<CartOrchestrator>,
}

impl CartFinder {
    pub fn new(config: AppConfig, scraper: Scraper, orchestrator: Arc<CartOrchestrator>) -> Self {
        Self {
            config,
            scraper,
            orchestrator,
        }
    }

    /// Builds the HTTP scraper and WebDriver orchestrator described by `config`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let extractor = WalmartExtractor::new(&config.scrape.base_url, &config.scrape.search_url_pattern)?;
        let fetcher = HttpFetcher::new(extractor.config().clone(), &config.scrape)?;
        let scraper = Scraper::new(Arc::new(fetcher), Arc::new(extractor), &config.scrape);

        let credentials: Arc<dyn CredentialProvider> = match &config.cookies_path {
            Some(path) => Arc::new(CookieFile::load(path)?),
            None => {
                warn!("CART_FINDER_COOKIES not set - relying on the browser profile to be signed in");
                Arc::new(NoCredentials)
            }
        };
        let driver = Arc::new(WebDriverBrowser::new(&config.cart));
        let orchestrator = Arc::new(CartOrchestrator::new(driver, credentials, config.cart.clone()));

        Ok(Self::new(config, scraper, orchestrator))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Reads the input table, shortlists every item and writes the scraped artifact.
    ///
    /// Returns how many items were written.
    pub async fn scrape_phase(&self) -> Result<usize> {
        let items = load_input_items(&self.config.input_path)?;
        info!(
            "Loaded {} items from {}",
            items.len(),
            self.config.input_path.display()
        );

        let scraped = self.scraper.scrape_items(&items).await;
        let with_candidates = scraped.iter().filter(|s| !s.eligible_products.is_empty()).count();
        info!("{with_candidates}/{} items have eligible products", scraped.len());

        let store = JsonStore::new(&self.config.scraped_path);
        let written = save_scraped(&store, scraped).await?;
        Ok(written)
    }

    /// Adds every scraped item to the cart and records the outcomes
    pub async fn cart_phase(&self) -> Result<CartReport> {
        let scraped: BTreeMap<String, ScrapedItem> = JsonStore::new(&self.config.scraped_path)
            .try_load()
            .await
            .context("scraped products are unavailable, run the scrape phase first")?;

        let stores = OutcomeStores::new(
            &self.config.success_store_path,
            &self.config.failure_store_path,
        );

        let (pending, skipped) = if self.config.cart.skip_completed {
            let completed: BTreeMap<String, ItemOutcome> = stores.success.load().await;
            pending_items(scraped, &completed)
        } else {
            (scraped.into_iter().collect(), 0)
        };

        if pending.is_empty() {
            info!("Nothing to add to cart ({skipped} already done)");
            return Ok(CartReport {
                skipped,
                ..CartReport::default()
            });
        }

        info!("Adding {} items to cart with up to {} workers", pending.len(), self.config.cart.max_workers);

        let (outcomes, writer) = stores.spawn_writer();
        let summary = Arc::clone(&self.orchestrator).run(pending, outcomes).await;
        let persisted = writer.await.context("outcome writer task failed")?;

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped,
            persisted,
            "Cart phase finished"
        );

        Ok(CartReport {
            summary,
            skipped,
            persisted,
        })
    }

    /// Scrape phase followed by the cart phase
    pub async fn run(&self) -> Result<CartReport> {
        self.scrape_phase().await?;
        self.cart_phase().await
    }
}

/// Splits off items already recorded as successful
fn pending_items(
    scraped: BTreeMap<String, ScrapedItem>,
    completed: &BTreeMap<String, ItemOutcome>,
) -> (Vec<(String, ScrapedItem)>, usize) {
    let mut skipped = 0;
    let pending = scraped
        .into_iter()
        .filter(|(key, _)| {
            let done = completed.get(key).is_some_and(ItemOutcome::is_success);
            if done {
                info!("Skipping '{key}', already in cart");
                skipped += 1;
            }
            !done
        })
        .collect();

    (pending, skipped)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::config::build_app_config;
    use crate::models::{EligibleSet, InputItem, OutcomeStatus};

    fn scraped(name: &str) -> ScrapedItem {
        ScrapedItem {
            item: InputItem {
                name: name.to_string(),
                min_price: 1.0,
                max_price: 5.0,
                extra: BTreeMap::new(),
            },
            eligible_products: EligibleSet::from_ranked(Vec::new()),
        }
    }

    fn outcome(name: &str, final_status: OutcomeStatus) -> ItemOutcome {
        ItemOutcome {
            item_key: name.to_string(),
            item: scraped(name),
            final_status,
            successful_candidate: None,
            attempts: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let env: HashMap<&str, String> = HashMap::from([
            ("CART_FINDER_INPUT", dir.join("input.csv").display().to_string()),
            ("CART_FINDER_SCRAPED", dir.join("scraped.json").display().to_string()),
            ("CART_FINDER_SUCCESS_STORE", dir.join("ok.json").display().to_string()),
            ("CART_FINDER_FAILURE_STORE", dir.join("failed.json").display().to_string()),
        ]);
        build_app_config(|key| env.get(key).cloned().ok_or(std::env::VarError::NotPresent)).unwrap()
    }

    #[test]
    fn only_successful_outcomes_are_skipped() {
        let scraped_items = BTreeMap::from([
            ("lamp".to_string(), scraped("lamp")),
            ("fan".to_string(), scraped("fan")),
            ("kettle".to_string(), scraped("kettle")),
        ]);
        let completed = BTreeMap::from([
            ("lamp".to_string(), outcome("lamp", OutcomeStatus::Success)),
            ("fan".to_string(), outcome("fan", OutcomeStatus::Failure)),
        ]);

        let (pending, skipped) = pending_items(scraped_items, &completed);

        let keys: Vec<&str> = pending.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["fan", "kettle"]);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn cart_phase_needs_the_scraped_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let finder = CartFinder::from_config(config_in(dir.path())).unwrap();

        assert!(finder.cart_phase().await.is_err());

        std::fs::write(dir.path().join("scraped.json"), "not json").unwrap();
        assert!(finder.cart_phase().await.is_err());
    }

    #[tokio::test]
    async fn cart_phase_with_everything_done_opens_no_browser() {
        let dir = tempfile::tempdir().unwrap();
        let finder = CartFinder::from_config(config_in(dir.path())).unwrap();

        let artifact = BTreeMap::from([("lamp".to_string(), scraped("lamp"))]);
        JsonStore::new(dir.path().join("scraped.json"))
            .replace(&artifact)
            .await
            .unwrap();
        let done = BTreeMap::from([("lamp".to_string(), outcome("lamp", OutcomeStatus::Success))]);
        JsonStore::new(dir.path().join("ok.json")).replace(&done).await.unwrap();

        let report = finder.cart_phase().await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.summary, RunSummary::default());
    }

    #[tokio::test]
    async fn scrape_phase_fails_on_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let finder = CartFinder::from_config(config_in(dir.path())).unwrap();

        assert!(finder.scrape_phase().await.is_err());
        assert!(!finder.config().scraped_path.exists());
    }
}
