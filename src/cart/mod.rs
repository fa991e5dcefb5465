//! Add-to-cart orchestration: per-item attempts across ranked candidates,
//! with proxy escalation, run on a bounded pool of workers.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::browser::{LoginStatus, WindowLayout};
use crate::config::{CartConfig, UnknownLoginPolicy};
use crate::error::CartError;
use crate::models::{AttemptResult, Candidate, ItemOutcome, OutcomeStatus, ScrapedItem};
use crate::traits::{BrowserDriver, BrowserSession, CredentialProvider, SessionOptions};

/// Counts for one cart run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Retry and escalation state for one item
#[derive(Debug, Default)]
struct ItemProgress {
    proxy_needed: bool,
    attempts: Vec<AttemptResult>,
}

pub struct CartOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    credentials: Arc<dyn CredentialProvider>,
    config: CartConfig,
    layout: Mutex<WindowLayout>,
}

impl CartOrchestrator {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        credentials: Arc<dyn CredentialProvider>,
        config: CartConfig,
    ) -> Self {
        let layout = WindowLayout::new(config.screen_width, config.screen_height);
        Self {
            driver,
            credentials,
            config,
            layout: Mutex::new(layout),
        }
    }

    /// Processes every item on up to `max_workers` concurrent workers,
    /// sending each outcome to `outcomes` as soon as it is known.
    pub async fn run(
        self: Arc<Self>,
        items: Vec<(String, ScrapedItem)>,
        outcomes: mpsc::UnboundedSender<ItemOutcome>,
    ) -> RunSummary {
        self.layout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut workers = JoinSet::new();

        for (window_index, (item_key, item)) in items.into_iter().enumerate() {
            let orchestrator = Arc::clone(&self);
            let permits = Arc::clone(&permits);
            let outcomes = outcomes.clone();

            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return None;
                };

                orchestrator.start_jitter().await;
                let outcome = orchestrator.process_item(item_key, item, window_index).await;
                let succeeded = outcome.is_success();

                if outcomes.send(outcome).is_err() {
                    error!("Outcome writer is gone, result not persisted");
                }
                Some(succeeded)
            });
        }
        drop(outcomes);

        let mut summary = RunSummary::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Some(true)) => summary.succeeded += 1,
                Ok(Some(false)) | Ok(None) => summary.failed += 1,
                Err(e) => {
                    error!("Cart worker crashed: {e}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            "All product processing complete: {} added, {} failed",
            summary.succeeded, summary.failed
        );
        summary
    }

    /// Spreads worker start times so browsers do not all launch at once
    async fn start_jitter(&self) {
        let delay = rand::thread_rng().gen_range(self.config.start_jitter_ms.clone());
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// Tries the item's candidates in rank order until one lands in the cart
    pub async fn process_item(&self, item_key: String, item: ScrapedItem, window_index: usize) -> ItemOutcome {
        let mut progress = ItemProgress::default();
        let mut winner: Option<Candidate> = None;

        for (rank, candidate) in item.eligible_products.iter().enumerate() {
            if self
                .try_candidate(&item_key, candidate, window_index, &mut progress)
                .await
            {
                info!("Successfully added to cart: '{item_key}'");
                winner = Some(candidate.clone());
                break;
            }

            if rank >= 1 && self.config.retry_attempts >= 2 {
                warn!(
                    "Stopping '{item_key}' after {} products and {} attempts each",
                    rank + 1,
                    self.config.retry_attempts
                );
                break;
            }
        }

        if item.eligible_products.is_empty() {
            warn!("No eligible products for '{item_key}', nothing to add");
        } else if winner.is_none() {
            warn!("Product '{item_key}' could not be added to cart");
        }

        ItemOutcome {
            item_key,
            item,
            final_status: if winner.is_some() {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::Failure
            },
            successful_candidate: winner,
            attempts: progress.attempts,
            completed_at: Utc::now(),
        }
    }

    /// Spends the per-candidate attempt budget; true once the cart confirms
    async fn try_candidate(
        &self,
        item_key: &str,
        candidate: &Candidate,
        window_index: usize,
        progress: &mut ItemProgress,
    ) -> bool {
        let budget = self.config.retry_attempts.max(1);
        info!("Attempting to add to cart for '{item_key}': {}", candidate.url);

        for attempt in 1..=budget {
            let proxied = progress.proxy_needed;
            let result = self.attempt(candidate, proxied, window_index).await;

            progress.attempts.push(AttemptResult {
                candidate: candidate.clone(),
                succeeded: result.is_ok(),
                proxied,
                failure: result.as_ref().err().map(|e| e.kind().to_string()),
                timestamp: Utc::now(),
            });

            let Err(e) = result else {
                return true;
            };

            if e.escalates_proxy() {
                if !progress.proxy_needed {
                    warn!("Captcha detected for '{item_key}', switching to proxy");
                }
                progress.proxy_needed = true;
            }
            warn!(attempt, budget, proxied, "Attempt for '{item_key}' failed: {e}");
        }

        error!("Failed to add to cart after {budget} attempts: '{item_key}'");
        false
    }

    /// One browser session, released whatever happens inside it
    async fn attempt(&self, candidate: &Candidate, proxied: bool, window_index: usize) -> Result<(), CartError> {
        let placement = self
            .layout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .place(window_index);

        let mut session = self
            .driver
            .open_session(SessionOptions { proxied, placement })
            .await?;

        let result = self.drive(session.as_mut(), candidate, proxied).await;
        session.close().await;
        result
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        candidate: &Candidate,
        proxied: bool,
    ) -> Result<(), CartError> {
        session.navigate(&candidate.url).await?;

        let cookies = self.credentials.cookies();
        if !cookies.is_empty() {
            session.add_cookies(&cookies).await?;
        }
        sleep_nonzero(self.config.cookie_settle).await;
        session.reload().await?;

        let timeout = if proxied {
            self.config.proxied_page_timeout
        } else {
            self.config.page_timeout
        };
        session.wait_for_page(timeout).await?;

        match LoginStatus::classify(session.page_signals().await?) {
            LoginStatus::LoggedIn => {}
            LoginStatus::LoggedOut => return Err(CartError::NotLoggedIn),
            LoginStatus::Blocked => return Err(CartError::Blocked),
            LoginStatus::Unknown => match self.config.unknown_login {
                UnknownLoginPolicy::AssumeLoggedIn => {
                    warn!("Login state unclear on {}, assuming logged in", candidate.url);
                }
                UnknownLoginPolicy::Retry => return Err(CartError::UnknownLoginState),
            },
        }

        if session.add_to_cart_visible().await? {
            session.click_add_to_cart().await?;
            sleep_nonzero(self.config.settle_delay).await;

            if session.cart_confirmed().await? {
                Ok(())
            } else {
                Err(CartError::NotConfirmed)
            }
        } else if session.cart_confirmed().await? {
            info!("Item already in cart: {}", candidate.url);
            Ok(())
        } else {
            Err(CartError::ControlMissing)
        }
    }
}

async fn sleep_nonzero(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
