//! Collaborator seams: page fetching, candidate extraction, browser control
//! and credentials

use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{PageSignals, WindowPlacement};
use crate::error::CartError;
use crate::models::RawCandidate;

/// Where and how to search a retail site
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Display name for logs
    pub name: String,
    /// Base URL used to absolutize relative product links
    pub base_url: String,
    /// Search URL pattern with `{query}` and `{page}` placeholders
    pub search_url_pattern: String,
    pub selectors: SiteSelectors,
}

/// CSS selectors for the structured-data and tile-based extraction paths
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Script tag holding the page's embedded JSON state
    pub next_data: String,
    /// Container for one product tile
    pub product_container: String,
    /// Link inside a tile, carrying the product URL
    pub link: String,
    /// Name text inside the tile link
    pub title: String,
    /// Price text inside a tile
    pub price: String,
}

/// Fetches one page of search results
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the page body, or `None` once every attempt failed
    async fn fetch(&self, query: &str, page: u32) -> Option<String>;
}

/// Turns a search results page into raw product records
pub trait CandidateExtractor: Send + Sync {
    fn extract(&self, content: &str) -> Vec<RawCandidate>;
}

/// Options for opening one browser session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub proxied: bool,
    pub placement: WindowPlacement,
}

/// Opens browser sessions
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open_session(
        &self,
        options: SessionOptions,
    ) -> Result<Box<dyn BrowserSession>, CartError>;
}

/// One open browser window, exclusively owned by the worker that opened it.
///
/// Callers must call [`BrowserSession::close`] on every path once the
/// session is open.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), CartError>;

    async fn add_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), CartError>;

    async fn reload(&mut self) -> Result<(), CartError>;

    /// Waits until the page root has rendered
    async fn wait_for_page(&mut self, timeout: Duration) -> Result<(), CartError>;

    /// Reads the login and robot-check markers off the current page
    async fn page_signals(&mut self) -> Result<PageSignals, CartError>;

    async fn add_to_cart_visible(&mut self) -> Result<bool, CartError>;

    async fn click_add_to_cart(&mut self) -> Result<(), CartError>;

    /// True when the page shows the item is in the cart
    async fn cart_confirmed(&mut self) -> Result<bool, CartError>;

    async fn close(self: Box<Self>);
}

/// A cookie injected into every browser session
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
}

/// Supplies the cookies that carry the shopper's logged-in session
pub trait CredentialProvider: Send + Sync {
    fn cookies(&self) -> Vec<SessionCookie>;
}

/// Builds the search URL for one query and page
pub fn build_search_url(config: &SearchConfig, query: &str, page: u32) -> String {
    let encoded_term = urlencoding::encode(query);
    config
        .search_url_pattern
        .replace("{query}", &encoded_term)
        .replace("{page}", &page.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_encodes_query_and_page() {
        let config = SearchConfig {
            name: "test".into(),
            base_url: "https://shop.example".into(),
            search_url_pattern: "https://shop.example/search?q={query}&page={page}".into(),
            selectors: SiteSelectors {
                next_data: String::new(),
                product_container: String::new(),
                link: String::new(),
                title: String::new(),
                price: String::new(),
            },
        };

        assert_eq!(
            build_search_url(&config, "desk lamp & bulb", 2),
            "https://shop.example/search?q=desk%20lamp%20%26%20bulb&page=2"
        );
    }
}
