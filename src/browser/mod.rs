//! WebDriver-backed browser sessions and page-state classification

mod layout;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::prelude::*;
use thirtyfour::{CapabilitiesHelper, ChromeCapabilities, ChromiumLikeCapabilities, Cookie, Proxy};
use tracing::{debug, warn};

pub use layout::{WindowLayout, WindowPlacement};

use crate::config::CartConfig;
use crate::error::CartError;
use crate::traits::{BrowserDriver, BrowserSession, SessionCookie, SessionOptions};

/// Bodies this short that mention "Forbidden" are an edge block page
const FORBIDDEN_BODY_LEN: usize = 500;

/// Markers read off the product page after it renders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSignals {
    /// Account header greets a signed-in shopper
    pub signed_in: bool,
    /// Account header offers to sign in
    pub signed_out: bool,
    /// Robot check or forbidden page
    pub blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    LoggedIn,
    LoggedOut,
    Blocked,
    Unknown,
}

impl LoginStatus {
    /// Signed-in wins over signed-out, which wins over a block marker
    pub fn classify(signals: PageSignals) -> Self {
        if signals.signed_in {
            Self::LoggedIn
        } else if signals.signed_out {
            Self::LoggedOut
        } else if signals.blocked {
            Self::Blocked
        } else {
            Self::Unknown
        }
    }
}

/// XPath expressions for the page elements the cart flow looks at
#[derive(Debug, Clone)]
pub struct PageMarkers {
    pub signed_in: String,
    pub signed_out: String,
    pub robot_check: String,
    pub add_to_cart: String,
    pub cart_confirmation: String,
}

impl Default for PageMarkers {
    fn default() -> Self {
        const ACCOUNT: &str = r#"//a[@link-identifier="Account"]"#;
        const HEADER_SIGN_IN: &str = r#"//div[@data-automation-id="headerSignIn"]"#;

        Self {
            signed_in: format!(r#"{ACCOUNT}[contains(., "Hi, ")] | {HEADER_SIGN_IN}[contains(., "Hi, ")]"#),
            signed_out: format!(r#"{ACCOUNT}[contains(., "Sign In")] | {HEADER_SIGN_IN}[contains(., "Sign In")]"#),
            robot_check: r#"//h1[contains(text(), "Robot or human?")] | //h2[contains(text(), "Robot or human?")]"#
                .to_string(),
            add_to_cart: r#"//div[contains(@data-testid, "add-to-cart-section")]//button[contains(@aria-label, "Add to cart")]"#
                .to_string(),
            cart_confirmation: r#"//h1[contains(text(), "Added to cart")] | //button[contains(text(), "View cart")]"#
                .to_string(),
        }
    }
}

/// Opens Chrome sessions through a WebDriver server
#[derive(Debug, Clone)]
pub struct WebDriverBrowser {
    server_url: String,
    profile_dir: Option<PathBuf>,
    proxied_profile_dir: Option<PathBuf>,
    proxy_url: Option<String>,
    markers: PageMarkers,
}

impl WebDriverBrowser {
    pub fn new(config: &CartConfig) -> Self {
        if config.browser_proxy_url.is_none() {
            warn!("CART_FINDER_BROWSER_PROXY not set - proxied sessions will only switch profile");
        }

        Self {
            server_url: config.webdriver_url.clone(),
            profile_dir: config.profile_dir.clone(),
            proxied_profile_dir: config.proxied_profile_dir.clone(),
            proxy_url: config.browser_proxy_url.clone(),
            markers: PageMarkers::default(),
        }
    }

    fn capabilities(&self, proxied: bool) -> WebDriverResult<ChromeCapabilities> {
        let mut caps = DesiredCapabilities::chrome();

        let profile = if proxied {
            self.proxied_profile_dir.as_ref()
        } else {
            self.profile_dir.as_ref()
        };
        if let Some(dir) = profile {
            caps.add_arg(&format!("--user-data-dir={}", dir.display()))?;
        }

        if proxied {
            if let Some(proxy) = &self.proxy_url {
                caps.set_proxy(Proxy::Manual {
                    ftp_proxy: None,
                    http_proxy: Some(proxy.clone()),
                    ssl_proxy: Some(proxy.clone()),
                    socks_proxy: None,
                    socks_version: None,
                    socks_username: None,
                    socks_password: None,
                    no_proxy: None,
                })?;
            }
            caps.add_arg("--ignore-certificate-errors")?;
        }

        Ok(caps)
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn open_session(&self, options: SessionOptions) -> Result<Box<dyn BrowserSession>, CartError> {
        let caps = self.capabilities(options.proxied)?;
        let driver = WebDriver::new(&self.server_url, caps).await?;

        let placement = options.placement;
        if let Err(e) = driver
            .set_window_rect(placement.x, placement.y, placement.width, placement.height)
            .await
        {
            // Placement is cosmetic
            debug!("Could not place browser window: {e}");
        }

        Ok(Box::new(WebDriverSession {
            driver,
            markers: self.markers.clone(),
        }))
    }
}

struct WebDriverSession {
    driver: WebDriver,
    markers: PageMarkers,
}

impl WebDriverSession {
    async fn any_visible(&self, xpath: &str) -> Result<bool, CartError> {
        for element in self.driver.find_all(By::XPath(xpath)).await? {
            if element.is_displayed().await.unwrap_or(false) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn forbidden_body(&self) -> Result<bool, CartError> {
        let body = self.driver.find(By::Tag("body")).await?.text().await?;
        Ok(body.len() < FORBIDDEN_BODY_LEN && body.contains("Forbidden"))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), CartError> {
        self.driver.goto(url).await?;
        Ok(())
    }

    async fn add_cookies(&mut self, cookies: &[SessionCookie]) -> Result<(), CartError> {
        for cookie in cookies {
            self.driver
                .add_cookie(Cookie::new(cookie.name.clone(), cookie.value.clone()))
                .await?;
        }
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), CartError> {
        self.driver.refresh().await?;
        Ok(())
    }

    async fn wait_for_page(&mut self, timeout: Duration) -> Result<(), CartError> {
        self.driver
            .query(By::Tag("body"))
            .wait(timeout, Duration::from_millis(500))
            .and_displayed()
            .first()
            .await
            .map(|_| ())
            .map_err(|_| CartError::LoadTimeout {
                secs: timeout.as_secs(),
            })
    }

    async fn page_signals(&mut self) -> Result<PageSignals, CartError> {
        let signed_in = self.any_visible(&self.markers.signed_in).await?;
        let signed_out = !signed_in && self.any_visible(&self.markers.signed_out).await?;
        let blocked = !signed_in
            && !signed_out
            && (self.any_visible(&self.markers.robot_check).await? || self.forbidden_body().await?);

        Ok(PageSignals {
            signed_in,
            signed_out,
            blocked,
        })
    }

    async fn add_to_cart_visible(&mut self) -> Result<bool, CartError> {
        self.any_visible(&self.markers.add_to_cart).await
    }

    async fn click_add_to_cart(&mut self) -> Result<(), CartError> {
        let button = self
            .driver
            .query(By::XPath(self.markers.add_to_cart.as_str()))
            .wait(Duration::from_secs(30), Duration::from_millis(500))
            .and_displayed()
            .first()
            .await
            .map_err(|e| CartError::ClickFailed(e.to_string()))?;

        button
            .click()
            .await
            .map_err(|e| CartError::ClickFailed(e.to_string()))
    }

    async fn cart_confirmed(&mut self) -> Result<bool, CartError> {
        self.any_visible(&self.markers.cart_confirmation).await
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.driver.quit().await {
            warn!("Failed to close browser session: {e}");
        }
    }
}
