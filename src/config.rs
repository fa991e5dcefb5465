//! Environment-driven configuration

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// What to do when a product page shows neither a signed-in nor a
/// signed-out header and no robot check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownLoginPolicy {
    /// Carry on as if logged in
    AssumeLoggedIn,
    /// Count the attempt as failed and retry
    Retry,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Search URL with `{query}` and `{page}` placeholders
    pub search_url_pattern: String,
    pub base_url: String,
    pub pages_per_query: u32,
    pub batch_size: usize,
    pub batch_pause_ms: RangeInclusive<u64>,
    pub fetch_attempts: u32,
    pub fetch_timeout: Duration,
    /// Bodies at or under this many bytes are treated as a failed fetch
    pub min_body_len: usize,
    pub proxy_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CartConfig {
    pub webdriver_url: String,
    pub max_workers: usize,
    /// Attempts per candidate, at least 1
    pub retry_attempts: u32,
    pub page_timeout: Duration,
    pub proxied_page_timeout: Duration,
    pub cookie_settle: Duration,
    pub settle_delay: Duration,
    pub start_jitter_ms: RangeInclusive<u64>,
    pub profile_dir: Option<PathBuf>,
    pub proxied_profile_dir: Option<PathBuf>,
    pub browser_proxy_url: Option<String>,
    pub unknown_login: UnknownLoginPolicy,
    pub screen_width: u32,
    pub screen_height: u32,
    pub skip_completed: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub input_path: PathBuf,
    pub scraped_path: PathBuf,
    pub success_store_path: PathBuf,
    pub failure_store_path: PathBuf,
    pub cookies_path: Option<PathBuf>,
    pub scrape: ScrapeConfig,
    pub cart: CartConfig,
}

/// Reads the process environment; `main` has already loaded `.env`.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but does not parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Core parsing, decoupled from the real environment so tests can feed a map.
pub(crate) fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let optional = |var: &str| lookup(var).ok().filter(|v| !v.trim().is_empty());
    let or_default = |var: &str, default: &str| optional(var).unwrap_or_else(|| default.to_string());

    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        optional(var).map_or(Ok(default), |raw| {
            raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
        })
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        optional(var).map_or(Ok(default), |raw| {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ConfigError::InvalidEnvVar {
                    var: var.to_string(),
                    reason: format!("expected a boolean, got {other:?}"),
                }),
            }
        })
    };

    let range = |min_var: &str, max_var: &str, min: u64, max: u64| -> Result<RangeInclusive<u64>, ConfigError> {
        let lo = parse_u64(min_var, min)?;
        let hi = parse_u64(max_var, max)?;
        if lo > hi {
            return Err(ConfigError::InvalidEnvVar {
                var: min_var.to_string(),
                reason: format!("{lo} is greater than {max_var}={hi}"),
            });
        }
        Ok(lo..=hi)
    };

    let unknown_login = match or_default("CART_FINDER_UNKNOWN_LOGIN", "assume-logged-in").as_str() {
        "assume-logged-in" => UnknownLoginPolicy::AssumeLoggedIn,
        "retry" => UnknownLoginPolicy::Retry,
        other => {
            return Err(ConfigError::InvalidEnvVar {
                var: "CART_FINDER_UNKNOWN_LOGIN".to_string(),
                reason: format!("expected `assume-logged-in` or `retry`, got {other:?}"),
            });
        }
    };

    let retry_attempts = parse_u64("CART_FINDER_RETRY_ATTEMPTS", 1)?;
    if retry_attempts == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "CART_FINDER_RETRY_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let scrape = ScrapeConfig {
        search_url_pattern: or_default(
            "CART_FINDER_SEARCH_URL",
            "https://www.walmart.com/search?q={query}&page={page}",
        ),
        base_url: or_default("CART_FINDER_BASE_URL", "https://www.walmart.com"),
        pages_per_query: to_u32("CART_FINDER_PAGES_PER_QUERY", parse_u64("CART_FINDER_PAGES_PER_QUERY", 2)?)?,
        batch_size: parse_u64("CART_FINDER_BATCH_SIZE", 100)?.max(1) as usize,
        batch_pause_ms: range(
            "CART_FINDER_BATCH_PAUSE_MIN_MS",
            "CART_FINDER_BATCH_PAUSE_MAX_MS",
            1000,
            3000,
        )?,
        fetch_attempts: to_u32("CART_FINDER_FETCH_ATTEMPTS", parse_u64("CART_FINDER_FETCH_ATTEMPTS", 2)?)?,
        fetch_timeout: Duration::from_secs(parse_u64("CART_FINDER_FETCH_TIMEOUT_SECS", 60)?),
        min_body_len: parse_u64("CART_FINDER_MIN_BODY_LEN", 2000)? as usize,
        proxy_url: optional("CART_FINDER_SCRAPE_PROXY"),
    };

    let cart = CartConfig {
        webdriver_url: or_default("CART_FINDER_WEBDRIVER_URL", "http://localhost:4444"),
        max_workers: parse_u64("CART_FINDER_MAX_WORKERS", 30)?.max(1) as usize,
        retry_attempts: to_u32("CART_FINDER_RETRY_ATTEMPTS", retry_attempts)?,
        page_timeout: Duration::from_secs(parse_u64("CART_FINDER_PAGE_TIMEOUT_SECS", 40)?),
        proxied_page_timeout: Duration::from_secs(parse_u64(
            "CART_FINDER_PROXIED_PAGE_TIMEOUT_SECS",
            180,
        )?),
        cookie_settle: Duration::from_millis(parse_u64("CART_FINDER_COOKIE_SETTLE_MS", 2000)?),
        settle_delay: Duration::from_millis(parse_u64("CART_FINDER_SETTLE_DELAY_MS", 4000)?),
        start_jitter_ms: range(
            "CART_FINDER_START_JITTER_MIN_MS",
            "CART_FINDER_START_JITTER_MAX_MS",
            1000,
            3000,
        )?,
        profile_dir: optional("CART_FINDER_PROFILE_DIR").map(PathBuf::from),
        proxied_profile_dir: optional("CART_FINDER_PROXIED_PROFILE_DIR").map(PathBuf::from),
        browser_proxy_url: optional("CART_FINDER_BROWSER_PROXY"),
        unknown_login,
        screen_width: to_u32("CART_FINDER_SCREEN_WIDTH", parse_u64("CART_FINDER_SCREEN_WIDTH", 1920)?)?,
        screen_height: to_u32("CART_FINDER_SCREEN_HEIGHT", parse_u64("CART_FINDER_SCREEN_HEIGHT", 1000)?)?,
        skip_completed: parse_bool("CART_FINDER_SKIP_COMPLETED", true)?,
    };

    Ok(AppConfig {
        input_path: PathBuf::from(or_default("CART_FINDER_INPUT", "input_data/products_details.csv")),
        scraped_path: PathBuf::from(or_default(
            "CART_FINDER_SCRAPED",
            "data/output_data/scraped_products.json",
        )),
        success_store_path: PathBuf::from(or_default(
            "CART_FINDER_SUCCESS_STORE",
            "data/output_data/added_to_carts_successful_products.json",
        )),
        failure_store_path: PathBuf::from(or_default(
            "CART_FINDER_FAILURE_STORE",
            "data/output_data/failed_to_add_products.json",
        )),
        cookies_path: optional("CART_FINDER_COOKIES").map(PathBuf::from),
        scrape,
        cart,
    })
}

fn to_u32(var: &str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        build_app_config(|key| env.get(key).cloned().ok_or(std::env::VarError::NotPresent))
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.cart.retry_attempts, 1);
        assert_eq!(config.cart.max_workers, 30);
        assert_eq!(config.cart.page_timeout, Duration::from_secs(40));
        assert_eq!(config.cart.proxied_page_timeout, Duration::from_secs(180));
        assert_eq!(config.cart.unknown_login, UnknownLoginPolicy::AssumeLoggedIn);
        assert!(config.cart.skip_completed);
        assert_eq!(config.scrape.pages_per_query, 2);
        assert_eq!(config.scrape.min_body_len, 2000);
        assert_eq!(config.scrape.batch_pause_ms, 1000..=3000);
        assert!(config.cookies_path.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("CART_FINDER_RETRY_ATTEMPTS", "3"),
            ("CART_FINDER_UNKNOWN_LOGIN", "retry"),
            ("CART_FINDER_SKIP_COMPLETED", "no"),
            ("CART_FINDER_BROWSER_PROXY", "http://proxy.local:8080"),
        ])
        .unwrap();

        assert_eq!(config.cart.retry_attempts, 3);
        assert_eq!(config.cart.unknown_login, UnknownLoginPolicy::Retry);
        assert!(!config.cart.skip_completed);
        assert_eq!(config.cart.browser_proxy_url.as_deref(), Some("http://proxy.local:8080"));
    }

    #[test]
    fn zero_retry_attempts_is_rejected() {
        let err = config_from(&[("CART_FINDER_RETRY_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "CART_FINDER_RETRY_ATTEMPTS"));
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let err = config_from(&[("CART_FINDER_MAX_WORKERS", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn inverted_jitter_window_is_rejected() {
        let err = config_from(&[
            ("CART_FINDER_START_JITTER_MIN_MS", "500"),
            ("CART_FINDER_START_JITTER_MAX_MS", "100"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }
}
