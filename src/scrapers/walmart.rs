//! Walmart search page extractor

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::models::RawCandidate;
use crate::traits::{CandidateExtractor, SearchConfig, SiteSelectors};

/// Pulls product records out of a Walmart search page, preferring the
/// embedded `__NEXT_DATA__` JSON and falling back to product tiles.
pub struct WalmartExtractor {
    config: SearchConfig,
    next_data: Selector,
    product_container: Selector,
    link: Selector,
    title: Selector,
    price: Selector,
}

impl WalmartExtractor {
    /// Default selectors for walmart.com, with the given search pattern
    pub fn new(base_url: &str, search_url_pattern: &str) -> Result<Self, ScrapeError> {
        Self::with_config(SearchConfig {
            name: "Walmart".to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            search_url_pattern: search_url_pattern.to_string(),
            selectors: SiteSelectors {
                next_data: r#"script#__NEXT_DATA__[type="application/json"]"#.to_string(),
                product_container: r#"div[role="group"]"#.to_string(),
                link: "a".to_string(),
                title: "a > span".to_string(),
                price: r#"div[data-automation-id="product-price"] span.f2"#.to_string(),
            },
        })
    }

    pub fn with_config(config: SearchConfig) -> Result<Self, ScrapeError> {
        let parse = |selector: &str| {
            Selector::parse(selector).map_err(|e| ScrapeError::Selector {
                selector: selector.to_string(),
                reason: format!("{e:?}"),
            })
        };

        Ok(Self {
            next_data: parse(&config.selectors.next_data)?,
            product_container: parse(&config.selectors.product_container)?,
            link: parse(&config.selectors.link)?,
            title: parse(&config.selectors.title)?,
            price: parse(&config.selectors.price)?,
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Absolute URL without its query string
    fn normalize_url(&self, href: &str) -> String {
        let mut url = if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{href}", self.config.base_url)
        } else {
            format!("{}/{href}", self.config.base_url)
        };

        if let Some(query_start) = url.find('?') {
            url.truncate(query_start);
        }
        url
    }

    fn extract_from_json(&self, script: &str) -> Result<Vec<RawCandidate>, ScrapeError> {
        let data: Value = serde_json::from_str(script).map_err(|source| ScrapeError::Parse {
            context: format!("{} __NEXT_DATA__", self.config.name),
            source,
        })?;

        let mut products = Vec::new();
        collect_typename(&data, "Product", &mut products);

        Ok(products
            .into_iter()
            .filter_map(|product| {
                let name = product.get("name")?.as_str()?.trim();
                let url = product.get("canonicalUrl")?.as_str()?;
                let price = match product.get("price")? {
                    Value::Number(n) => n.to_string(),
                    Value::String(s) if !s.trim().is_empty() => s.clone(),
                    _ => return None,
                };
                if name.is_empty() || url.is_empty() {
                    return None;
                }

                Some(RawCandidate {
                    name: name.to_string(),
                    price: Some(price),
                    url: self.normalize_url(url),
                })
            })
            .collect())
    }

    fn extract_from_tiles(&self, document: &Html) -> Vec<RawCandidate> {
        document
            .select(&self.product_container)
            .filter_map(|tile| self.extract_tile(tile))
            .collect()
    }

    fn extract_tile(&self, tile: ElementRef<'_>) -> Option<RawCandidate> {
        let href = tile.select(&self.link).next()?.value().attr("href")?;

        let name = tile.select(&self.title).next().map_or_else(
            || "Unknown Item".to_string(),
            |el| el.text().collect::<String>().trim().to_string(),
        );

        // Tiles render the dollars in their own span; take the first digit run
        let price = tile.select(&self.price).next().and_then(|el| {
            let text = el.text().collect::<String>();
            let digits: String = text
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(char::is_ascii_digit)
                .collect();
            (!digits.is_empty()).then_some(digits)
        })?;

        Some(RawCandidate {
            name,
            price: Some(price),
            url: self.normalize_url(href),
        })
    }
}

impl CandidateExtractor for WalmartExtractor {
    fn extract(&self, content: &str) -> Vec<RawCandidate> {
        let document = Html::parse_document(content);

        let script = document
            .select(&self.next_data)
            .next()
            .map(|el| el.text().collect::<String>());

        match script {
            Some(script) => match self.extract_from_json(&script) {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("{e}");
                    Vec::new()
                }
            },
            None => {
                debug!("No structured data on {} page, reading product tiles", self.config.name);
                self.extract_from_tiles(&document)
            }
        }
    }
}

/// Depth-first collection of every object whose `__typename` matches
fn collect_typename<'a>(value: &'a Value, typename: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if map.get("__typename").and_then(Value::as_str) == Some(typename) {
                out.push(value);
            }
            for child in map.values() {
                collect_typename(child, typename, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_typename(item, typename, out);
            }
        }
        _ => {}
    }
}
