use std::sync::Arc;
use std::time::Duration;

use cart_finder::config::ScrapeConfig;
use cart_finder::scraper::{HttpFetcher, Scraper};
use cart_finder::scrapers::WalmartExtractor;
use cart_finder::traits::Fetcher;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scrape_config(server: &MockServer) -> ScrapeConfig {
    ScrapeConfig {
        search_url_pattern: format!("{}/search?q={{query}}&page={{page}}", server.uri()),
        base_url: server.uri(),
        pages_per_query: 2,
        batch_size: 10,
        batch_pause_ms: 0..=0,
        fetch_attempts: 2,
        fetch_timeout: Duration::from_secs(5),
        min_body_len: 2000,
        proxy_url: None,
    }
}

fn extractor(config: &ScrapeConfig) -> WalmartExtractor {
    WalmartExtractor::new(&config.base_url, &config.search_url_pattern).unwrap()
}

fn fetcher(config: &ScrapeConfig) -> HttpFetcher {
    HttpFetcher::new(extractor(config).config().clone(), config).unwrap()
}

/// A search page embedding `products` as (name, price, path) in `__NEXT_DATA__`
fn search_page(products: &[(&str, f64, &str)]) -> String {
    let items: Vec<serde_json::Value> = products
        .iter()
        .map(|(name, price, url)| {
            serde_json::json!({
                "__typename": "Product",
                "name": name,
                "price": price,
                "canonicalUrl": url,
            })
        })
        .collect();
    let data = serde_json::json!({ "props": { "pageProps": { "initialData": { "items": items } } } });

    format!(
        r#"<html><head><script id="__NEXT_DATA__" type="application/json">{data}</script></head><body><!-- {} --></body></html>"#,
        "x".repeat(2500)
    )
}

#[tokio::test]
async fn large_ok_page_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "desk lamp"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetcher(&scrape_config(&server)).fetch("desk lamp", 1).await;

    assert!(body.is_some_and(|b| b.contains("__NEXT_DATA__")));
}

#[tokio::test]
async fn short_page_is_retried_then_abandoned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captcha</html>"))
        .expect(2)
        .mount(&server)
        .await;

    let body = fetcher(&scrape_config(&server)).fetch("desk lamp", 1).await;

    assert!(body.is_none());
}

#[tokio::test]
async fn server_error_recovers_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(3000)))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let body = fetcher(&scrape_config(&server)).fetch("desk lamp", 1).await;

    assert!(body.is_some());
}

#[tokio::test]
async fn scrape_merges_pages_and_shortlists_by_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(&[
            ("Lamp A", 24.0, "/ip/lamp-a/1?athbdg=L1"),
            ("Lamp B", 9.5, "/ip/lamp-b/2"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(search_page(&[
            ("Lamp A again", 24.0, "/ip/lamp-a/1"),
            ("Lamp C", 12.0, "/ip/lamp-c/3"),
        ])))
        .mount(&server)
        .await;

    let config = scrape_config(&server);
    let scraper = Scraper::new(
        Arc::new(fetcher(&config)),
        Arc::new(extractor(&config)),
        &config,
    );

    let candidates = scraper.scrape_query("desk lamp").await;
    let urls: Vec<String> = candidates.iter().map(|c| c.url.clone()).collect();
    assert_eq!(
        urls,
        vec![
            format!("{}/ip/lamp-a/1", server.uri()),
            format!("{}/ip/lamp-b/2", server.uri()),
            format!("{}/ip/lamp-c/3", server.uri()),
        ]
    );

    let items = cart_finder::input::parse_input_items(
        "Item Name,Min Cost ($),Max Cost ($)\nDesk Lamp,10,25\n".as_bytes(),
    )
    .unwrap();
    let scraped = scraper.scrape_items(&items).await;

    assert_eq!(scraped.len(), 1);
    let names: Vec<&str> = scraped[0]
        .eligible_products
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["Lamp C", "Lamp A"]);
}
