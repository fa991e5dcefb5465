pub mod browser;
pub mod cart;
pub mod cart_finder;
pub mod config;
pub mod credentials;
pub mod error;
pub mod input;
pub mod matcher;
pub mod models;
pub mod scraper;
pub mod scrapers;
pub mod store;
pub mod traits;
