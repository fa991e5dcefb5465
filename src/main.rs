use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cart_finder::cart_finder::CartFinder;
use cart_finder::config::load_app_config;

#[derive(Parser)]
#[command(name = "cart-finder", about = "Find priced products and add them to a shopping cart")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search for every input item and write the shortlist
    Scrape {
        /// Input CSV with item names and price bands
        #[arg(long)]
        input: Option<PathBuf>,
        /// Where to write the scraped shortlist
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Add shortlisted products to the cart
    Cart {
        /// Scraped shortlist to read
        #[arg(long)]
        scraped: Option<PathBuf>,
    },
    /// Scrape, then add to cart
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = load_app_config()?;

    match &cli.command {
        Command::Scrape { input, output } => {
            if let Some(input) = input {
                config.input_path = input.clone();
            }
            if let Some(output) = output {
                config.scraped_path = output.clone();
            }
        }
        Command::Cart { scraped } => {
            if let Some(scraped) = scraped {
                config.scraped_path = scraped.clone();
            }
        }
        Command::Run => {}
    }

    let finder = CartFinder::from_config(config)?;

    match cli.command {
        Command::Scrape { .. } => {
            let written = finder.scrape_phase().await?;
            info!("Scrape finished: {written} items written");
        }
        Command::Cart { .. } => {
            finder.cart_phase().await?;
        }
        Command::Run => {
            finder.run().await?;
        }
    }

    Ok(())
}
