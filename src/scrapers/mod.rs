use async_trait::async_trait;
use std::sync::Arc;

use crate::browser::SearchPage;
use crate::config::SiteConfig;
use crate::error::ConfigError;
use crate::models::{ResultRecord, Site};

mod engine;
mod image;
mod shopping;
mod storefront;

pub use engine::{build_search_url, LookupEngine, LookupOutcome, RuleOutcome};
pub use image::{pick_image, ImageFetcher};
pub use shopping::ShoppingScraper;
pub use storefront::StorefrontScraper;

/// Turns one input query into one output record using a page the caller owns.
#[async_trait]
pub trait ProductScraper: Send + Sync {
    /// Never fails: every problem ends up in the record's resolution.
    async fn lookup(&self, page: &dyn SearchPage, query: &str) -> ResultRecord;
    fn site_config(&self) -> &SiteConfig;
    fn site_key(&self) -> Site;
}

pub fn build_scraper(
    site: Site,
    config: Arc<SiteConfig>,
) -> Result<Box<dyn ProductScraper>, ConfigError> {
    let scraper: Box<dyn ProductScraper> = match site {
        Site::GoogleShopping => Box::new(ShoppingScraper::new(site, config)?),
        Site::Petlove | Site::PetloveV2 | Site::Cobasi => {
            Box::new(StorefrontScraper::new(site, config)?)
        }
    };
    Ok(scraper)
}
