use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::browser::SearchPage;
use crate::config::SiteConfig;
use crate::error::ConfigError;
use crate::models::{ResultRecord, Site, EMOJI_CHECK, EMOJI_CROSS};
use crate::scrapers::{LookupEngine, ProductScraper};

/// Pet-store search pages: one product name per code.
pub struct StorefrontScraper {
    site: Site,
    engine: LookupEngine,
}

impl StorefrontScraper {
    pub fn new(site: Site, config: Arc<SiteConfig>) -> Result<Self, ConfigError> {
        Ok(Self {
            site,
            engine: LookupEngine::new(config)?,
        })
    }
}

#[async_trait]
impl ProductScraper for StorefrontScraper {
    async fn lookup(&self, page: &dyn SearchPage, query: &str) -> ResultRecord {
        let outcome = self.engine.lookup(page, query).await;
        match outcome.text {
            Some(text) => {
                info!("{} {} -> {}", EMOJI_CHECK, query.trim(), text);
                ResultRecord::found(query, text, outcome.resolution)
            }
            None => {
                info!("{} {}: {}", EMOJI_CROSS, query.trim(), outcome.resolution);
                ResultRecord::not_found(query, outcome.resolution)
            }
        }
    }

    fn site_config(&self) -> &SiteConfig {
        self.engine.site()
    }

    fn site_key(&self) -> Site {
        self.site
    }
}
