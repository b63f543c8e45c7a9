use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::{FieldSelector, SearchPage};
use crate::config::{ShoppingSettings, SiteConfig};
use crate::error::{ConfigError, PageError};
use crate::models::{
    RecordDetails, Resolution, ResultRecord, Site, EMOJI_CHECK, EMOJI_CROSS, EMOJI_WARNING,
};
use crate::parsers::clean_text;
use crate::scrapers::{build_search_url, ImageFetcher, ProductScraper};

const CONSENT_TIMEOUT: Duration = Duration::from_secs(2);

/// One product card as read from the results grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShoppingCard {
    pub title: Option<String>,
    pub price: Option<String>,
    pub store: Option<String>,
    pub link: Option<String>,
}

impl ShoppingCard {
    fn from_fields(fields: Vec<Option<String>>) -> Self {
        let mut values = fields.into_iter().map(|value| {
            value
                .map(|v| clean_text(&v))
                .filter(|v| !v.is_empty())
        });
        Self {
            title: values.next().flatten(),
            price: values.next().flatten(),
            store: values.next().flatten(),
            link: values.next().flatten(),
        }
    }
}

/// Product-name search on a shopping results grid, plus an optional picture.
pub struct ShoppingScraper {
    site: Site,
    config: Arc<SiteConfig>,
    shopping: ShoppingSettings,
    images: Option<ImageFetcher>,
}

impl ShoppingScraper {
    pub fn new(site: Site, config: Arc<SiteConfig>) -> Result<Self, ConfigError> {
        let shopping = settings_of(&config)?.clone();
        let images = match &shopping.image {
            Some(image) => Some(
                ImageFetcher::new(image.clone(), &config.browser.user_agent).map_err(|e| {
                    ConfigError::Invalid {
                        site: config.name.clone(),
                        message: format!("image client: {:#}", e),
                    }
                })?,
            ),
            None => None,
        };
        Ok(Self {
            site,
            config,
            shopping,
            images,
        })
    }

    /// Cards of the results grid, first `result_limit` only.
    pub async fn search(
        &self,
        page: &dyn SearchPage,
        query: &str,
    ) -> Result<Vec<ShoppingCard>, PageError> {
        let shopping = &self.shopping;
        let navigation = &self.config.navigation;
        let url = build_search_url(&self.config.search_url, query);

        timeout(
            navigation.timeout(),
            page.navigate(&url, navigation.readiness, navigation.timeout()),
        )
        .await
        .map_err(|_| PageError::Timeout {
            operation: "navigation",
            after: navigation.timeout(),
        })??;

        if let Some(text) = &shopping.consent_button_text {
            match timeout(CONSENT_TIMEOUT, page.click_with_text("button", text)).await {
                Ok(Ok(true)) => debug!("Dismissed consent dialog"),
                Ok(Ok(false)) | Err(_) => {}
                Ok(Err(e)) => debug!("Consent click failed: {}", e),
            }
        }

        let fields: [FieldSelector; 4] = [
            shopping.title.clone(),
            shopping.price.clone(),
            shopping.store.clone(),
            shopping.link.clone(),
        ];
        let rows = page
            .card_fields(&shopping.card_selector, &fields, shopping.result_limit)
            .await?;
        Ok(rows.into_iter().map(ShoppingCard::from_fields).collect())
    }
}

fn settings_of(config: &SiteConfig) -> Result<&ShoppingSettings, ConfigError> {
    config.shopping.as_ref().ok_or_else(|| ConfigError::Invalid {
        site: config.name.clone(),
        message: "shopping layout needs shopping settings".to_string(),
    })
}

#[async_trait]
impl ProductScraper for ShoppingScraper {
    async fn lookup(&self, page: &dyn SearchPage, query: &str) -> ResultRecord {
        let query = query.trim();
        let cards = match self.search(page, query).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!("{} Search for {} failed: {}", EMOJI_WARNING, query, e);
                return ResultRecord::not_found(
                    query,
                    Resolution::NavigationFailed {
                        class: e.class().to_string(),
                    },
                );
            }
        };

        let Some(card) = cards.into_iter().find(|card| card.title.is_some()) else {
            info!("{} {}: no product cards", EMOJI_CROSS, query);
            return ResultRecord::not_found(query, Resolution::Exhausted);
        };
        let title = card.title.clone().unwrap_or_default();
        info!("{} {} -> {}", EMOJI_CHECK, query, title);

        let image = match &self.images {
            Some(images) => images.acquire(page, query).await,
            None => None,
        };

        ResultRecord::found(
            query,
            title,
            Resolution::Matched {
                rule: self.shopping.card_selector.clone(),
            },
        )
        .with_details(RecordDetails {
            price: card.price,
            store: card.store,
            link: card.link,
            image,
        })
    }

    fn site_config(&self) -> &SiteConfig {
        &self.config
    }

    fn site_key(&self) -> Site {
        self.site
    }
}
