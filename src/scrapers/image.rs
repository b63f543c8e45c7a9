use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{ImageCandidate, Readiness, SearchPage};
use crate::config::{expand_home, ImageSettings};
use crate::models::{EMOJI_FOLDER, EMOJI_WARNING};
use crate::scrapers::build_search_url;
use crate::storage::{decode_data_uri, ImageStore};
use crate::utils::http::{create_client, fetch_with_retry, RetryPolicy};

/// First candidate at least `min_width` wide that has a source.
pub fn pick_image(candidates: &[ImageCandidate], min_width: u32) -> Option<&str> {
    candidates.iter().find_map(|candidate| match (candidate.width, &candidate.src) {
        (Some(width), Some(src)) if width >= min_width && !src.trim().is_empty() => {
            Some(src.as_str())
        }
        _ => None,
    })
}

/// Finds a representative picture for a query on an image-search page and
/// stores it locally.
pub struct ImageFetcher {
    settings: ImageSettings,
    store: ImageStore,
    client: Client,
}

impl ImageFetcher {
    pub fn new(settings: ImageSettings, user_agent: &str) -> Result<Self> {
        let store = ImageStore::new(expand_home(&settings.output_dir));
        store
            .ensure_dir()
            .with_context(|| format!("Failed to create image folder {}", store.dir().display()))?;
        info!("{} Saving images to {}", EMOJI_FOLDER, store.dir().display());
        let client = create_client(user_agent)?;
        Ok(Self {
            settings,
            store,
            client,
        })
    }

    /// File name of the saved image, or `None` when nothing usable turned up.
    pub async fn acquire(&self, page: &dyn SearchPage, query: &str) -> Option<String> {
        match self.try_acquire(page, query).await {
            Ok(Some(name)) => {
                info!("{} Saved image {} for {}", EMOJI_FOLDER, name, query);
                Some(name)
            }
            Ok(None) => {
                debug!("No image wide enough for {}", query);
                None
            }
            Err(e) => {
                warn!("{} Image download failed for {}: {:#}", EMOJI_WARNING, query, e);
                None
            }
        }
    }

    async fn try_acquire(&self, page: &dyn SearchPage, query: &str) -> Result<Option<String>> {
        let url = build_search_url(&self.settings.search_url, query);
        let navigation_timeout = Duration::from_millis(self.settings.navigation_timeout_ms);
        timeout(
            navigation_timeout,
            page.navigate(&url, Readiness::DomContentLoaded, navigation_timeout),
        )
        .await
        .map_err(|_| anyhow!("image search timed out"))??;

        let wait = Duration::from_millis(self.settings.wait_ms);
        if page.wait_for(&self.settings.selector, wait).await.is_err() {
            return Ok(None);
        }

        let candidates = page.images(&self.settings.selector).await?;
        let Some(src) = pick_image(&candidates, self.settings.min_width) else {
            return Ok(None);
        };

        let bytes = match decode_data_uri(src) {
            Some(bytes) => bytes,
            None => self.download(page, src).await?,
        };

        let name = self
            .store
            .save(query, &bytes)
            .with_context(|| format!("Failed to write image into {}", self.store.dir().display()))?;
        Ok(Some(name))
    }

    async fn download(&self, page: &dyn SearchPage, src: &str) -> Result<Vec<u8>> {
        let absolute = match Url::parse(src) {
            Ok(url) => url,
            Err(_) => {
                let base = Url::parse(&page.current_url().await?)?;
                base.join(src)?
            }
        };
        if !matches!(absolute.scheme(), "http" | "https") {
            return Err(anyhow!("Unsupported image source: {}", absolute));
        }

        let response = fetch_with_retry(&self.client, absolute.as_str(), RetryPolicy::IMAGE).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
