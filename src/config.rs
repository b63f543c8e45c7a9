use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser::{FieldSelector, Readiness};
use crate::error::ConfigError;
use crate::models::Site;

const CHROME_91_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const CHROME_119_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// File stem looked up in the working directory (`product_lookup.toml`, `.yaml`, ...).
pub const CONFIG_FILE_STEM: &str = "product_lookup";
pub const ENV_PREFIX: &str = "PRODUCT_LOOKUP";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub active_site: String,
    pub sites: HashMap<String, SiteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    /// Search URL; `{query}` is replaced by the encoded query, or the query is appended.
    pub search_url: String,
    pub input_path: String,
    pub output_path: String,
    pub browser: BrowserSettings,
    pub navigation: NavigationSettings,
    #[serde(default)]
    pub rules: Vec<ExtractionRule>,
    #[serde(default)]
    pub redirect: Option<RedirectRule>,
    #[serde(default)]
    pub empty_state_selector: Option<String>,
    pub reject_query_echo: bool,
    pub normalize_codes: bool,
    pub repair_mojibake: bool,
    #[serde(default)]
    pub fallbacks: Vec<QueryFallback>,
    pub batch: BatchSettings,
    pub output: OutputSettings,
    #[serde(default)]
    pub shopping: Option<ShoppingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    #[serde(default)]
    pub args: Vec<String>,
    /// Default timeout for every browser command.
    pub request_timeout_ms: u64,
    pub launch_timeout_ms: u64,
}

impl BrowserSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationSettings {
    pub readiness: Readiness,
    pub timeout_ms: u64,
    pub settle_ms: u64,
}

impl NavigationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub selector: String,
    /// Zero means "query the current DOM once".
    pub timeout_ms: u64,
    #[serde(default)]
    pub label: Option<String>,
}

impl ExtractionRule {
    pub fn new(selector: &str, timeout_ms: u64) -> Self {
        Self {
            selector: selector.to_string(),
            timeout_ms,
            label: None,
        }
    }

    pub fn labeled(selector: &str, timeout_ms: u64, label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            ..Self::new(selector, timeout_ms)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.selector)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectRule {
    /// Regex matched against the URL after navigation.
    pub url_pattern: String,
    #[serde(default)]
    pub rules: Vec<ExtractionRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFallback {
    /// Retry with the trailing `count` characters when the query is longer than that.
    TrailingChars { count: usize, suffix: String },
}

impl QueryFallback {
    pub fn apply(&self, query: &str) -> Option<String> {
        match self {
            QueryFallback::TrailingChars { count, .. } => {
                let chars: Vec<char> = query.chars().collect();
                if chars.len() > *count {
                    Some(chars[chars.len() - count..].iter().collect())
                } else {
                    None
                }
            }
        }
    }

    pub fn suffix(&self) -> &str {
        match self {
            QueryFallback::TrailingChars { suffix, .. } => suffix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub fn secs(min: f64, max: f64) -> Self {
        Self {
            min_ms: (min * 1000.0) as u64,
            max_ms: (max * 1000.0) as u64,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max_ms == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    pub size: usize,
    pub query_delay: DelayRange,
    pub slice_delay: DelayRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLayout {
    Basic,
    Shopping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    pub layout: OutputLayout,
    /// Text written in the product column when nothing was found.
    #[serde(default)]
    pub not_found_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShoppingSettings {
    pub card_selector: String,
    pub title: FieldSelector,
    pub price: FieldSelector,
    pub store: FieldSelector,
    pub link: FieldSelector,
    pub result_limit: usize,
    #[serde(default)]
    pub consent_button_text: Option<String>,
    #[serde(default)]
    pub image: Option<ImageSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    pub search_url: String,
    pub selector: String,
    pub min_width: u32,
    pub wait_ms: u64,
    pub navigation_timeout_ms: u64,
    pub output_dir: String,
}

impl Config {
    /// Built-in presets, overlaid with `product_lookup.*` and `PRODUCT_LOOKUP__*`.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::defaults();
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name(CONFIG_FILE_STEM).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        for (key, site) in &config.sites {
            site.validate(key)?;
        }
        Ok(config)
    }

    pub fn site(&self, key: &str) -> Result<&SiteConfig, ConfigError> {
        self.sites
            .get(key)
            .ok_or_else(|| ConfigError::UnknownSite(key.to_string()))
    }

    pub fn defaults() -> Self {
        let mut sites = HashMap::new();

        sites.insert(
            Site::Petlove.key().to_string(),
            SiteConfig {
                name: "Petlove".to_string(),
                search_url: "https://www.petlove.com.br/busca?q={query}".to_string(),
                input_path: "~/Desktop/codigos_barras.txt".to_string(),
                output_path: "~/Desktop/resultados_petlove_otimizado.csv".to_string(),
                browser: BrowserSettings {
                    headless: true,
                    user_agent: CHROME_119_UA.to_string(),
                    viewport_width: 800,
                    viewport_height: 600,
                    args: vec![
                        "--disable-gpu".to_string(),
                        "--disable-dev-shm-usage".to_string(),
                        "--disable-extensions".to_string(),
                        "--log-level=3".to_string(),
                    ],
                    request_timeout_ms: 20_000,
                    launch_timeout_ms: 30_000,
                },
                navigation: NavigationSettings {
                    readiness: Readiness::DomContentLoaded,
                    timeout_ms: 15_000,
                    settle_ms: 800,
                },
                rules: vec![
                    ExtractionRule::new("h2.product-card__name", 0),
                    ExtractionRule::new("h1.product-name", 0),
                ],
                redirect: None,
                empty_state_selector: None,
                reject_query_echo: false,
                normalize_codes: false,
                repair_mojibake: true,
                fallbacks: vec![QueryFallback::TrailingChars {
                    count: 8,
                    suffix: " (reduzido)".to_string(),
                }],
                batch: BatchSettings {
                    size: 200,
                    query_delay: DelayRange::ZERO,
                    slice_delay: DelayRange::ZERO,
                },
                output: OutputSettings {
                    layout: OutputLayout::Basic,
                    not_found_text: "Não encontrado".to_string(),
                },
                shopping: None,
            },
        );

        sites.insert(
            Site::PetloveV2.key().to_string(),
            SiteConfig {
                name: "Petlove (EAN)".to_string(),
                search_url: "https://www.petlove.com.br/busca?q={query}".to_string(),
                input_path: "~/Desktop/EAN.txt".to_string(),
                output_path: "~/Desktop/results.csv".to_string(),
                browser: BrowserSettings {
                    headless: true,
                    user_agent: CHROME_91_UA.to_string(),
                    viewport_width: 720,
                    viewport_height: 1280,
                    args: Vec::new(),
                    request_timeout_ms: 30_000,
                    launch_timeout_ms: 60_000,
                },
                navigation: NavigationSettings {
                    readiness: Readiness::NetworkIdle,
                    timeout_ms: 25_000,
                    settle_ms: 0,
                },
                rules: vec![ExtractionRule::new("h2.product-card__name", 3_000)],
                redirect: None,
                empty_state_selector: Some("p.empty-state__title".to_string()),
                reject_query_echo: true,
                normalize_codes: true,
                repair_mojibake: false,
                fallbacks: Vec::new(),
                batch: BatchSettings {
                    size: 1000,
                    query_delay: DelayRange::ZERO,
                    slice_delay: DelayRange::secs(5.0, 10.0),
                },
                output: OutputSettings {
                    layout: OutputLayout::Basic,
                    not_found_text: String::new(),
                },
                shopping: None,
            },
        );

        sites.insert(
            Site::Cobasi.key().to_string(),
            SiteConfig {
                name: "Cobasi".to_string(),
                search_url: "https://www.cobasi.com.br/pesquisa?terms={query}".to_string(),
                input_path: "~/Desktop/codigos_barras.txt".to_string(),
                output_path: "~/Desktop/resultados_cobasi_async.csv".to_string(),
                browser: BrowserSettings {
                    headless: false,
                    user_agent: CHROME_91_UA.to_string(),
                    viewport_width: 1280,
                    viewport_height: 720,
                    args: vec![
                        "--disable-blink-features=AutomationControlled".to_string(),
                        "--start-maximized".to_string(),
                    ],
                    request_timeout_ms: 15_000,
                    launch_timeout_ms: 30_000,
                },
                navigation: NavigationSettings {
                    readiness: Readiness::DomContentLoaded,
                    timeout_ms: 8_000,
                    settle_ms: 0,
                },
                rules: vec![
                    ExtractionRule::labeled(
                        "h3.styles_Title-sc-3uf957-1",
                        2_000,
                        "current title class",
                    ),
                    ExtractionRule::labeled("h3[class*='Title-sc']", 2_000, "any Title-sc heading"),
                ],
                redirect: Some(RedirectRule {
                    url_pattern: "/p/".to_string(),
                    rules: [
                        "h1.product-name",
                        "h1[itemprop='name']",
                        ".product-name__title",
                        ".product-info__name",
                        "h1.title",
                        "h1.productName",
                    ]
                    .iter()
                    .map(|selector| ExtractionRule::new(selector, 0))
                    .collect(),
                }),
                empty_state_selector: None,
                reject_query_echo: false,
                normalize_codes: true,
                repair_mojibake: false,
                fallbacks: Vec::new(),
                batch: BatchSettings {
                    size: 20,
                    query_delay: DelayRange::secs(1.0, 3.0),
                    slice_delay: DelayRange::secs(3.0, 8.0),
                },
                output: OutputSettings {
                    layout: OutputLayout::Basic,
                    not_found_text: String::new(),
                },
                shopping: None,
            },
        );

        sites.insert(
            Site::GoogleShopping.key().to_string(),
            SiteConfig {
                name: "Google Shopping".to_string(),
                search_url: "https://www.google.com/search?tbm=shop&q={query}".to_string(),
                input_path: "~/Desktop/EAN.txt".to_string(),
                output_path: "~/Desktop/google_shopping_results.csv".to_string(),
                browser: BrowserSettings {
                    headless: true,
                    user_agent: CHROME_91_UA.to_string(),
                    viewport_width: 1280,
                    viewport_height: 800,
                    args: Vec::new(),
                    request_timeout_ms: 30_000,
                    launch_timeout_ms: 60_000,
                },
                navigation: NavigationSettings {
                    readiness: Readiness::NetworkIdle,
                    timeout_ms: 15_000,
                    settle_ms: 0,
                },
                rules: Vec::new(),
                redirect: None,
                empty_state_selector: None,
                reject_query_echo: false,
                normalize_codes: false,
                repair_mojibake: false,
                fallbacks: Vec::new(),
                batch: BatchSettings {
                    size: 10,
                    query_delay: DelayRange::secs(2.0, 4.0),
                    slice_delay: DelayRange::secs(10.0, 20.0),
                },
                output: OutputSettings {
                    layout: OutputLayout::Shopping,
                    not_found_text: "Não encontrado".to_string(),
                },
                shopping: Some(ShoppingSettings {
                    card_selector: "div.sh-dgr__content".to_string(),
                    title: FieldSelector::text("div.tol8Rb.OSrXXb h3"),
                    price: FieldSelector::text("span.a8Pemb"),
                    store: FieldSelector::text("div.IuHnof"),
                    link: FieldSelector::attribute("a[jsname=\"UWckNb\"]", "href"),
                    result_limit: 3,
                    consent_button_text: Some("Aceitar tudo".to_string()),
                    image: Some(ImageSettings {
                        search_url: "https://www.google.com/search?tbm=isch&q={query}".to_string(),
                        selector: "img.Q4LuWd".to_string(),
                        min_width: 300,
                        wait_ms: 5_000,
                        navigation_timeout_ms: 15_000,
                        output_dir: "~/Desktop/product_images".to_string(),
                    }),
                }),
            },
        );

        Config {
            active_site: Site::Petlove.key().to_string(),
            sites,
        }
    }
}

impl SiteConfig {
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            site: key.to_string(),
            message,
        };

        if self.batch.size == 0 {
            return Err(invalid("batch size must be at least 1".to_string()));
        }
        for (name, range) in [
            ("query_delay", self.batch.query_delay),
            ("slice_delay", self.batch.slice_delay),
        ] {
            if range.min_ms > range.max_ms {
                return Err(invalid(format!("{} min exceeds max", name)));
            }
        }
        if self.navigation.timeout_ms > self.browser.request_timeout_ms {
            return Err(invalid(
                "navigation timeout must not exceed the browser request timeout".to_string(),
            ));
        }
        url::Url::parse(&self.search_url.replace("{query}", ""))
            .map_err(|e| invalid(format!("search_url: {}", e)))?;

        let mut selectors: Vec<&str> = self.rules.iter().map(|r| r.selector.as_str()).collect();
        if let Some(redirect) = &self.redirect {
            regex::Regex::new(&redirect.url_pattern).map_err(|source| ConfigError::Pattern {
                site: key.to_string(),
                pattern: redirect.url_pattern.clone(),
                source,
            })?;
            selectors.extend(redirect.rules.iter().map(|r| r.selector.as_str()));
        }
        if let Some(empty) = &self.empty_state_selector {
            selectors.push(empty);
        }
        if let Some(shopping) = &self.shopping {
            selectors.push(&shopping.card_selector);
            for field in [&shopping.title, &shopping.price, &shopping.store, &shopping.link] {
                selectors.push(&field.selector);
            }
            if let Some(image) = &shopping.image {
                selectors.push(&image.selector);
            }
        } else if self.rules.is_empty() {
            return Err(invalid("at least one extraction rule is required".to_string()));
        }

        for selector in selectors {
            if scraper::Selector::parse(selector).is_err() {
                return Err(ConfigError::Selector {
                    site: key.to_string(),
                    selector: selector.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn input_path(&self) -> PathBuf {
        expand_home(&self.input_path)
    }

    pub fn output_path(&self) -> PathBuf {
        expand_home(&self.output_path)
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
