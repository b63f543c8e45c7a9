mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{site_config, PageScript, ScriptedPage};
use product_lookup::browser::ImageCandidate;
use product_lookup::config::SiteConfig;
use product_lookup::models::{Resolution, Site};
use product_lookup::scrapers::{build_search_url, ProductScraper, ShoppingScraper};

const QUERY: &str = "Ração Golden Adulto";

fn shopping_config(image_dir: &std::path::Path) -> SiteConfig {
    let mut config = site_config(Site::GoogleShopping);
    if let Some(image) = config.shopping.as_mut().and_then(|s| s.image.as_mut()) {
        image.output_dir = image_dir.to_string_lossy().to_string();
    }
    config
}

fn image_search_url(config: &SiteConfig) -> String {
    let image = config.shopping.as_ref().unwrap().image.as_ref().unwrap();
    build_search_url(&image.search_url, QUERY)
}

fn card(title: Option<&str>, price: &str, store: &str, link: &str) -> Vec<Option<String>> {
    vec![
        title.map(str::to_string),
        Some(price.to_string()),
        Some(store.to_string()),
        Some(link.to_string()),
    ]
}

#[tokio::test]
async fn first_titled_card_and_image_are_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/golden.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = shopping_config(dir.path());
    let page = ScriptedPage::new()
        .route(
            &build_search_url(&config.search_url, QUERY),
            PageScript {
                consent_button: true,
                cards: vec![
                    card(None, "R$ 10,00", "Sem título", "https://a.example"),
                    card(Some("Ração Golden Adulto 15kg"), "R$ 199,90", "Petz", "https://petz.example/golden"),
                    card(Some("Outro"), "R$ 1,00", "Loja", "https://b.example"),
                ],
                ..PageScript::default()
            },
        )
        .route(
            &image_search_url(&config),
            PageScript {
                images: vec![
                    ImageCandidate {
                        width: Some(120),
                        src: Some(format!("{}/images/thumb.jpg", server.uri())),
                    },
                    ImageCandidate {
                        width: Some(480),
                        src: Some(format!("{}/images/golden.jpg", server.uri())),
                    },
                ],
                ..PageScript::default()
            }
            .with_element("img.Q4LuWd", ""),
        );
    let scraper = ShoppingScraper::new(Site::GoogleShopping, Arc::new(config)).unwrap();

    let record = scraper.lookup(&page, QUERY).await;

    assert!(record.found);
    assert_eq!(record.found_text.as_deref(), Some("Ração Golden Adulto 15kg"));
    assert_eq!(record.details.price.as_deref(), Some("R$ 199,90"));
    assert_eq!(record.details.store.as_deref(), Some("Petz"));
    assert_eq!(record.details.link.as_deref(), Some("https://petz.example/golden"));
    assert_eq!(page.clicks.load(std::sync::atomic::Ordering::SeqCst), 1);

    let image = record.details.image.expect("image saved");
    assert_eq!(std::fs::read(dir.path().join(&image)).unwrap(), b"jpeg bytes");
}

#[tokio::test]
async fn inline_image_is_decoded_without_a_request() {
    let dir = tempfile::tempdir().unwrap();
    let config = shopping_config(dir.path());
    let page = ScriptedPage::new()
        .route(
            &build_search_url(&config.search_url, QUERY),
            PageScript {
                cards: vec![card(Some("Golden"), "R$ 5,00", "Loja", "https://l.example")],
                ..PageScript::default()
            },
        )
        .route(
            &image_search_url(&config),
            PageScript {
                images: vec![ImageCandidate {
                    width: Some(300),
                    // "hello"
                    src: Some("data:image/jpeg;base64,aGVsbG8=".to_string()),
                }],
                ..PageScript::default()
            }
            .with_element("img.Q4LuWd", ""),
        );
    let scraper = ShoppingScraper::new(Site::GoogleShopping, Arc::new(config)).unwrap();

    let record = scraper.lookup(&page, QUERY).await;

    let image = record.details.image.expect("image saved");
    assert_eq!(std::fs::read(dir.path().join(image)).unwrap(), b"hello");
}

#[tokio::test]
async fn no_cards_means_not_found_and_no_image_search() {
    let dir = tempfile::tempdir().unwrap();
    let config = shopping_config(dir.path());
    let page = ScriptedPage::new();
    let scraper = ShoppingScraper::new(Site::GoogleShopping, Arc::new(config)).unwrap();

    let record = scraper.lookup(&page, QUERY).await;

    assert!(!record.found);
    assert_eq!(record.resolution, Resolution::Exhausted);
    assert_eq!(record.details.image, None);
    assert_eq!(page.visited().len(), 1);
}

#[tokio::test]
async fn missing_image_leaves_the_column_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = shopping_config(dir.path());
    let page = ScriptedPage::new().route(
        &build_search_url(&config.search_url, QUERY),
        PageScript {
            cards: vec![card(Some("Golden"), "R$ 5,00", "Loja", "https://l.example")],
            ..PageScript::default()
        },
    );
    let scraper = ShoppingScraper::new(Site::GoogleShopping, Arc::new(config)).unwrap();

    let record = scraper.lookup(&page, QUERY).await;

    assert!(record.found);
    assert_eq!(record.details.image, None);
    assert_eq!(page.visited().len(), 2);
}
