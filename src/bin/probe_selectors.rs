use anyhow::{bail, Context, Result};
use product_lookup::config::Config;
use product_lookup::models::Site;
use product_lookup::scrapers::build_search_url;
use product_lookup::utils::http::{create_client, fetch_with_retry, RetryPolicy};
use scraper::{Html, Selector};
use std::fs;

/// Fetches a site's search page without a browser and reports how many
/// elements each configured selector matches. Script-rendered pages will
/// show zero matches; the saved sample shows what the server sent.
#[tokio::main]
async fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(site_key), Some(query)) = (args.next(), args.next()) else {
        bail!("usage: probe_selectors SITE QUERY");
    };
    if Site::from_key(&site_key).is_none() {
        bail!("unknown site '{}'", site_key);
    }

    let config = Config::load()?;
    let site = config.site(&site_key)?;
    let client = create_client(&site.browser.user_agent)?;

    let url = build_search_url(&site.search_url, &query);
    println!("Fetching {}...", url);
    let html = fetch_with_retry(&client, &url, RetryPolicy::PAGE).await?.text().await?;

    let sample = format!("{}_sample.html", site_key);
    fs::write(&sample, &html).with_context(|| format!("Failed to write {}", sample))?;
    println!("Saved {} bytes to {}", html.len(), sample);

    let document = Html::parse_document(&html);
    let mut selectors: Vec<(&str, &str)> = site
        .rules
        .iter()
        .map(|rule| ("rule", rule.selector.as_str()))
        .collect();
    if let Some(redirect) = &site.redirect {
        selectors.extend(redirect.rules.iter().map(|rule| ("redirect", rule.selector.as_str())));
    }
    if let Some(empty) = &site.empty_state_selector {
        selectors.push(("empty state", empty.as_str()));
    }
    if let Some(shopping) = &site.shopping {
        selectors.push(("card", shopping.card_selector.as_str()));
        for field in [&shopping.title, &shopping.price, &shopping.store, &shopping.link] {
            selectors.push(("field", field.selector.as_str()));
        }
    }

    for (kind, selector_str) in selectors {
        match Selector::parse(selector_str) {
            Ok(selector) => {
                let count = document.select(&selector).count();
                println!("{:<12} '{}' matched {} elements", kind, selector_str, count);
            }
            Err(e) => println!("{:<12} '{}' does not parse: {:?}", kind, selector_str, e),
        }
    }

    Ok(())
}
