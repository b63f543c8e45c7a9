use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use product_lookup::browser::{BrowserSession, ChromiumSession};
use product_lookup::config::Config;
use product_lookup::models::{
    Site, EMOJI_CHECK, EMOJI_CROSS, EMOJI_FILE, EMOJI_PAUSE, EMOJI_ROCKET, EMOJI_STOP,
    EMOJI_SUMMARY,
};
use product_lookup::runner::BatchRunner;
use product_lookup::scrapers::build_scraper;
use product_lookup::storage::{load_codes, CsvResultWriter};
use product_lookup::utils::delay::stop_channel;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("product_lookup=info".parse()?),
        )
        .init();

    let config = Config::load()?;
    let site_key = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.active_site.clone());
    let site = Site::from_key(&site_key).ok_or_else(|| anyhow!("Unknown site '{}'", site_key))?;
    let site_config = Arc::new(config.site(site.key())?.clone());

    info!("{} Starting {} lookup", EMOJI_ROCKET, site_config.name);

    let input_path = site_config.input_path();
    let queries = match load_codes(&input_path) {
        Ok(queries) => queries,
        Err(e) => {
            error!("{} {}", EMOJI_CROSS, e);
            return Ok(());
        }
    };
    if queries.is_empty() {
        warn!("Nothing to look up in {}", input_path.display());
        return Ok(());
    }

    let output_path = site_config.output_path();
    let sink = Arc::new(CsvResultWriter::new(&output_path, &site_config.output));
    let scraper = build_scraper(site, site_config.clone())?;

    let (stop_handle, stop) = stop_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("{} Interrupt received, finishing current query", EMOJI_PAUSE);
            stop_handle.stop();
        }
    });

    let session: Arc<dyn BrowserSession> =
        Arc::new(ChromiumSession::launch(&site_config.browser).await?);
    let runner = BatchRunner::new(Arc::from(scraper), session.clone(), sink, stop);

    let outcome = AssertUnwindSafe(runner.run(&queries)).catch_unwind().await;

    if let Err(e) = session.shutdown().await {
        warn!("Browser shutdown failed: {}", e);
    }
    info!("{} Browser closed", EMOJI_STOP);

    let summary = match outcome {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            error!("{} {}", EMOJI_CROSS, e);
            info!("{} Partial results saved to {}", EMOJI_FILE, output_path.display());
            return Ok(());
        }
        Err(_) => {
            error!("{} Pipeline panicked", EMOJI_CROSS);
            return Ok(());
        }
    };

    info!(
        "{} Done! {}/{} products found",
        EMOJI_CHECK, summary.found, summary.total
    );
    info!("{} Results saved to {}", EMOJI_FILE, output_path.display());
    info!(
        "{} {} processed, {}/{} slices completed{}",
        EMOJI_SUMMARY,
        summary.processed,
        summary.slices_completed,
        summary.slices_total,
        if summary.interrupted { ", interrupted" } else { "" }
    );

    Ok(())
}
