use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::browser::{BrowserSession, BrowsingContext};
use crate::config::BatchSettings;
use crate::error::PipelineError;
use crate::models::{
    Resolution, ResultRecord, EMOJI_BATCH, EMOJI_CROSS, EMOJI_PAUSE, EMOJI_SEARCH, EMOJI_WAIT,
    EMOJI_WARNING,
};
use crate::scrapers::ProductScraper;
use crate::storage::ResultSink;
use crate::utils::delay::{pick_delay, StopSignal};

/// Totals for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub found: usize,
    pub slices_completed: usize,
    pub slices_total: usize,
    pub interrupted: bool,
}

pub fn slice_count(total: usize, size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    (total + size - 1) / size
}

enum SliceEnd {
    Completed,
    Interrupted,
}

/// Processes queries slice by slice, one browsing context per slice.
pub struct BatchRunner {
    scraper: Arc<dyn ProductScraper>,
    session: Arc<dyn BrowserSession>,
    sink: Arc<dyn ResultSink>,
    batch: BatchSettings,
    stop: StopSignal,
}

impl BatchRunner {
    pub fn new(
        scraper: Arc<dyn ProductScraper>,
        session: Arc<dyn BrowserSession>,
        sink: Arc<dyn ResultSink>,
        stop: StopSignal,
    ) -> Self {
        let batch = scraper.site_config().batch.clone();
        Self {
            scraper,
            session,
            sink,
            batch,
            stop,
        }
    }

    pub fn with_batch(mut self, batch: BatchSettings) -> Self {
        self.batch = batch;
        self
    }

    pub async fn run(&self, queries: &[String]) -> Result<RunSummary, PipelineError> {
        let size = self.batch.size.max(1);
        let mut summary = RunSummary {
            total: queries.len(),
            slices_total: slice_count(queries.len(), size),
            ..RunSummary::default()
        };
        let mut records: Vec<ResultRecord> = Vec::with_capacity(queries.len());
        let started = Instant::now();
        info!(
            "{} {} queries for {} in {} slices of up to {}",
            EMOJI_BATCH,
            summary.total,
            self.scraper.site_key().key(),
            summary.slices_total,
            size
        );

        for (index, slice) in queries.chunks(size).enumerate() {
            if self.stop.is_stopped() {
                summary.interrupted = true;
                break;
            }

            info!(
                "{} Slice {}/{} ({} queries)",
                EMOJI_BATCH,
                index + 1,
                summary.slices_total,
                slice.len()
            );

            let context = match self.session.open_context().await {
                Ok(context) => context,
                Err(source) => {
                    error!("{} Could not open a browser context: {}", EMOJI_CROSS, source);
                    self.flush(&records);
                    return Err(PipelineError::Session {
                        batch: index + 1,
                        source,
                    });
                }
            };

            let end = self
                .run_slice(context.as_ref(), slice, queries.len(), &mut records)
                .await;
            if let Err(e) = context.close().await {
                warn!("{} Closing browser context failed: {}", EMOJI_WARNING, e);
            }
            self.flush(&records);

            if let SliceEnd::Interrupted = end {
                summary.interrupted = true;
                break;
            }
            summary.slices_completed += 1;

            if index + 1 < summary.slices_total {
                let delay = pick_delay(self.batch.slice_delay);
                if !delay.is_zero() {
                    info!("{} Waiting {:.1}s before next slice", EMOJI_WAIT, delay.as_secs_f64());
                }
                if self.stop.sleep(delay).await {
                    summary.interrupted = true;
                    break;
                }
            }
        }

        if summary.interrupted {
            info!("{} Stop requested, keeping {} results", EMOJI_PAUSE, records.len());
        }
        self.flush(&records);

        summary.processed = records.len();
        summary.found = records.iter().filter(|r| r.found).count();
        info!(
            "Processed {} queries in {:.1}s",
            summary.processed,
            started.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    async fn run_slice(
        &self,
        context: &dyn BrowsingContext,
        slice: &[String],
        total: usize,
        records: &mut Vec<ResultRecord>,
    ) -> SliceEnd {
        for (position, query) in slice.iter().enumerate() {
            if position > 0 && self.stop.sleep(pick_delay(self.batch.query_delay)).await {
                return SliceEnd::Interrupted;
            }
            if self.stop.is_stopped() {
                return SliceEnd::Interrupted;
            }

            info!("{} [{}/{}] Searching {}", EMOJI_SEARCH, records.len() + 1, total, query);
            let record = match AssertUnwindSafe(self.scraper.lookup(context.page(), query))
                .catch_unwind()
                .await
            {
                Ok(record) => record,
                Err(_) => {
                    error!("{} Lookup for {} panicked", EMOJI_CROSS, query);
                    ResultRecord::not_found(
                        query.as_str(),
                        Resolution::Failed {
                            class: "panic".to_string(),
                        },
                    )
                }
            };
            records.push(record);

            if let Err(e) = context.clear_cookies().await {
                warn!("{} Clearing cookies failed: {}", EMOJI_WARNING, e);
            }
        }
        SliceEnd::Completed
    }

    fn flush(&self, records: &[ResultRecord]) {
        if let Err(e) = self.sink.write_snapshot(records) {
            error!("{} Saving results failed: {}", EMOJI_CROSS, e);
        }
    }
}
