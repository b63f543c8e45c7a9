mod common;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::{site_config, FakeSession, RecordingSink, ScriptedPage, SessionCounters};
use product_lookup::browser::SearchPage;
use product_lookup::config::{BatchSettings, DelayRange, SiteConfig};
use product_lookup::error::PipelineError;
use product_lookup::models::{Resolution, ResultRecord, Site};
use product_lookup::runner::{BatchRunner, RunSummary};
use product_lookup::scrapers::ProductScraper;
use product_lookup::utils::delay::{stop_channel, StopHandle, StopSignal};

/// Finds anything starting with "789"; panics on "boom".
struct FakeScraper {
    config: SiteConfig,
    stop_on: Option<(String, StopHandle)>,
}

impl FakeScraper {
    fn new() -> Self {
        Self {
            config: site_config(Site::Petlove),
            stop_on: None,
        }
    }

    /// Requests a stop while `query` is being looked up, as Ctrl-C would.
    fn stopping_on(query: &str, handle: StopHandle) -> Self {
        Self {
            stop_on: Some((query.to_string(), handle)),
            ..Self::new()
        }
    }
}

#[async_trait]
impl ProductScraper for FakeScraper {
    async fn lookup(&self, _page: &dyn SearchPage, query: &str) -> ResultRecord {
        if let Some((trigger, handle)) = &self.stop_on {
            if trigger == query {
                handle.stop();
            }
        }
        if query == "boom" {
            panic!("selector engine exploded");
        }
        if query.starts_with("789") {
            ResultRecord::found(
                query,
                format!("Produto {}", query),
                Resolution::Matched {
                    rule: "fake".to_string(),
                },
            )
        } else {
            ResultRecord::not_found(query, Resolution::Exhausted)
        }
    }

    fn site_config(&self) -> &SiteConfig {
        &self.config
    }

    fn site_key(&self) -> Site {
        Site::Petlove
    }
}

fn batch(size: usize) -> BatchSettings {
    BatchSettings {
        size,
        query_delay: DelayRange::ZERO,
        slice_delay: DelayRange::ZERO,
    }
}

fn queries(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("789{:04}", i)).collect()
}

struct Harness {
    runner: BatchRunner,
    session: Arc<FakeSession>,
    sink: Arc<RecordingSink>,
}

fn harness(size: usize, session: FakeSession, sink: RecordingSink, stop: StopSignal) -> Harness {
    harness_with(FakeScraper::new(), size, session, sink, stop)
}

fn harness_with(
    scraper: FakeScraper,
    size: usize,
    session: FakeSession,
    sink: RecordingSink,
    stop: StopSignal,
) -> Harness {
    let session = Arc::new(session);
    let sink = Arc::new(sink);
    let runner = BatchRunner::new(Arc::new(scraper), session.clone(), sink.clone(), stop)
        .with_batch(batch(size));
    Harness {
        runner,
        session,
        sink,
    }
}

fn fake_session() -> FakeSession {
    FakeSession::new(Arc::new(ScriptedPage::new()))
}

#[tokio::test]
async fn seven_queries_in_slices_of_three() {
    let h = harness(3, fake_session(), RecordingSink::new(), StopSignal::never());

    let summary = h.runner.run(&queries(7)).await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            total: 7,
            processed: 7,
            found: 7,
            slices_completed: 3,
            slices_total: 3,
            interrupted: false,
        }
    );
    // One write per slice plus the final one.
    assert_eq!(h.sink.writes(), 4);
    let sizes: Vec<usize> = h.sink.snapshots.lock().unwrap().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![3, 6, 7, 7]);

    let counters = &h.session.counters;
    assert_eq!(SessionCounters::get(&counters.opened), 3);
    assert_eq!(SessionCounters::get(&counters.closed), 3);
    assert_eq!(SessionCounters::get(&counters.cookies_cleared), 7);
}

#[tokio::test]
async fn records_keep_input_order() {
    let h = harness(2, fake_session(), RecordingSink::new(), StopSignal::never());
    let input = vec![
        "7891".to_string(),
        "0001".to_string(),
        "7892".to_string(),
        "0002".to_string(),
        "7893".to_string(),
    ];

    let summary = h.runner.run(&input).await.unwrap();

    let written: Vec<String> = h.sink.last().into_iter().map(|r| r.query).collect();
    assert_eq!(written, input);
    assert_eq!(summary.found, 3);
}

#[tokio::test]
async fn interrupt_after_second_slice_keeps_exactly_two_slices() {
    let (handle, stop) = stop_channel();
    let h = harness(2, fake_session(), RecordingSink::stopping_after(2, handle), stop);

    let summary = h.runner.run(&queries(10)).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.slices_completed, 2);
    assert_eq!(summary.slices_total, 5);
    assert_eq!(summary.processed, 4);

    let last = h.sink.last();
    let written: Vec<&str> = last.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(written, vec!["7890000", "7890001", "7890002", "7890003"]);
    assert_eq!(SessionCounters::get(&h.session.counters.opened), 2);
}

#[tokio::test]
async fn interrupt_inside_a_slice_keeps_its_finished_queries() {
    let (handle, stop) = stop_channel();
    let input = queries(7);
    let scraper = FakeScraper::stopping_on(&input[4], handle);
    let h = harness_with(scraper, 3, fake_session(), RecordingSink::new(), stop);

    let summary = h.runner.run(&input).await.unwrap();

    assert_eq!(
        summary,
        RunSummary {
            total: 7,
            processed: 5,
            found: 5,
            slices_completed: 1,
            slices_total: 3,
            interrupted: true,
        }
    );
    // Slice 1, the partial slice 2, then the final write.
    assert_eq!(h.sink.writes(), 3);
    let written: Vec<String> = h.sink.last().into_iter().map(|r| r.query).collect();
    assert_eq!(written, input[..5].to_vec());

    let counters = &h.session.counters;
    assert_eq!(SessionCounters::get(&counters.opened), 2);
    assert_eq!(SessionCounters::get(&counters.closed), 2);
    assert_eq!(SessionCounters::get(&counters.cookies_cleared), 5);
}

#[tokio::test]
async fn stop_before_start_writes_an_empty_snapshot() {
    let (handle, stop) = stop_channel();
    handle.stop();
    let h = harness(3, fake_session(), RecordingSink::new(), stop);

    let summary = h.runner.run(&queries(5)).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.processed, 0);
    assert_eq!(h.sink.writes(), 1);
    assert!(h.sink.last().is_empty());
    assert_eq!(SessionCounters::get(&h.session.counters.opened), 0);
}

#[tokio::test]
async fn panicking_lookup_is_recorded_and_the_run_continues() {
    let h = harness(5, fake_session(), RecordingSink::new(), StopSignal::never());
    let input = vec!["7891".to_string(), "boom".to_string(), "7892".to_string()];

    let summary = h.runner.run(&input).await.unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.found, 2);
    let failed = &h.sink.last()[1];
    assert!(!failed.found);
    assert_eq!(
        failed.resolution,
        Resolution::Failed {
            class: "panic".to_string()
        }
    );
}

#[tokio::test]
async fn context_failure_flushes_and_surfaces_a_session_error() {
    let h = harness(
        2,
        fake_session().failing_open_at(2),
        RecordingSink::new(),
        StopSignal::never(),
    );

    let result = h.runner.run(&queries(6)).await;

    match result {
        Err(PipelineError::Session { batch, .. }) => assert_eq!(batch, 2),
        other => panic!("expected a session error, got {:?}", other),
    }
    // Slice 1 flush, then the flush before giving up.
    assert_eq!(h.sink.writes(), 2);
    assert_eq!(h.sink.last().len(), 2);
}

#[tokio::test]
async fn empty_input_still_writes_a_header_only_snapshot() {
    let h = harness(3, fake_session(), RecordingSink::new(), StopSignal::never());

    let summary = h.runner.run(&[]).await.unwrap();

    assert_eq!(summary.slices_total, 0);
    assert_eq!(h.sink.writes(), 1);
}
