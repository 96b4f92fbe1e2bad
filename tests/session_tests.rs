//! Extraction sessions driven by an in-memory page driver.

mod common;

use std::sync::Mutex;

use async_trait::async_trait;
use common::fixtures::{default_config, load_fixture};
use mapleads::extractor::RecordExtractor;
use mapleads::page_driver::{
    snapshot_nodes, DriverError, DriverFailure, DriverReport, PageDriver, SearchOptions, SearchSnapshot,
};
use mapleads::wait::WaitOutcome;
use mapleads::session::ExtractionSession;
use scraper::Selector;

/// Serves a fixture page as if it had just been rendered.
struct FixtureDriver {
    html: String,
    seen_target: Mutex<Option<Option<usize>>>,
}

impl FixtureDriver {
    fn new(fixture: &str) -> Self {
        Self {
            html: load_fixture(fixture),
            seen_target: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PageDriver for FixtureDriver {
    async fn run_search(&self, _query: &str, options: &SearchOptions) -> Result<SearchSnapshot, DriverFailure> {
        *self.seen_target.lock().unwrap() = Some(options.target_count);
        let selector = Selector::parse(&options.result_selector).unwrap();
        let nodes = snapshot_nodes(&self.html, &selector);
        let report = DriverReport {
            page_url: options.base_url.clone(),
            nodes_found: nodes.len(),
            ..Default::default()
        };
        Ok(SearchSnapshot { nodes, report })
    }
}

/// Fails after the results wait and one scroll round, like a Ctrl+C
/// arriving mid-scroll.
struct CancelledDriver;

#[async_trait]
impl PageDriver for CancelledDriver {
    async fn run_search(&self, _query: &str, options: &SearchOptions) -> Result<SearchSnapshot, DriverFailure> {
        Err(DriverFailure {
            error: DriverError::Cancelled,
            report: DriverReport {
                page_url: options.base_url.clone(),
                results_wait: Some(WaitOutcome::Satisfied),
                scroll_rounds: 1,
                counts_per_round: vec![7],
                ..Default::default()
            },
        })
    }
}

struct NoInputDriver;

#[async_trait]
impl PageDriver for NoInputDriver {
    async fn run_search(&self, _query: &str, options: &SearchOptions) -> Result<SearchSnapshot, DriverFailure> {
        Err(DriverError::SearchInputNotFound {
            selector: options.search_input_selector.clone(),
        }
        .into())
    }
}

fn session<D: PageDriver>(driver: D, emit_sentinels: bool) -> ExtractionSession<D> {
    let mut config = default_config();
    config.extractor.emit_sentinel_when_linked = emit_sentinels;
    let extractor = RecordExtractor::from_config(&config.extractor, &config.search.base_url).unwrap();
    ExtractionSession::new(driver, extractor, SearchOptions::from_config(&config.search))
}

#[tokio::test]
async fn test_collects_distinct_records_and_counts_misses() {
    let session = session(FixtureDriver::new("html/results_page.html"), false);
    let outcome = session.run("padarias", 10).await.unwrap();

    let names: Vec<&str> = outcome.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Padaria Bella Paulista", "Café do Zé", "Confeitaria & Doces"]);

    let d = &outcome.diagnostics;
    assert_eq!(d.query, "padarias");
    assert_eq!(d.nodes_seen, 6);
    assert_eq!(d.records_yielded, 3);
    assert_eq!(d.duplicates, 1);
    assert_eq!(d.rejected, 2);
    assert_eq!(d.rejected_indices, vec![4, 5]);
    assert_eq!(d.rejections.len(), 2);
    assert_eq!(d.sentinel_records, 0);

    // The duplicate card still counts as a card_title hit.
    assert_eq!(d.strategy_hits.get("card_title"), Some(&2));
    assert_eq!(d.strategy_hits.get("aria_label"), Some(&1));
    assert_eq!(d.strategy_hits.get("place_link"), Some(&1));

    assert_eq!(d.empty_fields.get("details"), Some(&2));
    assert_eq!(d.empty_fields.get("rating"), Some(&1));
    assert_eq!(d.empty_fields.get("reviews"), Some(&1));

    let card_title = &d.selector_attempts["card_title"];
    assert_eq!(card_title.matched, 3);
    assert_eq!(card_title.missed, 3);
    assert_eq!(card_title.accepted, 2);

    assert_eq!(d.driver.as_ref().map(|r| r.nodes_found), Some(6));
}

#[tokio::test]
async fn test_result_cap_stops_early() {
    let session = session(FixtureDriver::new("html/results_page.html"), false);
    let outcome = session.run("padarias", 2).await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.diagnostics.nodes_seen, 2);
    assert_eq!(*session.driver().seen_target.lock().unwrap(), Some(Some(2)));
}

#[tokio::test]
async fn test_zero_cap_means_unbounded() {
    let session = session(FixtureDriver::new("html/results_page.html"), false);
    let outcome = session.run("padarias", 0).await.unwrap();

    assert_eq!(outcome.records.len(), 3);
    assert_eq!(*session.driver().seen_target.lock().unwrap(), Some(None));
}

#[tokio::test]
async fn test_sentinel_records_dedupe_by_link() {
    let session = session(FixtureDriver::new("html/unnamed_results.html"), true);
    let outcome = session.run("mercados", 10).await.unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.records.iter().all(|r| r.is_sentinel()));
    assert_eq!(outcome.diagnostics.sentinel_records, 2);
    assert_eq!(outcome.diagnostics.duplicates, 1);
}

#[tokio::test]
async fn test_driver_failure_keeps_partial_report() {
    let session = session(CancelledDriver, false);
    let err = session.run("padarias", 5).await.unwrap_err();

    assert!(matches!(err.source, DriverError::Cancelled));
    assert_eq!(err.diagnostics.query, "padarias");
    assert_eq!(err.diagnostics.nodes_seen, 0);

    let report = err.diagnostics.driver.expect("partial driver report");
    assert_eq!(report.results_wait, Some(WaitOutcome::Satisfied));
    assert_eq!(report.scroll_rounds, 1);
    assert_eq!(report.counts_per_round, vec![7]);
    assert_eq!(report.nodes_found, 0);
}

#[tokio::test]
async fn test_early_driver_failure_has_empty_report() {
    let session = session(NoInputDriver, false);
    let err = session.run("padarias", 5).await.unwrap_err();

    assert!(matches!(err.source, DriverError::SearchInputNotFound { .. }));
    let report = err.diagnostics.driver.expect("driver report");
    assert!(report.results_wait.is_none());
    assert!(report.counts_per_round.is_empty());
}
