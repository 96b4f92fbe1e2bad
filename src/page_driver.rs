//! Page driving for the map-search surface.
//!
//! The driver owns the browser for one search: open the page, type the
//! query, wait for results, scroll the feed to surface more of them and
//! snapshot the rendered result nodes. Everything after the snapshot is
//! pure HTML work handled by the extractor.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::Tab;
use scraper::{Html, Selector};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::browser_pool;
use crate::config::{BrowserConfig, SearchConfig};
use crate::extractor::ResultNode;
use crate::wait::{self, WaitBudget, WaitOutcome};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Search input '{selector}' not found")]
    SearchInputNotFound { selector: String },

    #[error("Page interaction failed: {0}")]
    Interaction(String),

    #[error("Failed to snapshot results: {0}")]
    Snapshot(String),

    #[error("Invalid result selector '{selector}': {error}")]
    InvalidSelector { selector: String, error: String },

    #[error("Search cancelled")]
    Cancelled,

    #[error("Browser task failed: {0}")]
    TaskFailed(String),
}

/// Per-run search parameters.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub base_url: String,
    pub search_input_selector: String,
    pub result_container_selector: String,
    pub result_selector: String,
    pub scroll_container_selector: String,
    pub input_timeout: Duration,
    pub results_timeout: Duration,
    pub poll_interval: Duration,
    pub scroll_rounds: usize,
    pub settle_delay: Duration,
    /// Stop scrolling once this many result nodes are present
    pub target_count: Option<usize>,
}

impl SearchOptions {
    pub fn from_config(cfg: &SearchConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            search_input_selector: cfg.search_input_selector.clone(),
            result_container_selector: cfg.result_container_selector.clone(),
            result_selector: cfg.result_selector.clone(),
            scroll_container_selector: cfg.scroll_container_selector.clone(),
            input_timeout: Duration::from_millis(cfg.input_timeout_ms),
            results_timeout: Duration::from_millis(cfg.results_timeout_ms),
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            scroll_rounds: cfg.scroll_rounds,
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            target_count: None,
        }
    }

    pub fn with_target_count(mut self, target: Option<usize>) -> Self {
        self.target_count = target;
        self
    }

    fn budget(&self, timeout: Duration) -> WaitBudget {
        WaitBudget {
            timeout,
            poll_interval: self.poll_interval.max(Duration::from_millis(1)),
        }
    }
}

/// What the driver observed while surfacing results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriverReport {
    pub page_url: String,
    /// Outcome of waiting for the result container; `None` if never reached
    pub results_wait: Option<WaitOutcome>,
    pub scroll_rounds: usize,
    /// Result count after each scroll round
    pub counts_per_round: Vec<usize>,
    pub nodes_found: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SearchSnapshot {
    pub nodes: Vec<ResultNode>,
    pub report: DriverReport,
}

/// A driver error together with what the driver observed before it.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct DriverFailure {
    pub error: DriverError,
    pub report: DriverReport,
}

impl From<DriverError> for DriverFailure {
    fn from(error: DriverError) -> Self {
        Self {
            error,
            report: DriverReport::default(),
        }
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Run one search and return the rendered result nodes in document order.
    async fn run_search(&self, query: &str, options: &SearchOptions) -> Result<SearchSnapshot, DriverFailure>;
}

/// Headless Chrome implementation. Browser work runs on a blocking thread.
pub struct ChromePageDriver {
    browser: BrowserConfig,
}

impl ChromePageDriver {
    pub fn new(browser: BrowserConfig) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl PageDriver for ChromePageDriver {
    async fn run_search(&self, query: &str, options: &SearchOptions) -> Result<SearchSnapshot, DriverFailure> {
        let browser = self.browser.clone();
        let options = options.clone();
        let query = query.to_string();

        tokio::task::spawn_blocking(move || drive_search(&browser, &query, &options))
            .await
            .map_err(|e| DriverError::TaskFailed(e.to_string()))?
    }
}

fn drive_search(browser: &BrowserConfig, query: &str, options: &SearchOptions) -> Result<SearchSnapshot, DriverFailure> {
    let started = Instant::now();
    let mut report = DriverReport {
        page_url: options.base_url.clone(),
        ..Default::default()
    };

    let outcome = drive_page(browser, query, options, &mut report);
    report.elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(nodes) => {
            report.nodes_found = nodes.len();
            Ok(SearchSnapshot { nodes, report })
        }
        Err(error) => Err(DriverFailure { error, report }),
    }
}

fn drive_page(
    browser: &BrowserConfig,
    query: &str,
    options: &SearchOptions,
    report: &mut DriverReport,
) -> Result<Vec<ResultNode>, DriverError> {
    let result_selector = compile_selector(&options.result_selector)?;
    let cancel = wait::interrupt_flag();

    let guard = browser_pool::create_browser(browser).map_err(|e| DriverError::Launch(e.to_string()))?;
    let tab = guard.browser.new_tab().map_err(|e| DriverError::Launch(format!("Failed to create tab: {}", e)))?;
    tab.set_default_timeout(Duration::from_secs(browser.navigation_timeout_secs));

    info!("Opening {}", options.base_url);
    tab.navigate_to(&options.base_url)
        .and_then(|t| t.wait_until_navigated())
        .map_err(|e| DriverError::Navigation {
            url: options.base_url.clone(),
            message: e.to_string(),
        })?;

    wait_for_search_input(&*tab, options, cancel)?;
    submit_query(&tab, query, options)?;
    await_results(&*tab, options, cancel, report)?;
    expand_results(&*tab, options, cancel, report)?;

    let html = tab.get_content().map_err(|e| DriverError::Snapshot(e.to_string()))?;
    let nodes = snapshot_nodes(&html, &result_selector);
    info!("Snapshot holds {} result nodes", nodes.len());

    if let Err(e) = tab.close(true) {
        debug!("Failed to close tab cleanly: {}", e);
    }

    Ok(nodes)
}

/// The page operations the wait and scroll loops depend on.
trait RenderedPage {
    fn has_element(&self, selector: &str) -> bool;

    /// Number of elements matching `selector`; evaluation errors count as zero.
    fn count(&self, selector: &str) -> usize;

    fn scroll_to_bottom(&self, container: &str) -> Result<(), DriverError>;
}

impl RenderedPage for Tab {
    fn has_element(&self, selector: &str) -> bool {
        self.find_element(selector).is_ok()
    }

    fn count(&self, selector: &str) -> usize {
        let script = format!("document.querySelectorAll({}).length", js_string(selector));
        self.evaluate(&script, false)
            .ok()
            .and_then(|r| r.value)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize
    }

    fn scroll_to_bottom(&self, container: &str) -> Result<(), DriverError> {
        let script = format!(
            "(function() {{ const el = document.querySelector({}); if (!el) {{ return false; }} el.scrollTop = el.scrollHeight; return true; }})()",
            js_string(container)
        );
        let result = self
            .evaluate(&script, false)
            .map_err(|e| DriverError::Interaction(format!("scrolling results: {}", e)))?;
        if result.value.and_then(|v| v.as_bool()) != Some(true) {
            debug!("Scroll container '{}' not present", container);
        }
        Ok(())
    }
}

fn wait_for_search_input<P: RenderedPage + ?Sized>(
    page: &P,
    options: &SearchOptions,
    cancel: &AtomicBool,
) -> Result<(), DriverError> {
    let selector = &options.search_input_selector;
    match wait::wait_until_with(options.budget(options.input_timeout), cancel, || page.has_element(selector)) {
        WaitOutcome::Satisfied => Ok(()),
        WaitOutcome::TimedOut => Err(DriverError::SearchInputNotFound {
            selector: selector.clone(),
        }),
        WaitOutcome::Cancelled => Err(DriverError::Cancelled),
    }
}

fn submit_query(tab: &Arc<Tab>, query: &str, options: &SearchOptions) -> Result<(), DriverError> {
    let selector = &options.search_input_selector;
    debug!("Typing query '{}'", query);
    let input = tab
        .find_element(selector)
        .map_err(|_| DriverError::SearchInputNotFound {
            selector: selector.clone(),
        })?;
    input
        .click()
        .map_err(|e| DriverError::Interaction(format!("click on search input: {}", e)))?;
    tab.type_str(query)
        .map_err(|e| DriverError::Interaction(format!("typing query: {}", e)))?;
    tab.press_key("Enter")
        .map_err(|e| DriverError::Interaction(format!("submitting query: {}", e)))?;
    Ok(())
}

/// Wait for the result container. A timeout is not fatal: the run proceeds
/// with whatever rendered.
fn await_results<P: RenderedPage + ?Sized>(
    page: &P,
    options: &SearchOptions,
    cancel: &AtomicBool,
    report: &mut DriverReport,
) -> Result<(), DriverError> {
    let outcome = wait::wait_until_with(options.budget(options.results_timeout), cancel, || {
        page.count(&options.result_container_selector) > 0
    });
    report.results_wait = Some(outcome);
    match outcome {
        WaitOutcome::Cancelled => return Err(DriverError::Cancelled),
        WaitOutcome::TimedOut => warn!(
            "No result container after {:?}, continuing with current page",
            options.results_timeout
        ),
        WaitOutcome::Satisfied => debug!("Result container present"),
    }
    Ok(())
}

/// Scroll the feed until it stops growing, the round limit is hit or the
/// target count is reached.
fn expand_results<P: RenderedPage + ?Sized>(
    page: &P,
    options: &SearchOptions,
    cancel: &AtomicBool,
    report: &mut DriverReport,
) -> Result<(), DriverError> {
    let mut count = page.count(&options.result_selector);
    let reached = |n: usize| options.target_count.is_some_and(|t| n >= t);

    for round in 1..=options.scroll_rounds {
        if reached(count) {
            debug!("Target count reached with {} results", count);
            break;
        }

        page.scroll_to_bottom(&options.scroll_container_selector)?;
        report.scroll_rounds = round;

        let before = count;
        let outcome = wait::wait_until_with(options.budget(options.settle_delay), cancel, || {
            count = page.count(&options.result_selector);
            count > before
        });
        report.counts_per_round.push(count);

        match outcome {
            WaitOutcome::Cancelled => return Err(DriverError::Cancelled),
            WaitOutcome::TimedOut => {
                debug!("Round {}: no new results ({} total), stopping", round, count);
                break;
            }
            WaitOutcome::Satisfied => debug!("Round {}: {} -> {} results", round, before, count),
        }
    }
    Ok(())
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn compile_selector(selector: &str) -> Result<Selector, DriverError> {
    Selector::parse(selector).map_err(|e| DriverError::InvalidSelector {
        selector: selector.to_string(),
        error: format!("{:?}", e),
    })
}

/// Result nodes of a rendered page, as outer HTML in document order.
pub fn snapshot_nodes(html: &str, result_selector: &Selector) -> Vec<ResultNode> {
    let document = Html::parse_document(html);
    document
        .select(result_selector)
        .enumerate()
        .map(|(index, el)| ResultNode::new(index, el.html()))
        .collect()
}
