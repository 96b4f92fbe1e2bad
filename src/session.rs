//! One extraction run: drive the page once, extract every node, dedupe and
//! cap the records, and account for everything that was skipped.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::extractor::{RecordExtractor, SelectorAttempt};
use crate::page_driver::{DriverError, DriverReport, PageDriver, SearchOptions};
use crate::record::CandidateRecord;

/// Session failure with whatever diagnostics were gathered before it.
#[derive(Error, Debug)]
#[error("Extraction session failed: {source}")]
pub struct SessionError {
    #[source]
    pub source: DriverError,
    pub diagnostics: Diagnostics,
}

/// Per-strategy match totals across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttemptStats {
    /// Nodes where the selector matched at least one element
    pub matched: usize,
    /// Nodes where the selector matched nothing
    pub missed: usize,
    /// Nodes where the strategy produced the accepted name
    pub accepted: usize,
}

/// A node the extractor could not turn into a record.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub index: usize,
    pub attempts: Vec<SelectorAttempt>,
    pub html: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub query: String,
    pub nodes_seen: usize,
    pub records_yielded: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub sentinel_records: usize,
    /// Nodes named by each strategy, duplicates included
    pub strategy_hits: BTreeMap<String, usize>,
    pub selector_attempts: BTreeMap<String, AttemptStats>,
    /// Records missing each auxiliary field
    pub empty_fields: BTreeMap<String, usize>,
    pub rejected_indices: Vec<usize>,
    #[serde(skip)]
    pub rejections: Vec<Rejection>,
    pub driver: Option<DriverReport>,
}

impl Diagnostics {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }

    fn record_attempts(&mut self, attempts: &[SelectorAttempt]) {
        for attempt in attempts {
            let stats = self.selector_attempts.entry(attempt.strategy.clone()).or_default();
            if attempt.matches > 0 {
                stats.matched += 1;
            } else {
                stats.missed += 1;
            }
            if attempt.accepted {
                stats.accepted += 1;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub records: Vec<CandidateRecord>,
    pub diagnostics: Diagnostics,
}

pub struct ExtractionSession<D: PageDriver> {
    driver: D,
    extractor: RecordExtractor,
    options: SearchOptions,
}

impl<D: PageDriver> ExtractionSession<D> {
    pub fn new(driver: D, extractor: RecordExtractor, options: SearchOptions) -> Self {
        Self {
            driver,
            extractor,
            options,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Run the search and collect up to `max_results` distinct records.
    /// `max_results == 0` means no cap.
    pub async fn run(&self, query: &str, max_results: usize) -> Result<SessionOutcome, SessionError> {
        let mut diagnostics = Diagnostics::new(query);
        let cap = (max_results > 0).then_some(max_results);
        let options = self.options.clone().with_target_count(cap);

        info!("Searching for '{}'", query);
        let snapshot = match self.driver.run_search(query, &options).await {
            Ok(snapshot) => snapshot,
            Err(failure) => {
                diagnostics.driver = Some(failure.report);
                return Err(SessionError {
                    source: failure.error,
                    diagnostics,
                });
            }
        };
        diagnostics.driver = Some(snapshot.report);

        let field_keys: Vec<String> = self.extractor.field_keys().map(str::to_string).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut records = Vec::new();

        for node in &snapshot.nodes {
            if cap.is_some_and(|c| records.len() >= c) {
                debug!("Reached {} records, ignoring remaining nodes", records.len());
                break;
            }
            diagnostics.nodes_seen += 1;

            let extraction = self.extractor.extract_with_attempts(node);
            diagnostics.record_attempts(&extraction.attempts);

            let Some(record) = extraction.record else {
                diagnostics.rejected += 1;
                diagnostics.rejected_indices.push(node.index);
                diagnostics.rejections.push(Rejection {
                    index: node.index,
                    attempts: extraction.attempts,
                    html: node.html.clone(),
                });
                continue;
            };

            if let Some(strategy) = extraction.strategy {
                *diagnostics.strategy_hits.entry(strategy).or_default() += 1;
            }

            if !seen.insert(record.dedup_key()) {
                debug!("Duplicate '{}' at node {}", record.name, node.index);
                diagnostics.duplicates += 1;
                continue;
            }
            if record.is_sentinel() {
                diagnostics.sentinel_records += 1;
            }
            for key in &field_keys {
                if record.field(key).is_none() {
                    *diagnostics.empty_fields.entry(key.clone()).or_default() += 1;
                }
            }
            records.push(record);
        }

        diagnostics.records_yielded = records.len();
        info!(
            "Collected {} records from {} nodes ({} rejected, {} duplicates)",
            diagnostics.records_yielded, diagnostics.nodes_seen, diagnostics.rejected, diagnostics.duplicates
        );

        Ok(SessionOutcome { records, diagnostics })
    }
}
