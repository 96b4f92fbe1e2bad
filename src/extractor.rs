//! Record extraction from rendered result nodes.
//!
//! Each result card is matched against a ranked list of selector strategies.
//! The first strategy that yields a usable name wins; the others are only
//! consulted when the ones before them come up empty. Strategies are data
//! (see `[[extractor.strategies]]` in the config file) so markup drift is
//! handled without touching this module.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ExtractorConfig, FieldConfig, MapperKind, StrategyConfig};
use crate::decoder::LinkPattern;
use crate::record::CandidateRecord;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Invalid selector '{selector}' for '{name}': {error}")]
    InvalidSelector {
        name: String,
        selector: String,
        error: String,
    },

    #[error("Invalid base URL '{0}'")]
    InvalidBaseUrl(String),

    #[error("Invalid link marker '{0}'")]
    InvalidLinkMarker(String),

    #[error("'{0}' uses the attribute mapper without naming an attribute")]
    MissingAttribute(String),
}

/// Outer HTML of one result node, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultNode {
    pub index: usize,
    pub html: String,
}

impl ResultNode {
    pub fn new(index: usize, html: impl Into<String>) -> Self {
        Self {
            index,
            html: html.into(),
        }
    }
}

/// How a matched element becomes a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapper {
    Text,
    Attribute(String),
    PlaceLink,
}

impl FieldMapper {
    fn from_config(owner: &str, kind: MapperKind, attribute: Option<&str>) -> Result<Self, ExtractorError> {
        match kind {
            MapperKind::Text => Ok(FieldMapper::Text),
            MapperKind::PlaceLink => Ok(FieldMapper::PlaceLink),
            MapperKind::Attribute => attribute
                .map(|a| FieldMapper::Attribute(a.to_string()))
                .ok_or_else(|| ExtractorError::MissingAttribute(owner.to_string())),
        }
    }
}

/// One ranked fallback for locating the name of a result.
#[derive(Debug, Clone)]
pub struct SelectorStrategy {
    pub name: String,
    pub selector: String,
    pub mapper: FieldMapper,
    compiled: Selector,
}

impl SelectorStrategy {
    pub fn new(name: &str, selector: &str, mapper: FieldMapper) -> Result<Self, ExtractorError> {
        Ok(Self {
            name: name.to_string(),
            selector: selector.to_string(),
            mapper,
            compiled: compile(name, selector)?,
        })
    }

    fn from_config(cfg: &StrategyConfig) -> Result<Self, ExtractorError> {
        let mapper = FieldMapper::from_config(&cfg.name, cfg.mapper, cfg.attribute.as_deref())?;
        Self::new(&cfg.name, &cfg.selector, mapper)
    }
}

/// Opportunistic auxiliary field (rating, reviews, details...).
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub key: String,
    pub mapper: FieldMapper,
    compiled: Selector,
}

impl FieldRule {
    pub fn new(key: &str, selector: &str, mapper: FieldMapper) -> Result<Self, ExtractorError> {
        Ok(Self {
            key: key.to_string(),
            mapper,
            compiled: compile(key, selector)?,
        })
    }

    fn from_config(cfg: &FieldConfig) -> Result<Self, ExtractorError> {
        let mapper = FieldMapper::from_config(&cfg.key, cfg.mapper, cfg.attribute.as_deref())?;
        Self::new(&cfg.key, &cfg.selector, mapper)
    }
}

/// What one strategy did for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorAttempt {
    pub strategy: String,
    /// Elements the selector matched inside the node
    pub matches: usize,
    /// Whether this strategy produced the accepted name
    pub accepted: bool,
}

/// Result of extracting one node, with the attempts that led to it.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: Option<CandidateRecord>,
    /// Name of the strategy that produced the name, if any
    pub strategy: Option<String>,
    pub attempts: Vec<SelectorAttempt>,
}

pub struct RecordExtractor {
    strategies: Vec<SelectorStrategy>,
    fields: Vec<FieldRule>,
    link_selector: Selector,
    link_pattern: LinkPattern,
    base_url: Option<Url>,
    min_name_length: usize,
    emit_sentinel_when_linked: bool,
}

impl RecordExtractor {
    pub fn new(strategies: Vec<SelectorStrategy>, link_selector: &str, link_pattern: LinkPattern) -> Result<Self, ExtractorError> {
        Ok(Self {
            strategies,
            fields: Vec::new(),
            link_selector: compile("link_selector", link_selector)?,
            link_pattern,
            base_url: None,
            min_name_length: 2,
            emit_sentinel_when_linked: false,
        })
    }

    /// Build the extractor described by the `[extractor]` config section.
    /// Relative links are resolved against `base_url`.
    pub fn from_config(cfg: &ExtractorConfig, base_url: &str) -> Result<Self, ExtractorError> {
        let strategies = cfg
            .strategies
            .iter()
            .map(SelectorStrategy::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let fields = cfg
            .fields
            .iter()
            .map(FieldRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let link_pattern = LinkPattern::new(&cfg.link_marker)
            .map_err(|_| ExtractorError::InvalidLinkMarker(cfg.link_marker.clone()))?;
        let base = Url::parse(base_url).map_err(|_| ExtractorError::InvalidBaseUrl(base_url.to_string()))?;

        Ok(Self::new(strategies, &cfg.link_selector, link_pattern)?
            .with_fields(fields)
            .with_base_url(base)
            .with_min_name_length(cfg.min_name_length)
            .with_sentinel_when_linked(cfg.emit_sentinel_when_linked))
    }

    pub fn with_fields(mut self, fields: Vec<FieldRule>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    pub fn with_min_name_length(mut self, min: usize) -> Self {
        self.min_name_length = min;
        self
    }

    pub fn with_sentinel_when_linked(mut self, enabled: bool) -> Self {
        self.emit_sentinel_when_linked = enabled;
        self
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    /// Extract a candidate record, or `None` when the node is not a valid
    /// result. `None` is a skip signal, not an error.
    pub fn extract(&self, node: &ResultNode) -> Option<CandidateRecord> {
        self.extract_with_attempts(node).record
    }

    pub fn extract_with_attempts(&self, node: &ResultNode) -> Extraction {
        let fragment = Html::parse_fragment(&node.html);
        let root = fragment.root_element();

        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut found: Option<(String, String)> = None;

        for strategy in &self.strategies {
            if found.is_some() {
                break;
            }
            let matched: Vec<ElementRef> = root.select(&strategy.compiled).collect();
            let value = matched
                .iter()
                .filter_map(|el| self.map_value(el, &strategy.mapper))
                .find(|v| self.is_acceptable(v));

            let accepted = value.is_some();
            attempts.push(SelectorAttempt {
                strategy: strategy.name.clone(),
                matches: matched.len(),
                accepted,
            });
            if let Some(value) = value {
                found = Some((value, strategy.name.clone()));
            }
        }

        let source_url = self.source_url(root);

        let (mut record, strategy) = match found {
            Some((name, strategy)) => (CandidateRecord::new(name, source_url), Some(strategy)),
            None => {
                let sentinel = match source_url {
                    Some(url) if self.emit_sentinel_when_linked => {
                        debug!("Node {}: no name strategy matched, emitting sentinel for {}", node.index, url);
                        Some(CandidateRecord::sentinel(url))
                    }
                    _ => None,
                };
                (sentinel, None)
            }
        };

        if let Some(record) = record.as_mut() {
            for rule in &self.fields {
                let value = root
                    .select(&rule.compiled)
                    .filter_map(|el| self.map_value(&el, &rule.mapper))
                    .find(|v| !v.is_empty());
                if let Some(value) = value {
                    record.set_field(&rule.key, value);
                }
            }
        } else {
            debug!("Node {}: no strategy yielded a name", node.index);
        }

        Extraction {
            record,
            strategy,
            attempts,
        }
    }

    fn map_value(&self, element: &ElementRef, mapper: &FieldMapper) -> Option<String> {
        let raw = match mapper {
            FieldMapper::Text => element.text().collect::<String>(),
            FieldMapper::Attribute(name) => element.value().attr(name)?.to_string(),
            FieldMapper::PlaceLink => {
                let href = element.value().attr("href")?;
                self.link_pattern.place_name(href)?
            }
        };
        let cleaned = clean_text(&raw);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    }

    fn is_acceptable(&self, value: &str) -> bool {
        value.chars().count() >= self.min_name_length
    }

    fn source_url(&self, root: ElementRef) -> Option<String> {
        let href = root
            .select(&self.link_selector)
            .filter_map(|el| el.value().attr("href"))
            .map(str::trim)
            .find(|href| !href.is_empty())?;

        match &self.base_url {
            Some(base) => match base.join(href) {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    warn!("Could not resolve link '{}': {}", href, e);
                    Some(href.to_string())
                }
            },
            None => Some(href.to_string()),
        }
    }
}

/// Trim and collapse runs of whitespace and control characters into a
/// single space.
pub fn clean_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() || ch.is_control() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    out
}

fn compile(name: &str, selector: &str) -> Result<Selector, ExtractorError> {
    Selector::parse(selector).map_err(|e| ExtractorError::InvalidSelector {
        name: name.to_string(),
        selector: selector.to_string(),
        error: format!("{:?}", e),
    })
}
