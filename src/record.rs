use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder written into the name column when the title of a result could
/// not be found. The repair pipeline acts on this exact value and nothing else.
pub const SENTINEL_NAME: &str = "Nome não encontrado";

/// One scraped entity per result node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Display name. Never empty: either a real value or [`SENTINEL_NAME`].
    pub name: String,
    /// Canonical resource link of the result, when one was found.
    pub source_url: Option<String>,
    /// Opportunistic auxiliary fields (rating, reviews, details...).
    /// Missing fields are absent keys, never empty values.
    #[serde(default)]
    pub raw_fields: BTreeMap<String, String>,
}

impl CandidateRecord {
    /// Build a record from an extracted name. Returns `None` for a blank name
    /// so the non-empty invariant cannot be broken by callers.
    pub fn new(name: impl Into<String>, source_url: Option<String>) -> Option<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return None;
        }
        Some(Self {
            name,
            source_url,
            raw_fields: BTreeMap::new(),
        })
    }

    /// Record whose title was not found but which still carries a link the
    /// name can later be recovered from.
    pub fn sentinel(source_url: String) -> Self {
        Self {
            name: SENTINEL_NAME.to_string(),
            source_url: Some(source_url),
            raw_fields: BTreeMap::new(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        is_sentinel(&self.name)
    }

    /// Insert an auxiliary field, ignoring blank values.
    pub fn set_field(&mut self, key: &str, value: String) {
        if !value.trim().is_empty() {
            self.raw_fields.insert(key.to_string(), value);
        }
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.raw_fields.get(key).map(String::as_str)
    }

    /// Key used for session-level deduplication. Sentinel records share a
    /// name, so they are told apart by their link instead.
    pub fn dedup_key(&self) -> String {
        if self.is_sentinel() {
            format!("url:{}", self.source_url.as_deref().unwrap_or_default())
        } else {
            format!("name:{}", self.name)
        }
    }
}

/// Exact, case-sensitive sentinel check.
pub fn is_sentinel(name: &str) -> bool {
    name == SENTINEL_NAME
}
