//! Knowledge domain types — stored items, stats and search shapes.
//!
//! These are the on-disk and on-the-wire records. The store and the
//! lexical search engine that operate on them live in `aenki-knowledge`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default similarity threshold for search.
pub const DEFAULT_THRESHOLD: f64 = 0.7;
/// Default number of search results.
pub const DEFAULT_LIMIT: usize = 5;
/// Hard cap on search results.
pub const MAX_LIMIT: usize = 50;
/// Default capacity of the store.
pub const DEFAULT_MAX_ITEMS: usize = 1000;
/// Default per-item content cap, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 10_000;

/// Metadata attached to a knowledge item. Recognized keys are
/// `source`, `type`, `timestamp`, `url`, `title` and `filename`.
pub type Metadata = BTreeMap<String, String>;

/// A single unit of stored text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// `kb_<unix-millis>_<9 base36 chars>`
    pub id: String,

    pub content: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Never generated or searched; preserved if present on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl KnowledgeItem {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.metadata.get("type").map(String::as_str)
    }

    /// The parsed `timestamp` metadata, if present and RFC 3339.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get("timestamp")
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Training counters persisted next to the items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stats {
    pub total_knowledge: usize,
    /// ISO-8601 time of the last successful insert
    pub last_update: Option<String>,
    pub training_count: u64,
}

/// Estimated in-memory footprint of the item collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub bytes: usize,
    /// Rounded to the nearest kibibyte
    pub kb: usize,
    /// Rounded to the nearest mebibyte
    pub mb: usize,
}

impl MemoryUsage {
    pub fn from_bytes(bytes: usize) -> Self {
        Self {
            bytes,
            kb: (bytes as f64 / 1024.0).round() as usize,
            mb: (bytes as f64 / (1024.0 * 1024.0)).round() as usize,
        }
    }
}

/// Snapshot returned by the store's stats operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    #[serde(flatten)]
    pub stats: Stats,
    pub current_items: usize,
    pub max_items: usize,
    pub memory: MemoryUsage,
}

/// Result of an insert. The item is in memory even when `persisted` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub id: String,
    pub total_knowledge: usize,
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

/// Optional metadata filters applied before truncation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default, rename = "dateFrom")]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default, rename = "dateTo")]
    pub date_to: Option<DateTime<Utc>>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.kind.is_none() && self.date_from.is_none() && self.date_to.is_none()
    }

    /// Whether an item passes every set filter. A date filter excludes
    /// items without a parseable timestamp.
    pub fn matches(&self, item: &KnowledgeItem) -> bool {
        if let Some(source) = &self.source {
            if item.source() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if item.kind() != Some(kind.as_str()) {
                return false;
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(ts) = item.timestamp() else {
                return false;
            };
            if self.date_from.is_some_and(|from| ts < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| ts > to) {
                return false;
            }
        }
        true
    }
}

/// A search request. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filters: SearchFilters,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Threshold clamped to `[0, 1]`; missing or non-finite falls back to the default.
    pub fn effective_threshold(&self) -> f64 {
        match self.threshold {
            Some(t) if t.is_finite() => t.clamp(0.0, 1.0),
            _ => DEFAULT_THRESHOLD,
        }
    }

    /// Limit clamped to `[1, MAX_LIMIT]`.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub similarity: f64,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    /// Number of results returned
    pub found: usize,
    /// Store size at query time
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with(meta: &[(&str, &str)]) -> KnowledgeItem {
        KnowledgeItem {
            id: "kb_1_abc".into(),
            content: "text".into(),
            metadata: meta.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            embedding: None,
        }
    }

    #[test]
    fn threshold_and_limit_are_clamped() {
        let q = SearchQuery::new("x").with_threshold(3.5).with_limit(500);
        assert_eq!(q.effective_threshold(), 1.0);
        assert_eq!(q.effective_limit(), MAX_LIMIT);

        let q = SearchQuery::new("x").with_threshold(-1.0).with_limit(0);
        assert_eq!(q.effective_threshold(), 0.0);
        assert_eq!(q.effective_limit(), 1);

        let q = SearchQuery::new("x").with_threshold(f64::NAN);
        assert_eq!(q.effective_threshold(), DEFAULT_THRESHOLD);
        assert_eq!(q.effective_limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn filters_match_source_and_type() {
        let item = item_with(&[("source", "url"), ("type", "web")]);
        let filters = SearchFilters { source: Some("url".into()), ..Default::default() };
        assert!(filters.matches(&item));
        let filters = SearchFilters { kind: Some("text".into()), ..Default::default() };
        assert!(!filters.matches(&item));
    }

    #[test]
    fn date_filter_excludes_unparseable_timestamps() {
        let item = item_with(&[("timestamp", "yesterday-ish")]);
        let filters = SearchFilters {
            date_from: Some(Utc::now() - chrono::Duration::days(30)),
            ..Default::default()
        };
        assert!(!filters.matches(&item));
        assert!(SearchFilters::default().matches(&item));
    }

    #[test]
    fn date_filter_bounds_are_inclusive() {
        let item = item_with(&[("timestamp", "2024-03-01T12:00:00Z")]);
        let ts = item.timestamp().unwrap();
        let filters = SearchFilters { date_from: Some(ts), date_to: Some(ts), ..Default::default() };
        assert!(filters.matches(&item));
    }

    #[test]
    fn embedding_is_omitted_when_absent() {
        let json = serde_json::to_string(&item_with(&[])).unwrap();
        assert!(!json.contains("embedding"));
        let with: KnowledgeItem =
            serde_json::from_str(r#"{"id":"kb_1","content":"c","metadata":{},"embedding":[0.5,1.0]}"#).unwrap();
        assert_eq!(with.embedding, Some(vec![0.5, 1.0]));
    }

    #[test]
    fn memory_usage_rounds_units() {
        let usage = MemoryUsage::from_bytes(1536);
        assert_eq!(usage.kb, 2);
        assert_eq!(usage.mb, 0);
        assert_eq!(MemoryUsage::from_bytes(3 * 1024 * 1024).mb, 3);
    }

    #[test]
    fn stats_use_camel_case() {
        let stats = Stats { total_knowledge: 3, last_update: None, training_count: 7 };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalKnowledge"], 3);
        assert_eq!(json["trainingCount"], 7);
        assert!(json["lastUpdate"].is_null());
    }
}
