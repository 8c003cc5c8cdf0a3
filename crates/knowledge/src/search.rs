//! Lexical search — keyword containment scoring over stored items.
//!
//! Every item is scored on each query (linear scan). The score of an item
//! is the fraction of query terms that occur inside at least one of its
//! whitespace-separated words.

use aenki_core::knowledge::{KnowledgeItem, SearchHit, SearchQuery};

/// Curated suggestion vocabulary for `suggest()`.
const SUGGESTION_TERMS: &[&str] = &[
    "longevidad",
    "aging",
    "envejecimiento",
    "salud",
    "health",
    "nutrición",
    "nutrition",
    "ejercicio",
    "exercise",
    "suplementos",
    "supplements",
    "NAD+",
    "rapamycin",
    "metformin",
    "ayuno",
    "fasting",
    "telómeros",
    "telomeres",
    "mitocondrias",
    "mitochondria",
    "antioxidantes",
    "inflammation",
    "inflamación",
];

const MAX_SUGGESTIONS: usize = 10;

/// Lower-cased query terms longer than two characters.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(String::from)
        .collect()
}

/// Fraction of `terms` found inside some word of `content`.
///
/// `terms` must already be lower-cased. Returns 0.0 when `terms` is empty.
pub fn similarity(terms: &[String], content: &str) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let words: Vec<&str> = content.split_whitespace().collect();
    let matched = terms
        .iter()
        .filter(|term| words.iter().any(|w| w.contains(term.as_str())))
        .count();
    matched as f64 / terms.len() as f64
}

/// Score, filter and order `items` for `query`.
///
/// Results are sorted by descending similarity; ties keep the order of
/// `items`. A query with no usable terms matches nothing.
pub fn rank<'a, I>(items: I, query: &SearchQuery) -> Vec<SearchHit>
where
    I: IntoIterator<Item = &'a KnowledgeItem>,
{
    let terms = query_terms(&query.query);
    if terms.is_empty() {
        return Vec::new();
    }

    let threshold = query.effective_threshold();
    let mut hits: Vec<SearchHit> = items
        .into_iter()
        .filter(|item| query.filters.matches(item))
        .filter_map(|item| {
            let score = similarity(&terms, &item.content);
            (score >= threshold).then(|| SearchHit {
                id: item.id.clone(),
                content: item.content.clone(),
                similarity: score,
                metadata: item.metadata.clone(),
            })
        })
        .collect();

    // sort_by is stable
    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(query.effective_limit());
    hits
}

/// Up to ten curated terms containing `prefix`, case-insensitively.
/// A prefix shorter than two characters returns the first ten terms.
pub fn suggest(prefix: &str) -> Vec<String> {
    let prefix = prefix.trim().to_lowercase();
    if prefix.chars().count() < 2 {
        return SUGGESTION_TERMS
            .iter()
            .take(MAX_SUGGESTIONS)
            .map(|t| t.to_string())
            .collect();
    }
    SUGGESTION_TERMS
        .iter()
        .filter(|t| t.to_lowercase().contains(&prefix))
        .take(MAX_SUGGESTIONS)
        .map(|t| t.to_string())
        .collect()
}
