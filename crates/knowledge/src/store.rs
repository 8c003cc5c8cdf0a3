//! File-backed knowledge store — a bounded FIFO collection persisted as JSON.
//!
//! Storage location: `<data_dir>/knowledge.json` (array of items) and
//! `<data_dir>/stats.json` (training counters).
//!
//! Items are loaded into memory on open and written wholesale on every
//! insert. Each write goes to a sibling temp file which is then renamed
//! over the target, so a crash never leaves a half-written artifact.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use aenki_core::error::KnowledgeError;
use aenki_core::knowledge::{
    DEFAULT_MAX_CONTENT_CHARS, DEFAULT_MAX_ITEMS, InsertOutcome, KnowledgeItem, KnowledgeStats, MemoryUsage,
    Metadata, SearchOutcome, SearchQuery, Stats,
};
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::search;

pub const KNOWLEDGE_FILE: &str = "knowledge.json";
pub const STATS_FILE: &str = "stats.json";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Where the store lives and how big it may grow.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub data_dir: PathBuf,
    pub max_items: usize,
    pub max_content_chars: usize,
}

impl StoreOptions {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            max_items: DEFAULT_MAX_ITEMS,
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
        }
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub fn max_content_chars(mut self, max_content_chars: usize) -> Self {
        self.max_content_chars = max_content_chars.max(1);
        self
    }
}

struct StoreState {
    items: VecDeque<KnowledgeItem>,
    stats: Stats,
}

/// The knowledge store. Owns items and stats exclusively.
///
/// Inserts hold the write lock across mutation and persistence, so
/// concurrent inserts never lose each other's updates. Searches and stats
/// take the read lock.
pub struct KnowledgeStore {
    data_dir: PathBuf,
    max_items: usize,
    max_content_chars: usize,
    state: RwLock<StoreState>,
}

impl KnowledgeStore {
    /// Open the store, loading whatever is on disk.
    ///
    /// Missing or unreadable artifacts are treated as empty and the empty
    /// state is written back immediately. Never fails.
    pub fn open(options: StoreOptions) -> Self {
        let StoreOptions {
            data_dir,
            max_items,
            max_content_chars,
        } = options;
        let max_items = max_items.max(1);

        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            warn!(path = %data_dir.display(), error = %e, "Failed to create knowledge data directory");
        }

        let loaded_items: Option<Vec<KnowledgeItem>> = load_json(&data_dir.join(KNOWLEDGE_FILE));
        let loaded_stats: Option<Stats> = load_json(&data_dir.join(STATS_FILE));
        let needs_write = loaded_items.is_none() || loaded_stats.is_none();

        let mut items: VecDeque<KnowledgeItem> = loaded_items.unwrap_or_default().into();
        let evicted = evict_oldest(&mut items, max_items);
        if evicted > 0 {
            info!(evicted, max_items, "Trimmed knowledge store to capacity");
        }

        let mut stats = loaded_stats.unwrap_or_default();
        stats.total_knowledge = items.len();

        info!(
            path = %data_dir.display(),
            items = items.len(),
            max_items,
            "Knowledge store loaded"
        );

        let state = StoreState { items, stats };
        if needs_write || evicted > 0 {
            if let Err(e) = persist_to(&data_dir, &state) {
                warn!(error = %e, "Failed to write initial knowledge state");
            }
        }

        Self {
            data_dir,
            max_items,
            max_content_chars: max_content_chars.max(1),
            state: RwLock::new(state),
        }
    }

    /// Add a piece of text to the store.
    ///
    /// Content is truncated to the configured character cap. A missing
    /// `timestamp`, `source` or `type` in `metadata` is filled in. The
    /// oldest items are evicted beyond capacity. A persistence failure
    /// leaves the item in memory and is reported via `persisted = false`.
    pub async fn insert(&self, content: &str, mut metadata: Metadata) -> Result<InsertOutcome, KnowledgeError> {
        if content.trim().is_empty() {
            return Err(KnowledgeError::InvalidInput("content must not be empty".into()));
        }

        let content = truncate_chars(content, self.max_content_chars);
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        metadata.entry("timestamp".into()).or_insert_with(|| now.clone());
        metadata.entry("source".into()).or_insert_with(|| "manual".into());
        metadata.entry("type".into()).or_insert_with(|| "text".into());

        let item = KnowledgeItem {
            id: generate_id(),
            content,
            metadata,
            embedding: None,
        };
        let id = item.id.clone();

        let mut state = self.state.write().await;
        state.items.push_back(item);
        let evicted = evict_oldest(&mut state.items, self.max_items);
        state.stats.total_knowledge = state.items.len();
        state.stats.last_update = Some(now);
        state.stats.training_count += 1;

        let total_knowledge = state.items.len();
        let (persisted, persist_error) = match self.persist(&state) {
            Ok(()) => (true, None),
            Err(e) => {
                warn!(id = %id, error = %e, "Knowledge kept in memory but not persisted");
                (false, Some(e.to_string()))
            }
        };
        drop(state);

        info!(id = %id, total = total_knowledge, evicted, "Knowledge added");

        Ok(InsertOutcome {
            id,
            total_knowledge,
            persisted,
            persist_error,
        })
    }

    /// Rank stored items against `query`.
    pub async fn search(&self, query: &SearchQuery) -> SearchOutcome {
        let state = self.state.read().await;
        let results = search::rank(state.items.iter(), query);
        debug!(query = %query.query, found = results.len(), total = state.items.len(), "Knowledge search");
        SearchOutcome {
            found: results.len(),
            total: state.items.len(),
            results,
        }
    }

    /// Snapshot of stats and an estimate of the collection's size.
    ///
    /// The size estimate serializes every item, so this is O(size).
    pub async fn stats(&self) -> KnowledgeStats {
        let state = self.state.read().await;
        let bytes = serde_json::to_vec(&state.items).map(|b| b.len()).unwrap_or(0);
        KnowledgeStats {
            stats: state.stats.clone(),
            current_items: state.items.len(),
            max_items: self.max_items,
            memory: MemoryUsage::from_bytes(bytes),
        }
    }

    pub async fn get(&self, id: &str) -> Option<KnowledgeItem> {
        let state = self.state.read().await;
        state.items.iter().find(|i| i.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.items.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write both artifacts to disk.
    pub async fn flush(&self) -> Result<(), KnowledgeError> {
        let state = self.state.read().await;
        self.persist(&state)
    }

    fn persist(&self, state: &StoreState) -> Result<(), KnowledgeError> {
        persist_to(&self.data_dir, state)
    }
}

/// Items first, then stats.
fn persist_to(data_dir: &Path, state: &StoreState) -> Result<(), KnowledgeError> {
    std::fs::create_dir_all(data_dir)
        .map_err(|e| KnowledgeError::Storage(format!("Failed to create data directory: {e}")))?;
    write_json_atomic(&data_dir.join(KNOWLEDGE_FILE), &state.items)?;
    write_json_atomic(&data_dir.join(STATS_FILE), &state.stats)?;
    Ok(())
}

/// `kb_<unix-millis>_<9 random base36 chars>`
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("kb_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// First `max_chars` characters of `s`.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn evict_oldest(items: &mut VecDeque<KnowledgeItem>, max_items: usize) -> usize {
    let excess = items.len().saturating_sub(max_items);
    items.drain(..excess);
    excess
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No existing file, starting empty");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read file, starting empty");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping unparseable file, starting empty");
            None
        }
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), KnowledgeError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| KnowledgeError::Storage(format!("Failed to serialize {}: {e}", path.display())))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, json)
        .map_err(|e| KnowledgeError::Storage(format!("Failed to write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        KnowledgeError::Storage(format!("Failed to replace {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open_in(dir: &TempDir, max_items: usize) -> KnowledgeStore {
        KnowledgeStore::open(StoreOptions::new(dir.path()).max_items(max_items))
    }

    #[tokio::test]
    async fn open_creates_empty_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        assert!(store.is_empty().await);
        assert!(dir.path().join(KNOWLEDGE_FILE).exists());
        assert!(dir.path().join(STATS_FILE).exists());

        let raw = std::fs::read_to_string(dir.path().join(KNOWLEDGE_FILE)).unwrap();
        let items: Vec<KnowledgeItem> = serde_json::from_str(&raw).unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn insert_fills_default_metadata() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        let outcome = store.insert("Sleep matters for longevity", Metadata::new()).await.unwrap();
        assert!(outcome.persisted);
        assert_eq!(outcome.total_knowledge, 1);

        let item = store.get(&outcome.id).await.unwrap();
        assert_eq!(item.source(), Some("manual"));
        assert_eq!(item.kind(), Some("text"));
        assert!(item.timestamp().is_some());
    }

    #[tokio::test]
    async fn stored_items_ranked_for_longevity_aging() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        let nad = store.insert("NAD+ and longevity research", Metadata::new()).await.unwrap().id;
        store.insert("exercise and metabolism", Metadata::new()).await.unwrap();
        let inflammation = store.insert("inflammation and aging", Metadata::new()).await.unwrap().id;

        let outcome = store
            .search(&SearchQuery::new("longevity aging").with_threshold(0.3))
            .await;
        let ranked: Vec<(&str, f64)> = outcome
            .results
            .iter()
            .map(|h| (h.id.as_str(), h.similarity))
            .collect();
        assert_eq!(ranked, vec![(nad.as_str(), 0.5), (inflammation.as_str(), 0.5)]);
        assert_eq!(outcome.found, 2);
        assert_eq!(outcome.total, 3);
    }

    #[tokio::test]
    async fn caller_metadata_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        let mut meta = Metadata::new();
        meta.insert("source".into(), "url".into());
        meta.insert("timestamp".into(), "2024-01-01T00:00:00Z".into());
        let outcome = store.insert("Zone 2 cardio", meta).await.unwrap();
        let item = store.get(&outcome.id).await.unwrap();
        assert_eq!(item.source(), Some("url"));
        assert_eq!(item.metadata["timestamp"], "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        let err = store.insert("   \n", Metadata::new()).await.unwrap_err();
        assert!(matches!(err, KnowledgeError::InvalidInput(_)));
        assert!(store.is_empty().await);
        assert_eq!(store.stats().await.stats.training_count, 0);
    }

    #[tokio::test]
    async fn content_is_truncated_to_cap() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        let long = "é".repeat(15_000);
        let outcome = store.insert(&long, Metadata::new()).await.unwrap();
        let item = store.get(&outcome.id).await.unwrap();
        assert_eq!(item.content.chars().count(), 10_000);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("añob", 2), "añ");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn ids_have_expected_shape() {
        let id = generate_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "kb");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_ne!(generate_id(), generate_id());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 1000);
        let mut ids = Vec::new();
        for i in 0..1005 {
            let outcome = store.insert(&format!("note number {i}"), Metadata::new()).await.unwrap();
            ids.push(outcome.id);
        }

        assert_eq!(store.len().await, 1000);
        for evicted in &ids[..5] {
            assert!(store.get(evicted).await.is_none());
        }
        assert!(store.get(&ids[5]).await.is_some());
        assert!(store.get(&ids[1004]).await.is_some());

        let stats = store.stats().await;
        assert_eq!(stats.stats.training_count, 1005);
        assert_eq!(stats.stats.total_knowledge, 1000);
        assert_eq!(stats.current_items, 1000);
    }

    #[tokio::test]
    async fn reopen_restores_items_and_stats() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open_in(&dir, 10);
            store.insert("Rapamycin extends lifespan in mice", Metadata::new()).await.unwrap().id
        };

        let store = open_in(&dir, 10);
        let item = store.get(&id).await.unwrap();
        assert_eq!(item.content, "Rapamycin extends lifespan in mice");
        let stats = store.stats().await;
        assert_eq!(stats.stats.training_count, 1);
        assert!(stats.stats.last_update.is_some());
        assert!(!dir.path().join("knowledge.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_files_fall_back_to_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(KNOWLEDGE_FILE), "{not json").unwrap();
        std::fs::write(dir.path().join(STATS_FILE), "\"oops\"").unwrap();

        let store = open_in(&dir, 10);
        assert!(store.is_empty().await);
        assert_eq!(store.stats().await.stats, Stats::default());

        // empty state written back over the corrupt files
        let raw = std::fs::read_to_string(dir.path().join(KNOWLEDGE_FILE)).unwrap();
        assert!(serde_json::from_str::<Vec<KnowledgeItem>>(&raw).is_ok());
    }

    #[tokio::test]
    async fn lowered_capacity_trims_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_in(&dir, 10);
            for i in 0..6 {
                store.insert(&format!("entry {i}"), Metadata::new()).await.unwrap();
            }
        }
        let store = open_in(&dir, 4);
        assert_eq!(store.len().await, 4);
    }

    #[tokio::test]
    async fn embedding_on_disk_is_preserved() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(KNOWLEDGE_FILE),
            r#"[{"id":"kb_1_aaaaaaaaa","content":"legacy","metadata":{"source":"manual"},"embedding":[0.25,-0.5]}]"#,
        )
        .unwrap();
        let store = open_in(&dir, 10);
        store.insert("fresh", Metadata::new()).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join(KNOWLEDGE_FILE)).unwrap();
        let items: Vec<KnowledgeItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(items[0].embedding, Some(vec![0.25, -0.5]));
        assert_eq!(items[1].embedding, None);
    }

    #[tokio::test]
    async fn unwritable_directory_keeps_item_in_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();

        let store = KnowledgeStore::open(StoreOptions::new(&blocker).max_items(10));
        let outcome = store.insert("Still searchable", Metadata::new()).await.unwrap();
        assert!(!outcome.persisted);
        assert!(outcome.persist_error.is_some());
        assert_eq!(store.len().await, 1);

        let found = store.search(&SearchQuery::new("searchable").with_threshold(0.5)).await;
        assert_eq!(found.found, 1);
    }

    #[tokio::test]
    async fn search_reports_found_and_total() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        store.insert("Longevity research and aging", Metadata::new()).await.unwrap();
        store.insert("Longevity research", Metadata::new()).await.unwrap();
        store.insert("Unrelated content", Metadata::new()).await.unwrap();

        let outcome = store
            .search(&SearchQuery::new("longevity aging").with_threshold(0.5).with_limit(5))
            .await;
        assert_eq!(outcome.found, 2);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.results[0].content, "Longevity research and aging");
    }

    #[tokio::test]
    async fn stats_estimate_memory_footprint() {
        let dir = TempDir::new().unwrap();
        let store = open_in(&dir, 10);
        let empty = store.stats().await;
        assert_eq!(empty.memory.bytes, 2); // "[]"
        store.insert(&"x".repeat(4096), Metadata::new()).await.unwrap();
        let stats = store.stats().await;
        assert!(stats.memory.bytes > 4096);
        assert_eq!(stats.max_items, 10);
    }

    #[tokio::test]
    async fn concurrent_inserts_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open_in(&dir, 100));
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert(&format!("parallel note {i}"), Metadata::new()).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len().await, 20);
        assert_eq!(store.stats().await.stats.training_count, 20);

        let reopened = open_in(&dir, 100);
        assert_eq!(reopened.len().await, 20);
    }
}
