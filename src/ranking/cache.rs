//! Short-TTL cache for ranked and formatted context
//!
//! A chat turn may re-render or retry with unchanged terminal state, and
//! ranking plus formatting is the dominant per-request cost. The key is a
//! fingerprint of the full item set concatenated with the query, so any item
//! addition, removal, or usage-field mutation invalidates implicitly through
//! a cache miss rather than explicit deletion.

use super::models::{ContextItem, RankedContext};
use crate::config::CacheConfig;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Pushed out by capacity.
    Size,
    /// Older than the max age.
    Expired,
    /// Removed by an explicit clear.
    Manual,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Size => "size",
            EvictionReason::Expired => "expired",
            EvictionReason::Manual => "manual",
        }
    }
}

/// Observer invoked when an entry is evicted
pub type EvictionObserver = Arc<dyn Fn(&str, EvictionReason) + Send + Sync>;

/// Cached ranking result
#[derive(Debug, Clone)]
pub struct CachedSelection {
    pub ranked: Vec<RankedContext>,
    pub formatted: String,
    pub token_count: usize,
}

struct CacheEntry {
    value: CachedSelection,
    inserted_at: Instant,
}

/// Deterministic fingerprint of a context-item set: sorted id/version pairs
/// hashed so a single timestamp mutation changes the result.
pub fn fingerprint_items(items: &[ContextItem]) -> String {
    let mut stamps: Vec<String> = items
        .iter()
        .map(|i| format!("{}@{}", i.id, i.version_stamp()))
        .collect();
    stamps.sort();

    let mut hasher = Sha256::new();
    for stamp in &stamps {
        hasher.update(stamp.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Bounded, short-TTL cache for ranked+formatted context
pub struct ContextCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
    max_age: Duration,
    observer: Option<EvictionObserver>,
}

impl ContextCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: config.capacity,
            max_age: Duration::from_secs(config.max_age_secs),
            observer: None,
        }
    }

    /// Attach an eviction observer. Used for metrics and tests.
    pub fn with_observer(mut self, observer: EvictionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn key(items: &[ContextItem], query: &str) -> String {
        format!("{}||{}", fingerprint_items(items), query)
    }

    /// Look up the selection for this exact item-set state and query.
    pub fn get(&self, items: &[ContextItem], query: &str) -> Option<CachedSelection> {
        let key = Self::key(items, query);
        let mut expired = false;
        let hit = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get(&key) {
                Some(entry) if entry.inserted_at.elapsed() < self.max_age => {
                    debug!("context cache hit");
                    Some(entry.value.clone())
                }
                Some(_) => {
                    entries.remove(&key);
                    expired = true;
                    None
                }
                None => None,
            }
        };
        if expired {
            self.notify(&key, EvictionReason::Expired);
        }
        hit
    }

    /// Store a freshly computed selection.
    pub fn set(
        &self,
        items: &[ContextItem],
        query: &str,
        ranked: Vec<RankedContext>,
        formatted: String,
        token_count: usize,
    ) {
        let key = Self::key(items, query);
        let evicted = {
            let mut entries = self.entries.lock().unwrap();

            let evicted = if entries.len() >= self.capacity && !entries.contains_key(&key) {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = &oldest {
                    entries.remove(oldest);
                }
                oldest
            } else {
                None
            };

            entries.insert(
                key,
                CacheEntry {
                    value: CachedSelection {
                        ranked,
                        formatted,
                        token_count,
                    },
                    inserted_at: Instant::now(),
                },
            );
            evicted
        };
        if let Some(oldest) = evicted {
            self.notify(&oldest, EvictionReason::Size);
        }
    }

    /// Drop every entry, reporting each as a manual eviction.
    pub fn clear(&self) {
        let keys: Vec<String> = {
            let mut entries = self.entries.lock().unwrap();
            let keys = entries.keys().cloned().collect();
            entries.clear();
            keys
        };
        for key in &keys {
            self.notify(key, EvictionReason::Manual);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoked only after the entries guard is dropped, so observers may
    /// call back into the cache.
    fn notify(&self, key: &str, reason: EvictionReason) {
        if let Some(observer) = &self.observer {
            observer(key, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::models::ContextItemKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(n: usize) -> Vec<ContextItem> {
        (0..n)
            .map(|i| ContextItem::new(ContextItemKind::CommandOutput, format!("output {}", i)))
            .collect()
    }

    fn cache(capacity: usize, max_age_secs: u64) -> ContextCache {
        ContextCache::new(&CacheConfig {
            capacity,
            max_age_secs,
        })
    }

    #[test]
    fn test_set_then_get() {
        let cache = cache(10, 30);
        let set = items(3);
        cache.set(&set, "query", vec![], "formatted block".to_string(), 42);

        let hit = cache.get(&set, "query").unwrap();
        assert_eq!(hit.formatted, "formatted block");
        assert_eq!(hit.token_count, 42);
    }

    #[test]
    fn test_query_is_part_of_key() {
        let cache = cache(10, 30);
        let set = items(2);
        cache.set(&set, "first query", vec![], String::new(), 0);
        assert!(cache.get(&set, "other query").is_none());
    }

    #[test]
    fn test_item_mutation_invalidates() {
        let cache = cache(10, 30);
        let mut set = items(2);
        cache.set(&set, "query", vec![], String::new(), 0);
        assert!(cache.get(&set, "query").is_some());

        // Usage bookkeeping mutation changes the fingerprint
        set[0].usage_count += 1;
        assert!(cache.get(&set, "query").is_none());
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let set = items(3);
        let mut reversed = set.clone();
        reversed.reverse();
        assert_eq!(fingerprint_items(&set), fingerprint_items(&reversed));
    }

    #[test]
    fn test_capacity_eviction_reports_size() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let cache = cache(2, 30).with_observer(Arc::new(move |_key, reason| {
            assert_eq!(reason, EvictionReason::Size);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cache.set(&items(1), "a", vec![], String::new(), 0);
        cache.set(&items(1), "b", vec![], String::new(), 0);
        cache.set(&items(1), "c", vec![], String::new(), 0);

        assert_eq!(cache.len(), 2);
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expiry_reports_expired() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let cache = cache(10, 0).with_observer(Arc::new(move |_key, reason| {
            assert_eq!(reason, EvictionReason::Expired);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let set = items(1);
        cache.set(&set, "query", vec![], String::new(), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&set, "query").is_none());
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_reenter_cache() {
        // Observer that reads back from the cache it is attached to; the
        // set/get/clear paths must have released the entries lock by the
        // time it runs.
        let cell: Arc<std::sync::Mutex<Option<Arc<ContextCache>>>> =
            Arc::new(std::sync::Mutex::new(None));
        let cell_in_observer = cell.clone();
        let seen_lens = Arc::new(std::sync::Mutex::new(Vec::new()));
        let lens_target = seen_lens.clone();

        let cache = Arc::new(cache(1, 30).with_observer(Arc::new(move |_key, _reason| {
            if let Some(cache) = cell_in_observer.lock().unwrap().as_ref() {
                lens_target.lock().unwrap().push(cache.len());
            }
        })));
        *cell.lock().unwrap() = Some(cache.clone());

        cache.set(&items(1), "a", vec![], String::new(), 0);
        // Evicts "a" for capacity; the observer re-enters via len()
        cache.set(&items(1), "b", vec![], String::new(), 0);
        cache.clear();

        assert_eq!(seen_lens.lock().unwrap().as_slice(), &[1, 0]);
    }

    #[test]
    fn test_clear_reports_manual() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let counter = evictions.clone();
        let cache = cache(10, 30).with_observer(Arc::new(move |_key, reason| {
            assert_eq!(reason, EvictionReason::Manual);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        cache.set(&items(1), "a", vec![], String::new(), 0);
        cache.set(&items(1), "b", vec![], String::new(), 0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(evictions.load(Ordering::SeqCst), 2);
    }
}
