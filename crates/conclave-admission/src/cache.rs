use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

/// One cached value with its expiry and access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub data: T,
    /// When the entry was stored.
    pub inserted_at: Instant,
    /// Time-to-live; the entry is logically absent once `now - inserted_at`
    /// exceeds it, even while still physically present.
    pub ttl: Duration,
    /// Number of hits served from this entry.
    pub access_count: u64,
    /// When the entry was last read.
    pub last_accessed: Instant,
    /// Invalidation tags, e.g. `project:p1`.
    pub tags: Vec<String>,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// TTL cache for audit results with tag- and pattern-based invalidation.
///
/// Reads never extend an entry's lifetime (no sliding expiration); hits only
/// update the access statistics. Expired entries are evicted whenever they
/// are observed, and [`TtlCache::sweep`] removes the rest.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use conclave_admission::TtlCache;
///
/// let cache: TtlCache<String> = TtlCache::new(Duration::from_secs(60));
/// cache.set("k1", "result".into(), None, vec!["project:p1".into()]);
/// assert_eq!(cache.get("k1").as_deref(), Some("result"));
///
/// let removed = cache.invalidate_by_tags(&["project:p1".into()]);
/// assert_eq!(removed, 1);
/// assert!(cache.get("k1").is_none());
/// ```
pub struct TtlCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    /// Create a cache whose entries default to `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Look up a key, treating expired entries as absent (and evicting them).
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                debug!(key, "evicting expired cache entry");
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = now;
                Some(entry.data.clone())
            }
            None => None,
        }
    }

    /// Store a value under `key` with an optional per-entry TTL and tags.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>, tags: Vec<String>) {
        let now = Instant::now();
        let entry = CacheEntry {
            data: value,
            inserted_at: now,
            ttl: ttl.unwrap_or(self.default_ttl),
            access_count: 0,
            last_accessed: now,
            tags,
        };
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key.into(), entry);
    }

    /// Remove every entry carrying at least one of `tags`. Returns the
    /// number of entries removed.
    pub fn invalidate_by_tags(&self, tags: &[String]) -> usize {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.iter().any(|t| tags.contains(t)));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, ?tags, "invalidated cache entries by tag");
        }
        removed
    }

    /// Remove every entry whose key matches `pattern`. Returns the number of
    /// entries removed.
    pub fn invalidate_by_pattern(&self, pattern: &Regex) -> usize {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let before = entries.len();
        entries.retain(|key, _| !pattern.is_match(key));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, pattern = %pattern, "invalidated cache entries by pattern");
        }
        removed
    }

    /// Remove all logically-expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of physically present entries (may include expired ones that
    /// have not been observed yet).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    /// `true` when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
