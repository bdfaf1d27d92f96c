use crate::constants::{FLAG_KEY_PREFIX, SEGMENT_KEY_PREFIX};
use crate::model::config::{FeatureConfig, Segment};
use crate::model::enums::Operator;
use log::debug;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// A flag or segment held by the repository's cache/store layers.
#[derive(Clone, Debug)]
pub enum Entry {
    /// A cached feature flag.
    Flag(Arc<FeatureConfig>),
    /// A cached segment.
    Segment(Arc<Segment>),
}

/// A bounded cache API used to make custom cache implementations.
///
/// Implementations must guarantee bounded size via eviction; any policy under
/// which the most-recently-used entries survive is acceptable.
pub trait Cache: Send + Sync {
    /// Gets the entry identified by the given `key`.
    fn get(&self, key: &str) -> Option<Entry>;

    /// Writes the given `entry` by the given `key`.
    fn set(&self, key: &str, entry: Entry);

    /// Removes the entry identified by the given `key`.
    fn remove(&self, key: &str);

    /// Lists the keys currently held.
    fn keys(&self) -> Vec<String>;
}

/// An optional durable store API backing the cache.
pub trait Store: Send + Sync {
    /// Gets the entry identified by the given `key`.
    fn get(&self, key: &str) -> Option<Entry>;

    /// Persists the given `entry` by the given `key`.
    fn set(&self, key: &str, entry: Entry);

    /// Removes the entry identified by the given `key`.
    fn remove(&self, key: &str);

    /// Lists the keys currently persisted.
    fn keys(&self) -> Vec<String>;

    /// Releases resources held by the store.
    fn close(&self) {}
}

/// The default in-memory [`Cache`], bounded by an LRU eviction policy.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl InMemoryCache {
    /// Creates a cache bounded at the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Creates a cache bounded at the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Entry> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, entry: Entry) {
        self.entries.lock().unwrap().put(key.to_owned(), entry);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().unwrap().pop(key);
    }

    fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }
}

/// The cache(+store)-backed local replica of server-authored flag/segment state.
///
/// The synchronizer is the sole writer, the evaluation engine the sole reader.
/// Writes are version-gated: an incoming entity whose version does not exceed
/// the stored one is silently dropped, which guards against out-of-order
/// delivery between the polling and streaming paths.
pub struct Repository {
    cache: Box<dyn Cache>,
    store: Option<Box<dyn Store>>,
    // The version check and the apply must not interleave across writers.
    write_lock: Mutex<()>,
}

impl Repository {
    pub(crate) fn new(cache: Box<dyn Cache>, store: Option<Box<dyn Store>>) -> Self {
        Self {
            cache,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Looks up a flag by identifier, trying the cache first and the durable
    /// store second. A store hit repopulates the cache.
    pub fn get_flag(&self, identifier: &str) -> Option<Arc<FeatureConfig>> {
        match self.read(&flag_key(identifier)) {
            Some(Entry::Flag(flag)) => Some(flag),
            _ => None,
        }
    }

    /// Looks up a segment by identifier, trying the cache first and the durable
    /// store second. A store hit repopulates the cache.
    pub fn get_segment(&self, identifier: &str) -> Option<Arc<Segment>> {
        match self.read(&segment_key(identifier)) {
            Some(Entry::Segment(segment)) => Some(segment),
            _ => None,
        }
    }

    /// Applies an incoming flag, unless the stored version is already at or
    /// beyond the incoming one.
    pub fn set_flag(&self, flag: FeatureConfig) {
        let _guard = self.write_lock.lock().unwrap();
        let key = flag_key(&flag.feature);
        if let Some(stored) = self.stored_version(&key) {
            if stored >= flag.version {
                debug!(
                    "Flag '{}' at version {} not applied, stored version {stored} is newer",
                    flag.feature, flag.version
                );
                return;
            }
        }
        self.write(&key, Entry::Flag(Arc::new(flag)));
    }

    /// Applies an incoming segment, unless the stored version is already at or
    /// beyond the incoming one.
    pub fn set_segment(&self, segment: Segment) {
        let _guard = self.write_lock.lock().unwrap();
        let key = segment_key(&segment.identifier);
        if let Some(stored) = self.stored_version(&key) {
            if stored >= segment.version {
                debug!(
                    "Segment '{}' at version {} not applied, stored version {stored} is newer",
                    segment.identifier, segment.version
                );
                return;
            }
        }
        self.write(&key, Entry::Segment(Arc::new(segment)));
    }

    /// Removes a flag from both layers.
    pub fn remove_flag(&self, identifier: &str) {
        let _guard = self.write_lock.lock().unwrap();
        self.delete(&flag_key(identifier));
    }

    /// Removes a segment from both layers.
    pub fn remove_segment(&self, identifier: &str) {
        let _guard = self.write_lock.lock().unwrap();
        self.delete(&segment_key(identifier));
    }

    /// Scans all stored flags for serving rules with a `segment_match` clause
    /// naming the given segment. Used to re-validate dependent flags after a
    /// segment change.
    pub fn find_flags_referencing_segment(&self, identifier: &str) -> Vec<String> {
        let mut result = Vec::new();
        for key in self.all_keys() {
            let flag_id = match key.strip_prefix(FLAG_KEY_PREFIX) {
                Some(id) => id,
                None => continue,
            };
            let flag = match self.get_flag(flag_id) {
                Some(flag) => flag,
                None => continue,
            };
            let references = flag.rules.iter().flatten().any(|rule| {
                rule.clauses.iter().any(|clause| {
                    clause.op == Operator::SegmentMatch
                        && clause.values.iter().any(|v| v == identifier)
                })
            });
            if references {
                result.push(flag.feature.clone());
            }
        }
        result
    }

    fn read(&self, key: &str) -> Option<Entry> {
        if let Some(entry) = self.cache.get(key) {
            return Some(entry);
        }
        if let Some(store) = self.store.as_ref() {
            if let Some(entry) = store.get(key) {
                self.cache.set(key, entry.clone());
                return Some(entry);
            }
        }
        None
    }

    // Staleness check for the write gate. Absence is expected for first-ever
    // updates, so nothing is logged here.
    fn stored_version(&self, key: &str) -> Option<i64> {
        match self.read(key)? {
            Entry::Flag(flag) => Some(flag.version),
            Entry::Segment(segment) => Some(segment.version),
        }
    }

    fn write(&self, key: &str, entry: Entry) {
        match self.store.as_ref() {
            Some(store) => {
                store.set(key, entry);
                // Evict instead of refresh so the next read repopulates from the
                // store; a cached copy diverging from the stored one has no window
                // to be observed.
                self.cache.remove(key);
            }
            None => self.cache.set(key, entry),
        }
    }

    fn delete(&self, key: &str) {
        if let Some(store) = self.store.as_ref() {
            store.remove(key);
        }
        self.cache.remove(key);
    }

    fn all_keys(&self) -> Vec<String> {
        let mut keys: HashSet<String> = self.cache.keys().into_iter().collect();
        if let Some(store) = self.store.as_ref() {
            keys.extend(store.keys());
        }
        keys.into_iter().collect()
    }

    pub(crate) fn close(&self) {
        if let Some(store) = self.store.as_ref() {
            store.close();
        }
    }
}

fn flag_key(identifier: &str) -> String {
    format!("{FLAG_KEY_PREFIX}{identifier}")
}

fn segment_key(identifier: &str) -> String {
    format!("{SEGMENT_KEY_PREFIX}{identifier}")
}
