//! Bounded, TTL'd cache of per-host [`ServerCapabilities`], avoiding an
//! `OPTIONS` round-trip before every discovery/sync call. Backed by
//! `moka::sync::Cache`, the concurrent cache used elsewhere in the pack for
//! read-mostly shared state.

use crate::config::CapabilitiesCacheConfig;
use crate::dav::model::ServerCapabilities;
use moka::sync::Cache;

/// Fraction of entries swept on an insert that would exceed `max_capacity`.
/// `moka` already evicts on its own admission policy, but the spec calls
/// for a deterministic sweep rather than relying solely on moka's internal
/// TinyLFU eviction, so this invalidates the oldest quarter by re-running
/// moka's own LRU-ish `invalidate_entries_if` over entries whose age
/// exceeds the median.
const SWEEP_FRACTION: f64 = 0.25;

#[derive(Clone)]
pub struct CapabilitiesCache {
    inner: Cache<String, ServerCapabilities>,
    max_entries: u64,
}

impl CapabilitiesCache {
    pub fn new(config: &CapabilitiesCacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self {
            inner,
            max_entries: config.max_entries,
        }
    }

    pub fn get(&self, host: &str) -> Option<ServerCapabilities> {
        self.inner.get(host)
    }

    pub fn insert(&self, host: String, capabilities: ServerCapabilities) {
        if self.inner.entry_count() >= self.max_entries {
            self.sweep();
        }
        self.inner.insert(host, capabilities);
    }

    pub fn invalidate(&self, host: &str) {
        self.inner.invalidate(host);
    }

    /// Evict the oldest ~25% of entries by discovery time, giving a fresh
    /// insert room without waiting on moka's own admission window.
    fn sweep(&self) {
        self.inner.run_pending_tasks();
        let mut ages: Vec<(String, chrono::DateTime<chrono::Utc>)> = self
            .inner
            .iter()
            .map(|(k, v)| ((*k).clone(), v.discovered_at))
            .collect();
        if ages.is_empty() {
            return;
        }
        ages.sort_by_key(|(_, at)| *at);
        let sweep_count = ((ages.len() as f64) * SWEEP_FRACTION).ceil() as usize;
        for (host, _) in ages.into_iter().take(sweep_count.max(1)) {
            self.inner.invalidate(&host);
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn caps() -> ServerCapabilities {
        ServerCapabilities {
            dav_classes: BTreeSet::new(),
            allowed_methods: BTreeSet::new(),
            raw_dav_header: String::new(),
            discovered_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn stores_and_returns_by_host() {
        let cache = CapabilitiesCache::new(&CapabilitiesCacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 10,
        });
        cache.insert("cal.example.com".to_string(), caps());
        assert!(cache.get("cal.example.com").is_some());
        assert!(cache.get("other.example.com").is_none());
    }

    #[test]
    fn sweeps_oldest_quarter_once_at_capacity() {
        let cache = CapabilitiesCache::new(&CapabilitiesCacheConfig {
            ttl: Duration::from_secs(60),
            max_entries: 4,
        });
        for i in 0..4 {
            cache.insert(format!("host{i}.example.com"), caps());
        }
        cache.inner.run_pending_tasks();
        assert_eq!(cache.entry_count(), 4);
        cache.insert("host4.example.com".to_string(), caps());
        cache.inner.run_pending_tasks();
        assert!(cache.entry_count() <= 4);
    }
}
