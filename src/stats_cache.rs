use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregatedStats;
use crate::season_key::SeasonKey;
use crate::season_summary::SeasonSummary;
use crate::store::{DocumentStore, paths};

/// Bump whenever the cached shape or the aggregation rules change.
pub const CACHE_VERSION: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner_scope: String,
    pub player_id: String,
}

impl CacheKey {
    pub fn new(owner_scope: &str, player_id: &str) -> Self {
        Self {
            owner_scope: owner_scope.to_string(),
            player_id: player_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub player_id: String,
    pub owner_scope: String,
    pub stats_season: Option<SeasonKey>,
    /// Set when `stats_season` was requested explicitly and is not the
    /// player's latest registered season.
    #[serde(default)]
    pub season_explicit: bool,
    pub season_stats: Option<AggregatedStats>,
    pub career_stats: AggregatedStats,
    // Written as `null` rather than skipped so a merge-write clears a
    // richer entry left by an earlier request.
    pub season_summaries: Option<Vec<SeasonSummary>>,
    pub summaries_included: bool,
    pub cached_at_ms: i64,
    pub cache_version: u32,
}

/// Keyed persistence for computed stats. Freshness is decided by
/// [`CachePolicy`], not by the backend.
pub trait StatsCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;
    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()>;
}

/// Cache documents stored next to the club data, one per player.
pub struct StoreCache {
    store: Arc<dyn DocumentStore>,
}

impl StoreCache {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

impl StatsCache for StoreCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = paths::stats_cache(&key.owner_scope, &key.player_id);
        let Some(raw) = self.store.get(&path)? else {
            return Ok(None);
        };
        match serde_json::from_value::<CacheEntry>(raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                // Older layouts simply miss and get rewritten.
                debug!("unreadable cache entry at {path}: {err}");
                Ok(None)
            }
        }
    }

    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let path = paths::stats_cache(&key.owner_scope, &key.player_id);
        let value = serde_json::to_value(entry).context("serialize cache entry")?;
        self.store.merge(&path, value)
    }
}

/// What the caller needs from a cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheWant {
    pub include_summaries: bool,
    /// Explicitly requested stats season, if any.
    pub season: Option<SeasonKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Expired,
    VersionMismatch,
    MissingSummaries,
    SeasonMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub version: u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: crate::config::DEFAULT_STATS_CACHE_TTL,
            version: CACHE_VERSION,
        }
    }
}

impl CachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            version: CACHE_VERSION,
        }
    }

    pub fn freshness(&self, entry: &CacheEntry, now_ms: i64, want: &CacheWant) -> Freshness {
        if entry.cache_version != self.version {
            return Freshness::VersionMismatch;
        }
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        if now_ms.saturating_sub(entry.cached_at_ms) > ttl_ms {
            return Freshness::Expired;
        }
        if want.include_summaries && !entry.summaries_included {
            return Freshness::MissingSummaries;
        }
        let season_ok = match &want.season {
            Some(season) => entry.stats_season.as_ref() == Some(season),
            // A plain request wants the latest season, not a pinned one.
            None => !entry.season_explicit,
        };
        if !season_ok {
            return Freshness::SeasonMismatch;
        }
        Freshness::Fresh
    }

    pub fn is_fresh(&self, entry: &CacheEntry, now_ms: i64, want: &CacheWant) -> bool {
        self.freshness(entry, now_ms, want) == Freshness::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const MINUTE_MS: i64 = 60_000;

    fn entry(cached_at_ms: i64, summaries_included: bool) -> CacheEntry {
        CacheEntry {
            player_id: "p1".into(),
            owner_scope: "o1".into(),
            stats_season: Some(SeasonKey::from("2024/25")),
            season_explicit: false,
            season_stats: Some(AggregatedStats::default()),
            career_stats: AggregatedStats::default(),
            season_summaries: summaries_included.then(Vec::new),
            summaries_included,
            cached_at_ms,
            cache_version: CACHE_VERSION,
        }
    }

    #[test]
    fn ttl_window_is_inclusive() {
        let policy = CachePolicy::default();
        let want = CacheWant::default();
        let e = entry(0, false);
        assert_eq!(policy.freshness(&e, 10 * MINUTE_MS, &want), Freshness::Fresh);
        assert_eq!(policy.freshness(&e, 10 * MINUTE_MS + 1, &want), Freshness::Expired);
    }

    #[test]
    fn summary_less_entry_does_not_satisfy_summary_request() {
        let policy = CachePolicy::default();
        let want = CacheWant {
            include_summaries: true,
            season: None,
        };
        assert_eq!(
            policy.freshness(&entry(0, false), MINUTE_MS, &want),
            Freshness::MissingSummaries
        );
        assert!(policy.is_fresh(&entry(0, true), MINUTE_MS, &want));
    }

    #[test]
    fn version_and_season_mismatch_miss() {
        let policy = CachePolicy::default();
        let mut old = entry(0, true);
        old.cache_version = CACHE_VERSION - 1;
        assert_eq!(
            policy.freshness(&old, 0, &CacheWant::default()),
            Freshness::VersionMismatch
        );
        let want = CacheWant {
            include_summaries: false,
            season: Some(SeasonKey::from("2023-24")),
        };
        assert_eq!(
            policy.freshness(&entry(0, true), 0, &want),
            Freshness::SeasonMismatch
        );
    }

    #[test]
    fn pinned_season_entry_does_not_serve_plain_request() {
        let policy = CachePolicy::default();
        let mut pinned = entry(0, false);
        pinned.stats_season = Some(SeasonKey::from("2023/24"));
        pinned.season_explicit = true;
        assert_eq!(
            policy.freshness(&pinned, MINUTE_MS, &CacheWant::default()),
            Freshness::SeasonMismatch
        );
        let want = CacheWant {
            include_summaries: false,
            season: Some(SeasonKey::from("2023-2024")),
        };
        assert!(policy.is_fresh(&pinned, MINUTE_MS, &want));
    }

    #[test]
    fn store_cache_overwrites_previous_summaries() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let cache = StoreCache::new(store);
        let key = CacheKey::new("o1", "p1");
        cache.put(&key, &entry(0, true)).unwrap();
        cache.put(&key, &entry(5, false)).unwrap();
        let stored = cache.get(&key).unwrap().unwrap();
        assert_eq!(stored.cached_at_ms, 5);
        assert!(stored.season_summaries.is_none());
        assert!(!stored.summaries_included);
    }
}
