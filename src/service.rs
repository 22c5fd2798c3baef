use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregatedStats, Aggregator};
use crate::cancel::CancelFlag;
use crate::club::resolve_club;
use crate::config::{EngineConfig, shared_fetch_pool, with_fetch_pool};
use crate::error::EngineResult;
use crate::model::{ClubProfile, PlayerRecord};
use crate::player_record::PlayerRecordResolver;
use crate::roster::RosterResolver;
use crate::season_key::{SeasonKey, normalize};
use crate::season_summary::{SeasonSummary, build_season_summaries};
use crate::stats_cache::{
    CacheEntry, CacheKey, CachePolicy, CacheWant, Freshness, StatsCache, StoreCache,
};
use crate::store::DocumentStore;

/// Read request as received from any presentation surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsRequest {
    /// Public club id or owner scope.
    pub club_id: String,
    pub player_id: String,
    /// Raw season text; any accepted shape.
    pub season: Option<String>,
    pub include_summaries: bool,
    #[serde(alias = "force")]
    pub force_refresh: bool,
}

impl StatsRequest {
    pub fn new(club_id: &str, player_id: &str) -> Self {
        Self {
            club_id: club_id.to_string(),
            player_id: player_id.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub owner_uid: String,
    pub player_id: String,
    pub stats_season: Option<SeasonKey>,
    pub season_stats: Option<AggregatedStats>,
    pub career_stats: AggregatedStats,
    pub season_summaries: Option<Vec<SeasonSummary>>,
    #[serde(skip)]
    pub from_cache: bool,
}

/// Everything one cache miss computes.
#[derive(Debug, Clone)]
pub struct ComputedStats {
    pub record: PlayerRecord,
    pub registered_seasons: Vec<SeasonKey>,
    pub stats_season: Option<SeasonKey>,
    pub season_stats: Option<AggregatedStats>,
    pub career_stats: AggregatedStats,
    pub season_summaries: Option<Vec<SeasonSummary>>,
    /// Fan-out branches that failed and were counted as zero.
    pub degraded: Vec<String>,
}

/// Single entry point for player statistics, shared by every surface.
pub struct StatsService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn StatsCache>,
    policy: CachePolicy,
    roster: RosterResolver,
    records: PlayerRecordResolver,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl StatsService {
    /// Environment-configured service on the process-wide fetch pool.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let config = EngineConfig::from_env();
        Self::build(store, &config, shared_fetch_pool())
    }

    /// Service with its own fetch pool sized by `config`.
    pub fn with_config(store: Arc<dyn DocumentStore>, config: &EngineConfig) -> Self {
        let pool = config.build_fetch_pool();
        Self::build(store, config, pool)
    }

    fn build(
        store: Arc<dyn DocumentStore>,
        config: &EngineConfig,
        pool: Option<Arc<rayon::ThreadPool>>,
    ) -> Self {
        Self {
            cache: Arc::new(StoreCache::new(store.clone())),
            policy: CachePolicy::new(config.stats_cache_ttl),
            roster: RosterResolver::new(store.clone(), config.roster_cache_ttl),
            records: PlayerRecordResolver::new(store.clone()),
            store,
            pool,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn StatsCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn roster(&self) -> &RosterResolver {
        &self.roster
    }

    pub fn get(&self, request: &StatsRequest) -> EngineResult<StatsResponse> {
        self.get_with_cancel(request, &CancelFlag::new())
    }

    pub fn get_with_cancel(
        &self,
        request: &StatsRequest,
        cancel: &CancelFlag,
    ) -> EngineResult<StatsResponse> {
        self.get_at(request, Utc::now().timestamp_millis(), cancel)
    }

    /// Cache-aware read at wall-clock `now_ms`.
    pub fn get_at(
        &self,
        request: &StatsRequest,
        now_ms: i64,
        cancel: &CancelFlag,
    ) -> EngineResult<StatsResponse> {
        let club = resolve_club(self.store.as_ref(), &request.club_id)?;
        let scope = club.owner_uid.as_str();
        let player_id = request.player_id.trim();
        let key = CacheKey::new(scope, player_id);
        let want = CacheWant {
            include_summaries: request.include_summaries,
            season: request.season.as_deref().map(normalize),
        };

        if !request.force_refresh {
            match self.cache.get(&key) {
                Ok(Some(entry)) => {
                    let freshness = self.policy.freshness(&entry, now_ms, &want);
                    if freshness == Freshness::Fresh {
                        debug!("stats cache hit for {scope}/{player_id}");
                        return Ok(response_from_entry(entry, request.include_summaries));
                    }
                    debug!("stats cache miss for {scope}/{player_id}: {freshness:?}");
                }
                Ok(None) => debug!("stats cache empty for {scope}/{player_id}"),
                Err(err) => warn!("stats cache read failed for {scope}/{player_id}: {err:#}"),
            }
        }

        let computed = with_fetch_pool(self.pool.as_deref(), || {
            self.compute(
                scope,
                player_id,
                want.season.clone(),
                request.include_summaries,
                cancel,
            )
        })?;
        // Only a fully computed result is persisted.
        cancel.check()?;

        let season_explicit = want.season.is_some()
            && computed.registered_seasons.first() != computed.stats_season.as_ref();
        let entry = CacheEntry {
            player_id: player_id.to_string(),
            owner_scope: scope.to_string(),
            stats_season: computed.stats_season.clone(),
            season_explicit,
            season_stats: computed.season_stats,
            career_stats: computed.career_stats,
            season_summaries: computed.season_summaries.clone(),
            summaries_included: computed.season_summaries.is_some(),
            cached_at_ms: now_ms,
            cache_version: self.policy.version,
        };
        if let Err(err) = self.cache.put(&key, &entry) {
            warn!("stats cache write failed for {scope}/{player_id}: {err:#}");
        }

        Ok(StatsResponse {
            owner_uid: club.owner_uid.clone(),
            player_id: player_id.to_string(),
            stats_season: computed.stats_season,
            season_stats: computed.season_stats,
            career_stats: computed.career_stats,
            season_summaries: computed.season_summaries,
            from_cache: false,
        })
    }

    /// Full recomputation, bypassing the cache entirely.
    pub fn compute(
        &self,
        scope: &str,
        player_id: &str,
        season: Option<SeasonKey>,
        include_summaries: bool,
        cancel: &CancelFlag,
    ) -> EngineResult<ComputedStats> {
        let resolved = self.records.resolve(&self.roster, scope, player_id, cancel)?;
        let record = resolved.record;
        let registered = self.roster.registered_season_ids(scope, &record, cancel)?;
        let stats_season = season.or_else(|| registered.first().cloned());

        let aggregator = Aggregator::new(self.store.as_ref(), scope, player_id, cancel);
        let season_stats = stats_season
            .as_ref()
            .map(|season| aggregator.aggregate(&record, Some(season)))
            .transpose()?;
        let career_stats = aggregator.aggregate(&record, None)?;
        let season_summaries = if include_summaries {
            Some(build_season_summaries(&aggregator, &record, &registered)?)
        } else {
            None
        };

        let degraded = aggregator.degraded();
        if degraded.is_empty() {
            debug!(
                "computed stats for {scope}/{player_id} over {} registered seasons",
                registered.len()
            );
        } else {
            info!(
                "computed stats for {scope}/{player_id} with {} degraded branches",
                degraded.len()
            );
        }

        Ok(ComputedStats {
            record,
            registered_seasons: registered,
            stats_season,
            season_stats,
            career_stats,
            season_summaries,
            degraded,
        })
    }

    pub fn club(&self, club_id: &str) -> EngineResult<ClubProfile> {
        resolve_club(self.store.as_ref(), club_id)
    }
}

fn response_from_entry(entry: CacheEntry, include_summaries: bool) -> StatsResponse {
    StatsResponse {
        owner_uid: entry.owner_scope,
        player_id: entry.player_id,
        stats_season: entry.stats_season,
        season_stats: entry.season_stats,
        career_stats: entry.career_stats,
        season_summaries: if include_summaries {
            entry.season_summaries
        } else {
            None
        },
        from_cache: true,
    }
}
