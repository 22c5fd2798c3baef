use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

const APP_DIR: &str = "club_stats";

pub const DEFAULT_FETCH_PARALLELISM: usize = 6;
pub const DEFAULT_STATS_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_ROSTER_CACHE_TTL: Duration = Duration::from_secs(30);

static SHARED_POOL: OnceCell<Option<Arc<rayon::ThreadPool>>> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on concurrent store reads during fan-out.
    pub fetch_parallelism: usize,
    pub stats_cache_ttl: Duration,
    pub roster_cache_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_parallelism: DEFAULT_FETCH_PARALLELISM,
            stats_cache_ttl: DEFAULT_STATS_CACHE_TTL,
            roster_cache_ttl: DEFAULT_ROSTER_CACHE_TTL,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            fetch_parallelism: env_usize("FETCH_PARALLELISM")
                .unwrap_or(DEFAULT_FETCH_PARALLELISM)
                .clamp(2, 32),
            stats_cache_ttl: env_u64("STATS_CACHE_TTL_SECS")
                .map(|secs| Duration::from_secs(secs.min(86_400)))
                .unwrap_or(DEFAULT_STATS_CACHE_TTL),
            roster_cache_ttl: env_u64("ROSTER_CACHE_SECS")
                .map(|secs| Duration::from_secs(secs.min(3_600)))
                .unwrap_or(DEFAULT_ROSTER_CACHE_TTL),
        }
    }

    pub fn build_fetch_pool(&self) -> Option<Arc<rayon::ThreadPool>> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.fetch_parallelism)
            .thread_name(|idx| format!("club-stats-fetch-{idx}"))
            .build()
            .ok()
            .map(Arc::new)
    }
}

/// Process-wide fetch pool sized from the environment on first use.
pub fn shared_fetch_pool() -> Option<Arc<rayon::ThreadPool>> {
    SHARED_POOL
        .get_or_init(|| EngineConfig::from_env().build_fetch_pool())
        .clone()
}

/// Run `action` inside `pool` so nested `par_iter` calls respect its bound.
pub fn with_fetch_pool<T>(pool: Option<&rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    match pool {
        Some(pool) => pool.install(action),
        None => action(),
    }
}

pub fn app_cache_dir() -> Option<PathBuf> {
    // Prefer XDG cache.
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

/// `CLUB_STATS_DB`, falling back to the app cache directory.
pub fn db_path_from_env() -> Option<PathBuf> {
    env::var("CLUB_STATS_DB")
        .ok()
        .filter(|raw| !raw.trim().is_empty())
        .map(PathBuf::from)
        .or_else(crate::sqlite_store::default_db_path)
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|val| val.trim().parse::<usize>().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|val| val.trim().parse::<u64>().ok())
}
