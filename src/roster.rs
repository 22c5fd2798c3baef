use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rayon::prelude::*;
use serde_json::Value;

use crate::cancel::CancelFlag;
use crate::error::{EngineError, EngineResult};
use crate::model::{PlayerRecord, RosterEntry};
use crate::season_key::{SeasonKey, normalize};
use crate::store::{DocumentStore, paths};

/// One season document in the club's season registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonDoc {
    pub doc_id: String,
    pub key: SeasonKey,
}

/// Short-lived memo; entries older than `ttl` are ignored.
struct TtlMemo<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlMemo<K, V> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().ok()?;
        let (at, value) = entries.get(key)?;
        (at.elapsed() <= self.ttl).then(|| value.clone())
    }

    fn put(&self, key: K, value: V) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (at, _)| at.elapsed() <= self.ttl);
            entries.insert(key, (Instant::now(), value));
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Finds a player's season-scoped roster memberships.
///
/// Results are read-mostly and memoized for a short window so a batch of
/// requests for the same player does not rescan every season.
pub struct RosterResolver {
    store: Arc<dyn DocumentStore>,
    registry_memo: TtlMemo<String, Arc<Vec<SeasonDoc>>>,
    hits_memo: TtlMemo<(String, String), Arc<Vec<RosterEntry>>>,
}

impl RosterResolver {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self {
            store,
            registry_memo: TtlMemo::new(ttl),
            hits_memo: TtlMemo::new(ttl),
        }
    }

    pub fn clear(&self) {
        self.registry_memo.clear();
        self.hits_memo.clear();
    }

    /// Seasons that currently exist for `scope`. Deleted seasons are gone
    /// from this list, which is what keeps them out of every summary.
    pub fn season_registry(&self, scope: &str) -> EngineResult<Arc<Vec<SeasonDoc>>> {
        if let Some(cached) = self.registry_memo.get(&scope.to_string()) {
            return Ok(cached);
        }
        let docs = self.store.list(&paths::seasons(scope))?;
        let registry: Vec<SeasonDoc> = docs
            .iter()
            .map(|doc| SeasonDoc {
                doc_id: doc.id.clone(),
                key: season_doc_key(&doc.id, &doc.data),
            })
            .collect();
        let registry = Arc::new(registry);
        self.registry_memo.put(scope.to_string(), registry.clone());
        Ok(registry)
    }

    pub fn registry_keys(&self, scope: &str) -> EngineResult<BTreeSet<SeasonKey>> {
        Ok(self
            .season_registry(scope)?
            .iter()
            .map(|season| season.key.clone())
            .collect())
    }

    pub fn roster_hits(
        &self,
        scope: &str,
        player_id: &str,
        cancel: &CancelFlag,
    ) -> EngineResult<Arc<Vec<RosterEntry>>> {
        let memo_key = (scope.to_string(), player_id.to_string());
        if let Some(cached) = self.hits_memo.get(&memo_key) {
            return Ok(cached);
        }

        let registry = self.season_registry(scope)?;
        let results: Vec<EngineResult<Option<RosterEntry>>> = registry
            .par_iter()
            .map(|season| {
                cancel.check()?;
                let path = paths::roster_entry(scope, &season.doc_id, player_id);
                let data = self.store.get(&path)?;
                Ok(data.map(|data| roster_entry_for(season, &data)))
            })
            .collect();

        let mut hits = Vec::new();
        for result in results {
            match result {
                Ok(Some(entry)) => hits.push(entry),
                Ok(None) => {}
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => warn!("roster read failed for {scope}/{player_id}: {err}"),
            }
        }
        // Stable order regardless of fan-out completion order.
        hits.sort_by(|a, b| b.season_id.cmp(&a.season_id));
        debug!(
            "player {player_id} rostered in {} of {} seasons",
            hits.len(),
            registry.len()
        );

        let hits = Arc::new(hits);
        self.hits_memo.put(memo_key, hits.clone());
        Ok(hits)
    }

    pub fn latest_roster_entry(
        &self,
        scope: &str,
        player_id: &str,
        cancel: &CancelFlag,
    ) -> EngineResult<Option<RosterEntry>> {
        let hits = self.roster_hits(scope, player_id, cancel)?;
        Ok(latest_entry(&hits).cloned())
    }

    pub fn registered_season_ids(
        &self,
        scope: &str,
        record: &PlayerRecord,
        cancel: &CancelFlag,
    ) -> EngineResult<Vec<SeasonKey>> {
        let hits = self.roster_hits(scope, &record.id, cancel)?;
        let registry = self.registry_keys(scope)?;
        Ok(registered_seasons(&hits, record, &registry))
    }
}

fn season_doc_key(doc_id: &str, data: &Value) -> SeasonKey {
    let from_id = normalize(doc_id);
    if from_id.is_year_pair() {
        return from_id;
    }
    ["label", "name"]
        .iter()
        .filter_map(|field| data.get(*field).and_then(Value::as_str))
        .map(normalize)
        .find(SeasonKey::is_year_pair)
        .unwrap_or(from_id)
}

fn roster_entry_for(season: &SeasonDoc, data: &Value) -> RosterEntry {
    let mut entry = RosterEntry::from_value(&season.doc_id, data);
    entry.season_id = season.key.clone();
    entry
}

/// Canonical form is year-first, so the lexicographic max is the latest.
pub fn latest_entry(hits: &[RosterEntry]) -> Option<&RosterEntry> {
    hits.iter().max_by(|a, b| a.season_id.cmp(&b.season_id))
}

/// Roster seasons ∪ profile `seasons` ∪ `seasonData` keys, newest first,
/// restricted to seasons still present in `registry`.
pub fn registered_seasons(
    hits: &[RosterEntry],
    record: &PlayerRecord,
    registry: &BTreeSet<SeasonKey>,
) -> Vec<SeasonKey> {
    let mut all: BTreeSet<SeasonKey> = hits.iter().map(|hit| hit.season_id.clone()).collect();
    all.extend(record.known_seasons());
    all.into_iter()
        .rev()
        .filter(|season| registry.contains(season))
        .collect()
}
