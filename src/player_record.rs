use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;
use serde_json::Value;

use crate::cancel::CancelFlag;
use crate::error::{EngineError, EngineResult};
use crate::model::{PlayerRecord, RosterEntry, merge_roster_fields};
use crate::roster::{RosterResolver, latest_entry};
use crate::season_key::SeasonKey;
use crate::store::{DocumentStore, paths};

/// Candidate scoring weights. Each tier dominates everything below it:
/// team affinity > season affinity > data richness > recency.
pub mod weights {
    /// Candidate's team appears in the player's roster history.
    pub const TEAM_AFFINITY: i64 = 100_000_000;
    /// Per roster season also listed by the candidate.
    pub const SEASON_AFFINITY: i64 = 10_000_000;
    pub const SEASON_PARAMS: i64 = 1_000_000;
    pub const SEASON_PHYSICAL: i64 = 500_000;
    /// Legacy flat schema: the same signals at the profile root.
    pub const ROOT_PARAMS: i64 = 100_000;
    pub const ROOT_PHYSICAL: i64 = 50_000;
    // Recency adds the latest season's start year (e.g. +2024).
}

/// A team-scoped player document sharing the requested player id.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub team_id: String,
    pub data: Value,
}

#[derive(Debug, Clone)]
pub struct ResolvedPlayer {
    pub record: PlayerRecord,
    /// Team whose player document won.
    pub source_team: String,
    pub roster_hits: Arc<Vec<RosterEntry>>,
    pub latest_roster: Option<RosterEntry>,
}

/// Roster-derived context used to score candidates.
#[derive(Debug, Clone, Default)]
pub struct RosterContext {
    pub seasons: BTreeSet<SeasonKey>,
    pub teams: BTreeSet<String>,
}

impl RosterContext {
    pub fn from_hits(hits: &[RosterEntry]) -> Self {
        Self {
            seasons: hits.iter().map(|hit| hit.season_id.clone()).collect(),
            teams: hits.iter().filter_map(|hit| hit.team_id.clone()).collect(),
        }
    }
}

pub fn score_candidate(candidate: &Candidate, player_id: &str, ctx: &RosterContext) -> i64 {
    let record = PlayerRecord::from_value(player_id, Some(&candidate.team_id), &candidate.data);
    let mut score = 0i64;

    if record.has_season_params() {
        score += weights::SEASON_PARAMS;
    }
    if record.has_season_physical() {
        score += weights::SEASON_PHYSICAL;
    }
    if record.has_root_params() {
        score += weights::ROOT_PARAMS;
    }
    if record.has_root_physical() {
        score += weights::ROOT_PHYSICAL;
    }
    if let Some(year) = record.latest_start_year() {
        score += i64::from(year);
    }

    // Only the candidate's own `seasons` list counts, not `seasonData` keys.
    let shared_seasons = record
        .seasons
        .iter()
        .filter(|season| ctx.seasons.contains(*season))
        .count() as i64;
    score += weights::SEASON_AFFINITY * shared_seasons;

    let team_match = ctx.teams.contains(&candidate.team_id)
        || record
            .team_id
            .as_ref()
            .is_some_and(|team| ctx.teams.contains(team));
    if team_match {
        score += weights::TEAM_AFFINITY;
    }
    score
}

/// Highest score wins; ties keep the first candidate encountered.
pub fn select_best<'a>(
    candidates: &'a [Candidate],
    player_id: &str,
    ctx: &RosterContext,
) -> Option<&'a Candidate> {
    let mut best: Option<(&Candidate, i64)> = None;
    for candidate in candidates {
        let score = score_candidate(candidate, player_id, ctx);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

pub struct PlayerRecordResolver {
    store: Arc<dyn DocumentStore>,
}

impl PlayerRecordResolver {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn resolve(
        &self,
        roster: &RosterResolver,
        scope: &str,
        player_id: &str,
        cancel: &CancelFlag,
    ) -> EngineResult<ResolvedPlayer> {
        let hits = roster.roster_hits(scope, player_id, cancel)?;
        let latest = latest_entry(&hits).cloned();

        let chosen = match self.direct_candidate(scope, player_id, latest.as_ref())? {
            Some(candidate) => {
                debug!(
                    "player {player_id} resolved from latest roster team {}",
                    candidate.team_id
                );
                candidate
            }
            None => {
                let candidates = self.scan_candidates(scope, player_id, cancel)?;
                let ctx = RosterContext::from_hits(&hits);
                let best = select_best(&candidates, player_id, &ctx).cloned().ok_or_else(|| {
                    EngineError::PlayerNotFound {
                        owner_scope: scope.to_string(),
                        player_id: player_id.to_string(),
                    }
                })?;
                debug!(
                    "player {player_id} resolved from team {} out of {} candidates",
                    best.team_id,
                    candidates.len()
                );
                best
            }
        };

        let merged = match latest.as_ref() {
            Some(entry) => merge_roster_fields(&chosen.data, entry),
            None => chosen.data.clone(),
        };
        let record = PlayerRecord::from_value(player_id, Some(&chosen.team_id), &merged);

        Ok(ResolvedPlayer {
            record,
            source_team: chosen.team_id,
            roster_hits: hits,
            latest_roster: latest,
        })
    }

    fn direct_candidate(
        &self,
        scope: &str,
        player_id: &str,
        latest: Option<&RosterEntry>,
    ) -> EngineResult<Option<Candidate>> {
        let Some(team_id) = latest.and_then(|entry| entry.team_id.as_deref()) else {
            return Ok(None);
        };
        let data = self.store.get(&paths::team_player(scope, team_id, player_id))?;
        Ok(data.map(|data| Candidate {
            team_id: team_id.to_string(),
            data,
        }))
    }

    /// Every team-scoped document for `player_id`, in team listing order.
    pub fn scan_candidates(
        &self,
        scope: &str,
        player_id: &str,
        cancel: &CancelFlag,
    ) -> EngineResult<Vec<Candidate>> {
        let teams = self.store.list(&paths::teams(scope))?;
        let results: Vec<EngineResult<Option<Candidate>>> = teams
            .par_iter()
            .map(|team| {
                cancel.check()?;
                let data = self
                    .store
                    .get(&paths::team_player(scope, &team.id, player_id))?;
                Ok(data.map(|data| Candidate {
                    team_id: team.id.clone(),
                    data,
                }))
            })
            .collect();

        let mut candidates = Vec::new();
        for result in results {
            match result {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {}
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(err) => warn!("player scan failed for {scope}/{player_id}: {err}"),
            }
        }
        Ok(candidates)
    }
}
