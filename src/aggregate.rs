use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::Mutex;

use log::{debug, warn};
use rayon::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

use crate::cancel::CancelFlag;
use crate::error::EngineResult;
use crate::model::{
    CompetitionRecord, ManualOverrideRow, MatchPlayerStat, PlayerRecord, find_player_stat,
    to_count,
};
use crate::season_key::{SeasonKey, expand_variants, matches_any};
use crate::store::{DocumentStore, paths};

const RATING_SCALE: f64 = 1000.0;

/// Additive appearance/minute/goal/assist/card/rating counters.
///
/// A monoid under `+`. Ratings are accumulated in thousandths so totals
/// are exact under any traversal order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregatedStats {
    pub appearances: u32,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    #[serde(rename = "ratingSum", deserialize_with = "de_rating_sum")]
    rating_milli: u64,
    pub rating_count: u32,
}

fn de_rating_sum<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    Ok(scale_rating(raw))
}

fn scale_rating(raw: f64) -> u64 {
    if raw.is_finite() && raw > 0.0 {
        (raw * RATING_SCALE).round() as u64
    } else {
        0
    }
}

impl AggregatedStats {
    pub fn rating_sum(&self) -> f64 {
        self.rating_milli as f64 / RATING_SCALE
    }

    pub fn average_rating(&self) -> Option<f64> {
        (self.rating_count > 0).then(|| self.rating_sum() / f64::from(self.rating_count))
    }

    pub fn add_rating(&mut self, rating: f64) {
        if rating.is_finite() && rating > 0.0 {
            self.rating_milli = self.rating_milli.saturating_add(scale_rating(rating));
            self.rating_count = self.rating_count.saturating_add(1);
        }
    }

    pub fn has_activity(&self) -> bool {
        self.appearances > 0
            || self.minutes > 0
            || self.goals > 0
            || self.assists > 0
            || self.yellow_cards > 0
            || self.red_cards > 0
            || self.rating_count > 0
    }

    /// Contribution of one match line.
    pub fn from_match(stat: &MatchPlayerStat) -> Self {
        let mut out = Self {
            appearances: u32::from(stat.minutes_played > 0),
            minutes: stat.minutes_played,
            goals: stat.goals,
            assists: stat.assists,
            yellow_cards: stat.yellow_cards,
            red_cards: stat.red_cards,
            ..Self::default()
        };
        if let Some(rating) = stat.rating {
            out.add_rating(rating);
        }
        out
    }

    /// Contribution of a manual row; the rating sum is rebuilt from
    /// `avgRating * matches`.
    pub fn from_manual(row: &ManualOverrideRow) -> Self {
        let matches = to_count(row.matches);
        let mut out = Self {
            appearances: matches,
            minutes: to_count(row.minutes),
            goals: to_count(row.goals),
            assists: to_count(row.assists),
            yellow_cards: to_count(row.yellow_cards),
            red_cards: to_count(row.red_cards),
            ..Self::default()
        };
        if let Some(avg) = row.avg_rating.filter(|avg| *avg > 0.0) {
            if matches > 0 {
                out.rating_milli = scale_rating(avg).saturating_mul(u64::from(matches));
                out.rating_count = matches;
            }
        }
        out
    }
}

impl Add for AggregatedStats {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

// Counters saturate: club-entered totals are unchecked input.
impl AddAssign for AggregatedStats {
    fn add_assign(&mut self, rhs: Self) {
        self.appearances = self.appearances.saturating_add(rhs.appearances);
        self.minutes = self.minutes.saturating_add(rhs.minutes);
        self.goals = self.goals.saturating_add(rhs.goals);
        self.assists = self.assists.saturating_add(rhs.assists);
        self.yellow_cards = self.yellow_cards.saturating_add(rhs.yellow_cards);
        self.red_cards = self.red_cards.saturating_add(rhs.red_cards);
        self.rating_milli = self.rating_milli.saturating_add(rhs.rating_milli);
        self.rating_count = self.rating_count.saturating_add(rhs.rating_count);
    }
}

impl Sum for AggregatedStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Serialize for AggregatedStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("AggregatedStats", 9)?;
        s.serialize_field("appearances", &self.appearances)?;
        s.serialize_field("minutes", &self.minutes)?;
        s.serialize_field("goals", &self.goals)?;
        s.serialize_field("assists", &self.assists)?;
        s.serialize_field("yellowCards", &self.yellow_cards)?;
        s.serialize_field("redCards", &self.red_cards)?;
        s.serialize_field("ratingSum", &self.rating_sum())?;
        s.serialize_field("ratingCount", &self.rating_count)?;
        s.serialize_field("averageRating", &self.average_rating())?;
        s.end()
    }
}

/// Manual rows keyed by competition id, season rows before legacy rows.
#[derive(Debug, Clone, Default)]
pub struct ManualOverrideIndex {
    rows: HashMap<String, ManualOverrideRow>,
}

impl ManualOverrideIndex {
    /// `season == None` indexes every season, newest first, so the most
    /// recent season wins when one competition id appears twice.
    pub fn build(record: &PlayerRecord, season: Option<&SeasonKey>) -> Self {
        let mut index = Self::default();
        match season {
            Some(season) => {
                if let Some(data) = record.season_data.get(season) {
                    index.extend(&data.manual_competition_stats);
                }
            }
            None => {
                for data in record.season_data.values().rev() {
                    index.extend(&data.manual_competition_stats);
                }
            }
        }
        // Legacy player-root rows only fill competitions not yet covered.
        index.extend(&record.manual_competition_stats);
        index
    }

    fn extend(&mut self, rows: &[ManualOverrideRow]) {
        for row in rows.iter().filter(|row| row.has_any_stats()) {
            self.rows
                .entry(row.competition_id.clone())
                .or_insert_with(|| row.clone());
        }
    }

    pub fn get(&self, competition_id: &str) -> Option<&ManualOverrideRow> {
        self.rows.get(competition_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    Manual,
    Matches,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionTotals {
    pub competition: CompetitionRecord,
    pub source: StatsSource,
    pub stats: AggregatedStats,
}

impl CompetitionTotals {
    /// Manual rows are explicit club input and always shown; match-derived
    /// totals only when the player actually did something.
    pub fn has_recorded_activity(&self) -> bool {
        match self.source {
            StatsSource::Manual => true,
            StatsSource::Matches => self.stats.has_activity(),
        }
    }
}

/// Per-request aggregation over one player's competitions.
///
/// Match-derived totals are memoized per competition for the lifetime of
/// the aggregator, so season, career and summary passes share the walks.
pub struct Aggregator<'a> {
    store: &'a dyn DocumentStore,
    scope: &'a str,
    player_id: &'a str,
    cancel: &'a CancelFlag,
    match_memo: Mutex<HashMap<String, AggregatedStats>>,
    degraded: Mutex<Vec<String>>,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        scope: &'a str,
        player_id: &'a str,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            store,
            scope,
            player_id,
            cancel,
            match_memo: Mutex::new(HashMap::new()),
            degraded: Mutex::new(Vec::new()),
        }
    }

    /// Branches that failed and were counted as zero.
    pub fn degraded(&self) -> Vec<String> {
        self.degraded
            .lock()
            .map(|items| items.clone())
            .unwrap_or_default()
    }

    /// Totals for `season`, or the whole career when `None`.
    pub fn aggregate(
        &self,
        record: &PlayerRecord,
        season: Option<&SeasonKey>,
    ) -> EngineResult<AggregatedStats> {
        Ok(self
            .breakdown(record, season)?
            .iter()
            .map(|totals| totals.stats)
            .sum())
    }

    /// One entry per matching competition, each from exactly one source.
    pub fn breakdown(
        &self,
        record: &PlayerRecord,
        season: Option<&SeasonKey>,
    ) -> EngineResult<Vec<CompetitionTotals>> {
        self.cancel.check()?;
        let index = ManualOverrideIndex::build(record, season);
        let competitions = self.competitions_for(season)?;
        debug!(
            "aggregating {} competitions ({} manual) for player {} season {}",
            competitions.len(),
            index.len(),
            self.player_id,
            season.map(SeasonKey::as_str).unwrap_or("career")
        );

        competitions
            .into_par_iter()
            .map(|competition| match index.get(&competition.id) {
                Some(row) => Ok(CompetitionTotals {
                    stats: AggregatedStats::from_manual(row),
                    source: StatsSource::Manual,
                    competition,
                }),
                None => {
                    let stats = self.match_totals(&competition.id)?;
                    Ok(CompetitionTotals {
                        stats,
                        source: StatsSource::Matches,
                        competition,
                    })
                }
            })
            .collect()
    }

    pub fn competitions_for(&self, season: Option<&SeasonKey>) -> EngineResult<Vec<CompetitionRecord>> {
        let collection = paths::competitions(self.scope);
        let docs = match season {
            None => self.store.list(&collection)?,
            Some(season) => {
                let variants = expand_variants(season.as_str());
                self.store
                    .query_in(&collection, "season", &variants)?
                    .into_iter()
                    .filter(|doc| {
                        doc.data
                            .get("season")
                            .and_then(|v| v.as_str())
                            .is_some_and(|raw| matches_any(raw, &variants))
                    })
                    .collect()
            }
        };
        let mut competitions: Vec<CompetitionRecord> =
            docs.iter().map(CompetitionRecord::from_document).collect();
        competitions.sort_by(|a, b| a.id.cmp(&b.id));
        competitions.dedup_by(|a, b| a.id == b.id);
        Ok(competitions)
    }

    /// Match-derived totals for one competition. A failing read degrades
    /// that branch to zero; only cancellation propagates.
    pub fn match_totals(&self, competition_id: &str) -> EngineResult<AggregatedStats> {
        if let Some(hit) = self
            .match_memo
            .lock()
            .ok()
            .and_then(|memo| memo.get(competition_id).copied())
        {
            return Ok(hit);
        }
        self.cancel.check()?;

        let rounds = match self.store.list(&paths::rounds(self.scope, competition_id)) {
            Ok(rounds) => rounds,
            Err(err) => {
                self.record_degraded(format!("competition {competition_id} rounds: {err:#}"));
                return Ok(AggregatedStats::default());
            }
        };

        let per_round: Vec<EngineResult<AggregatedStats>> = rounds
            .par_iter()
            .map(|round| self.round_totals(competition_id, &round.id))
            .collect();

        let mut total = AggregatedStats::default();
        for result in per_round {
            total += result?;
        }

        if let Ok(mut memo) = self.match_memo.lock() {
            memo.insert(competition_id.to_string(), total);
        }
        Ok(total)
    }

    fn round_totals(&self, competition_id: &str, round_id: &str) -> EngineResult<AggregatedStats> {
        self.cancel.check()?;
        let path = paths::matches(self.scope, competition_id, round_id);
        match self.store.list(&path) {
            Ok(matches) => Ok(matches
                .iter()
                .filter_map(|doc| find_player_stat(&doc.data, self.player_id))
                .map(|stat| AggregatedStats::from_match(&stat))
                .sum()),
            Err(err) => {
                self.record_degraded(format!(
                    "competition {competition_id} round {round_id}: {err:#}"
                ));
                Ok(AggregatedStats::default())
            }
        }
    }

    fn record_degraded(&self, message: String) {
        warn!("stats branch skipped for player {}: {message}", self.player_id);
        if let Ok(mut items) = self.degraded.lock() {
            items.push(message);
        }
    }
}
