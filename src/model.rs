//! Typed views over the loosely-shaped club documents.
//!
//! Every document is converted once, here, by a parse-and-default step:
//! numbers may arrive as JSON numbers or numeric strings, anything missing
//! or non-finite becomes `None`, and the rest of the engine only ever sees
//! validated optional fields.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::season_key::{SeasonKey, normalize};
use crate::store::Document;

/// Ability keys averaged into a season's overall rating.
pub const ABILITY_KEYS: [&str; 6] = [
    "pace",
    "shooting",
    "passing",
    "dribbling",
    "defending",
    "physical",
];

const OVERALL_MAX: f64 = 99.0;

/// Roster keys that describe the membership itself, not the player.
const ROSTER_BOOKKEEPING_KEYS: &[&str] = &["seasonId", "createdAt", "updatedAt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionFormat {
    League,
    LeagueCup,
    Cup,
    Other,
}

impl CompetitionFormat {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "league" => CompetitionFormat::League,
            "league_cup" => CompetitionFormat::LeagueCup,
            "cup" => CompetitionFormat::Cup,
            _ => CompetitionFormat::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionRecord {
    pub id: String,
    pub name: String,
    /// Raw season text as written by the club; compare via `season_key`.
    pub season: String,
    pub format: CompetitionFormat,
    pub logo_url: Option<String>,
}

impl CompetitionRecord {
    pub fn from_document(doc: &Document) -> Self {
        let data = &doc.data;
        Self {
            id: doc.id.clone(),
            name: str_field(data, "name").unwrap_or_else(|| doc.id.clone()),
            season: str_field(data, "season").unwrap_or_default(),
            format: str_field(data, "format")
                .map(|raw| CompetitionFormat::from_raw(&raw))
                .unwrap_or(CompetitionFormat::Other),
            logo_url: str_field(data, "logoUrl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchPlayerStat {
    pub player_id: String,
    pub team_id: Option<String>,
    pub minutes_played: u32,
    pub goals: u32,
    pub assists: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    /// Only strictly positive ratings count; `<= 0` means unrated.
    pub rating: Option<f64>,
    pub role: Option<String>,
}

impl MatchPlayerStat {
    pub fn from_value(value: &Value) -> Option<Self> {
        let player_id = id_field(value, "playerId")?;
        Some(Self {
            player_id,
            team_id: id_field(value, "teamId"),
            minutes_played: count_field(value, "minutesPlayed"),
            goals: count_field(value, "goals"),
            assists: count_field(value, "assists"),
            yellow_cards: count_field(value, "yellowCards"),
            red_cards: count_field(value, "redCards"),
            rating: num_field(value, "rating").filter(|r| *r > 0.0),
            role: str_field(value, "role"),
        })
    }
}

/// This player's line in a match document's `playerStats`, if any.
pub fn find_player_stat(match_doc: &Value, player_id: &str) -> Option<MatchPlayerStat> {
    match_doc
        .get("playerStats")?
        .as_array()?
        .iter()
        .filter_map(MatchPlayerStat::from_value)
        .find(|stat| stat.player_id == player_id)
}

/// Club-entered totals for one competition.
///
/// Fields stay `Option` so a row written with explicit zeros is still
/// distinguishable from a row that carries no numbers at all.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualOverrideRow {
    pub competition_id: String,
    pub matches: Option<f64>,
    pub minutes: Option<f64>,
    pub goals: Option<f64>,
    pub assists: Option<f64>,
    pub yellow_cards: Option<f64>,
    pub red_cards: Option<f64>,
    pub avg_rating: Option<f64>,
}

impl ManualOverrideRow {
    pub fn from_value(value: &Value) -> Option<Self> {
        let competition_id = id_field(value, "competitionId")?;
        Some(Self {
            competition_id,
            matches: num_field(value, "matches"),
            minutes: num_field(value, "minutes"),
            goals: num_field(value, "goals"),
            assists: num_field(value, "assists"),
            yellow_cards: num_field(value, "yellowCards"),
            red_cards: num_field(value, "redCards"),
            avg_rating: num_field(value, "avgRating"),
        })
    }

    pub fn has_any_stats(&self) -> bool {
        [
            self.matches,
            self.minutes,
            self.goals,
            self.assists,
            self.yellow_cards,
            self.red_cards,
            self.avg_rating,
        ]
        .iter()
        .any(Option::is_some)
    }
}

fn manual_rows(value: Option<&Value>) -> Vec<ManualOverrideRow> {
    value
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(ManualOverrideRow::from_value).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AbilityParams {
    pub overall: Option<f64>,
    pub values: BTreeMap<String, f64>,
}

impl AbilityParams {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let values: BTreeMap<String, f64> = ABILITY_KEYS
            .iter()
            .filter_map(|key| num_any(obj.get(*key)?).map(|v| (key.to_string(), v)))
            .collect();
        let overall = obj.get("overall").and_then(num_any);
        let params = Self { overall, values };
        params.is_usable().then_some(params)
    }

    pub fn is_usable(&self) -> bool {
        self.overall.is_some() || !self.values.is_empty()
    }

    /// Mean of the ability values, each clamped to `[0, 99]`, rounded.
    pub fn computed_overall(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.values().map(|v| v.clamp(0.0, OVERALL_MAX)).sum();
        Some((sum / self.values.len() as f64).round())
    }

    pub fn overall_rating(&self) -> Option<f64> {
        self.overall
            .map(|v| v.clamp(0.0, OVERALL_MAX).round())
            .or_else(|| self.computed_overall())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalProfile {
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub age: Option<f64>,
    pub preferred_foot: Option<String>,
}

impl PhysicalProfile {
    fn from_value(value: &Value) -> Self {
        Self {
            height: num_field(value, "height"),
            weight: num_field(value, "weight"),
            age: num_field(value, "age"),
            preferred_foot: str_field(value, "preferredFoot"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.height.is_some()
            || self.weight.is_some()
            || self.age.is_some()
            || self.preferred_foot.is_some()
    }

    fn fill_from(&mut self, other: PhysicalProfile) {
        self.height = self.height.or(other.height);
        self.weight = self.weight.or(other.weight);
        self.age = self.age.or(other.age);
        if self.preferred_foot.is_none() {
            self.preferred_foot = other.preferred_foot;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonData {
    pub params: Option<AbilityParams>,
    pub physical: PhysicalProfile,
    pub manual_competition_stats: Vec<ManualOverrideRow>,
}

impl SeasonData {
    fn from_value(value: &Value) -> Self {
        Self {
            params: value.get("params").and_then(AbilityParams::from_value),
            physical: PhysicalProfile::from_value(value),
            manual_competition_stats: manual_rows(value.get("manualCompetitionStats")),
        }
    }

    // Two raw keys can normalize to the same season ("2024-25", "2024/2025").
    fn absorb(&mut self, other: SeasonData) {
        if self.params.is_none() {
            self.params = other.params;
        }
        self.physical.fill_from(other.physical);
        self.manual_competition_stats
            .extend(other.manual_competition_stats);
    }

    pub fn overall(&self) -> Option<f64> {
        self.params.as_ref().and_then(AbilityParams::overall_rating)
    }
}

/// The single resolved profile every aggregation step reads from.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub team_id: Option<String>,
    pub name: Option<String>,
    pub position: Option<String>,
    pub seasons: Vec<SeasonKey>,
    pub season_data: BTreeMap<SeasonKey, SeasonData>,
    pub params: Option<AbilityParams>,
    pub physical: PhysicalProfile,
    pub manual_competition_stats: Vec<ManualOverrideRow>,
    /// Remaining profile fields, passed through untouched.
    pub extra: Map<String, Value>,
}

const PLAYER_KNOWN_KEYS: &[&str] = &[
    "id",
    "playerId",
    "teamId",
    "name",
    "position",
    "seasons",
    "seasonData",
    "params",
    "height",
    "weight",
    "age",
    "preferredFoot",
    "manualCompetitionStats",
];

impl PlayerRecord {
    /// `team_hint` is the team segment of the document path, used when the
    /// body does not carry its own `teamId`.
    pub fn from_value(player_id: &str, team_hint: Option<&str>, value: &Value) -> Self {
        let seasons = value
            .get("seasons")
            .and_then(Value::as_array)
            .map(|items| {
                let mut out: Vec<SeasonKey> = Vec::new();
                for raw in items.iter().filter_map(Value::as_str) {
                    let key = normalize(raw);
                    if !out.contains(&key) {
                        out.push(key);
                    }
                }
                out
            })
            .unwrap_or_default();

        let mut season_data: BTreeMap<SeasonKey, SeasonData> = BTreeMap::new();
        if let Some(blocks) = value.get("seasonData").and_then(Value::as_object) {
            for (raw, block) in blocks {
                let parsed = SeasonData::from_value(block);
                match season_data.get_mut(&normalize(raw)) {
                    Some(existing) => existing.absorb(parsed),
                    None => {
                        season_data.insert(normalize(raw), parsed);
                    }
                }
            }
        }

        let extra = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(key, _)| !PLAYER_KNOWN_KEYS.contains(&key.as_str()))
                    .map(|(key, v)| (key.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: player_id.to_string(),
            team_id: id_field(value, "teamId").or_else(|| team_hint.map(str::to_string)),
            name: str_field(value, "name"),
            position: str_field(value, "position"),
            seasons,
            season_data,
            params: value.get("params").and_then(AbilityParams::from_value),
            physical: PhysicalProfile::from_value(value),
            manual_competition_stats: manual_rows(value.get("manualCompetitionStats")),
            extra,
        }
    }

    /// Seasons this profile knows about: `seasons` ∪ `seasonData` keys.
    pub fn known_seasons(&self) -> BTreeSet<SeasonKey> {
        self.seasons
            .iter()
            .cloned()
            .chain(self.season_data.keys().cloned())
            .collect()
    }

    pub fn latest_start_year(&self) -> Option<u16> {
        self.known_seasons()
            .iter()
            .filter_map(SeasonKey::start_year)
            .max()
    }

    pub fn has_season_params(&self) -> bool {
        self.season_data
            .values()
            .any(|data| data.params.as_ref().is_some_and(AbilityParams::is_usable))
    }

    pub fn has_season_physical(&self) -> bool {
        self.season_data.values().any(|data| data.physical.has_any())
    }

    pub fn has_root_params(&self) -> bool {
        self.params.as_ref().is_some_and(AbilityParams::is_usable)
    }

    pub fn has_root_physical(&self) -> bool {
        self.physical.has_any()
    }

    pub fn season_overall(&self, season: &SeasonKey) -> Option<f64> {
        self.season_data.get(season).and_then(SeasonData::overall)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub season_id: SeasonKey,
    /// Document id of the season as stored, for path lookups.
    pub season_doc_id: String,
    pub team_id: Option<String>,
    pub player_fields: Map<String, Value>,
}

impl RosterEntry {
    pub fn from_value(season_doc_id: &str, value: &Value) -> Self {
        Self {
            season_id: normalize(season_doc_id),
            season_doc_id: season_doc_id.to_string(),
            team_id: id_field(value, "teamId"),
            player_fields: value.as_object().cloned().unwrap_or_default(),
        }
    }
}

/// "Roster fills gaps": every present, non-missing roster field replaces
/// the profile's value; everything else in the profile passes through.
pub fn merge_roster_fields(profile: &Value, roster: &RosterEntry) -> Value {
    let mut merged = profile.as_object().cloned().unwrap_or_default();
    for (key, value) in &roster.player_fields {
        if ROSTER_BOOKKEEPING_KEYS.contains(&key.as_str()) || is_missing(value) {
            continue;
        }
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClubProfile {
    pub id: String,
    pub club_id: Option<String>,
    pub owner_uid: String,
    pub club_name: Option<String>,
    pub legal_pages: Vec<Value>,
    pub display_settings: Value,
}

impl ClubProfile {
    pub fn from_document(doc: &Document) -> Option<Self> {
        let data = &doc.data;
        Some(Self {
            id: doc.id.clone(),
            club_id: id_field(data, "clubId"),
            owner_uid: id_field(data, "ownerUid")?,
            club_name: str_field(data, "clubName"),
            legal_pages: data
                .get("legalPages")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            display_settings: data.get("displaySettings").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Finite number from a JSON number or numeric string.
pub fn num_any(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub fn num_field(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(num_any)
}

/// Non-negative whole count; missing, negative or non-finite input is 0.
pub fn count_field(value: &Value, key: &str) -> u32 {
    to_count(num_field(value, key))
}

pub fn to_count(value: Option<f64>) -> u32 {
    match value {
        Some(n) if n > 0.0 => n.round().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Ids are written as strings by most clients and as numbers by a few.
fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
