use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregatedStats, Aggregator, CompetitionTotals, StatsSource};
use crate::error::EngineResult;
use crate::model::{CompetitionFormat, PlayerRecord};
use crate::season_key::SeasonKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionBreakdown {
    pub competition_id: String,
    pub name: String,
    pub format: CompetitionFormat,
    pub logo_url: Option<String>,
    pub source: StatsSource,
    pub stats: AggregatedStats,
}

impl From<CompetitionTotals> for CompetitionBreakdown {
    fn from(totals: CompetitionTotals) -> Self {
        Self {
            competition_id: totals.competition.id,
            name: totals.competition.name,
            format: totals.competition.format,
            logo_url: totals.competition.logo_url,
            source: totals.source,
            stats: totals.stats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonSummary {
    pub season: SeasonKey,
    pub total: AggregatedStats,
    pub overall: Option<f64>,
    pub competitions: Vec<CompetitionBreakdown>,
}

/// Row for one season from its per-competition totals.
///
/// The season row always exists; competitions without recorded activity
/// are left out of the breakdown.
pub fn summarize_season(
    season: SeasonKey,
    totals: Vec<CompetitionTotals>,
    overall: Option<f64>,
) -> SeasonSummary {
    let total: AggregatedStats = totals.iter().map(|t| t.stats).sum();
    let mut competitions: Vec<CompetitionBreakdown> = totals
        .into_iter()
        .filter(CompetitionTotals::has_recorded_activity)
        .map(CompetitionBreakdown::from)
        .collect();
    competitions.sort_by(|a, b| compare_names(&a.name, &b.name));
    SeasonSummary {
        season,
        total,
        overall,
        competitions,
    }
}

/// Case-folded name order, raw name as tie-break.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// One summary per registered season, newest first.
pub fn build_season_summaries(
    aggregator: &Aggregator<'_>,
    record: &PlayerRecord,
    seasons: &[SeasonKey],
) -> EngineResult<Vec<SeasonSummary>> {
    let mut unique = seasons.to_vec();
    unique.sort();
    unique.dedup();

    let mut summaries: Vec<SeasonSummary> = unique
        .into_par_iter()
        .map(|season| {
            let totals = aggregator.breakdown(record, Some(&season))?;
            let overall = record.season_overall(&season);
            Ok(summarize_season(season, totals, overall))
        })
        .collect::<EngineResult<Vec<_>>>()?;

    summaries.sort_by(|a, b| b.season.cmp(&a.season));
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompetitionRecord;

    fn totals(id: &str, name: &str, source: StatsSource, goals: u32) -> CompetitionTotals {
        let mut stats = AggregatedStats::default();
        stats.goals = goals;
        CompetitionTotals {
            competition: CompetitionRecord {
                id: id.into(),
                name: name.into(),
                season: "2024/25".into(),
                format: CompetitionFormat::League,
                logo_url: None,
            },
            source,
            stats,
        }
    }

    #[test]
    fn inactive_match_competitions_are_dropped_but_row_kept() {
        let summary = summarize_season(
            SeasonKey::from("2024/25"),
            vec![totals("c1", "Cup", StatsSource::Matches, 0)],
            None,
        );
        assert!(summary.competitions.is_empty());
        assert_eq!(summary.total, AggregatedStats::default());
    }

    #[test]
    fn manual_rows_survive_even_when_zero() {
        let summary = summarize_season(
            SeasonKey::from("2024/25"),
            vec![totals("c1", "Cup", StatsSource::Manual, 0)],
            Some(71.0),
        );
        assert_eq!(summary.competitions.len(), 1);
        assert_eq!(summary.overall, Some(71.0));
    }

    #[test]
    fn competitions_sort_case_insensitively() {
        let summary = summarize_season(
            SeasonKey::from("2024/25"),
            vec![
                totals("c1", "league", StatsSource::Matches, 1),
                totals("c2", "Cup", StatsSource::Matches, 1),
                totals("c3", "Amateur Shield", StatsSource::Matches, 1),
            ],
            None,
        );
        let names: Vec<&str> = summary.competitions.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Amateur Shield", "Cup", "league"]);
        assert_eq!(summary.total.goals, 3);
    }
}
